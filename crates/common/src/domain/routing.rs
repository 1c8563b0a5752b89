use crate::domain::result::{DomainError, DomainResult};
use std::fmt;
use std::str::FromStr;

pub const CRM_DOMAIN: &str = "crm";
pub const HEARTBEAT_ROUTING_KEY: &str = "monitoring.heartbeat.create";
/// Routing key of operational log events on the log exchange
pub const LOG_ROUTING_KEY: &str = "controlroom.log.event";

/// Entity kinds synchronised with the CRM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Company,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::User, EntityKind::Company];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Company => "company",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "company" => Ok(Self::Company),
            other => Err(DomainError::InvalidRoutingKey(format!(
                "unknown entity kind '{}'",
                other
            ))),
        }
    }
}

/// Operation segment of a crm routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityOperation {
    Create,
    Update,
    Delete,
}

impl EntityOperation {
    pub const ALL: [EntityOperation; 3] = [
        EntityOperation::Create,
        EntityOperation::Update,
        EntityOperation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for EntityOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityOperation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(DomainError::UnknownOperation(other.to_string())),
        }
    }
}

/// A `<domain>.<entity>.<operation>` routing key.
///
/// Parsing is purely positional: segments are taken as-is and no wildcard
/// semantics are applied. Wildcard matching belongs to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    domain: String,
    entity: String,
    operation: String,
}

impl RoutingKey {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let segments: Vec<&str> = raw.split('.').collect();
        match segments.as_slice() {
            [domain, entity, operation]
                if !domain.is_empty() && !entity.is_empty() && !operation.is_empty() =>
            {
                Ok(Self {
                    domain: domain.to_string(),
                    entity: entity.to_string(),
                    operation: operation.to_string(),
                })
            }
            _ => Err(DomainError::InvalidRoutingKey(raw.to_string())),
        }
    }

    /// Routing key for a crm entity operation, e.g. `crm.user.create`
    pub fn crm(entity: EntityKind, operation: EntityOperation) -> Self {
        Self {
            domain: CRM_DOMAIN.to_string(),
            entity: entity.as_str().to_string(),
            operation: operation.as_str().to_string(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Deterministic queue name bound to this routing key
    pub fn queue_name(&self) -> String {
        queue_name_for(&self.to_string())
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.domain, self.entity, self.operation)
    }
}

/// `crm.user.create` -> `crm_user_create_queue`
pub fn queue_name_for(routing_key: &str) -> String {
    format!("{}_queue", routing_key.replace('.', "_"))
}
