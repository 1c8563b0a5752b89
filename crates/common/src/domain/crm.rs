use crate::domain::result::DomainResult;
use async_trait::async_trait;
use std::fmt;

pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Raw `(status, body)` pair returned by the CRM for a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmResponse {
    pub status: u16,
    pub body: String,
}

impl CrmResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The four calls the CRM exposes per entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmOperation {
    Create,
    Get,
    Update,
    Delete,
}

impl CrmOperation {
    /// The only status code treated as success for this operation
    pub fn success_status(&self) -> u16 {
        match self {
            Self::Create => 201,
            Self::Get => 200,
            Self::Update | Self::Delete => 204,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for CrmOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRM HTTP surface for one entity kind.
///
/// Implementations own authentication and return whatever status the CRM
/// answered with; status interpretation happens in the caller.
/// `Err` is reserved for transport and authentication failures.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CrmApi: Send + Sync {
    async fn create(&self, body: &FieldMap) -> DomainResult<CrmResponse>;

    async fn get(&self, id: &str) -> DomainResult<CrmResponse>;

    async fn update(&self, id: &str, body: &FieldMap) -> DomainResult<CrmResponse>;

    async fn delete(&self, id: &str) -> DomainResult<CrmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_status_per_operation() {
        assert_eq!(CrmOperation::Create.success_status(), 201);
        assert_eq!(CrmOperation::Get.success_status(), 200);
        assert_eq!(CrmOperation::Update.success_status(), 204);
        assert_eq!(CrmOperation::Delete.success_status(), 204);
    }
}
