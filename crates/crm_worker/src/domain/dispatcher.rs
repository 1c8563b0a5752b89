use crate::domain::CrmIntent;
use common::domain::{
    DomainError, DomainResult, EntityKind, EntityOperation, FieldMap, RoutingKey,
};
use common::xml::xml_to_json;
use serde_json::Value;

/// Field carrying the CRM record identifier in update and delete envelopes
pub const ID_FIELD: &str = "Id";

/// Turns a delivery for one entity kind into a [`CrmIntent`].
///
/// Holds no per-message state, so a redelivered message always yields the
/// same decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDispatcher {
    entity: EntityKind,
}

impl EntityDispatcher {
    pub fn new(entity: EntityKind) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn dispatch(&self, routing_key: &str, payload: &[u8]) -> DomainResult<CrmIntent> {
        let document = xml_to_json(payload)?;

        let key = RoutingKey::parse(routing_key)?;
        if key.entity() != self.entity.as_str() {
            return Err(DomainError::InvalidRoutingKey(format!(
                "{} is not routed to {} entities",
                routing_key, self.entity
            )));
        }

        let mut fields = unwrap_envelope(document, key.entity())?;

        match key.operation().parse::<EntityOperation>()? {
            EntityOperation::Create => Ok(CrmIntent::Create { body: fields }),
            EntityOperation::Update => {
                let id = fields
                    .shift_remove(ID_FIELD)
                    .as_ref()
                    .and_then(identifier)
                    .ok_or_else(|| self.missing_identifier(EntityOperation::Update))?;
                Ok(CrmIntent::Update { id, body: fields })
            }
            EntityOperation::Delete => {
                let id = fields
                    .get(ID_FIELD)
                    .and_then(identifier)
                    .ok_or_else(|| self.missing_identifier(EntityOperation::Delete))?;
                Ok(CrmIntent::Delete { id })
            }
        }
    }

    fn missing_identifier(&self, operation: EntityOperation) -> DomainError {
        DomainError::MissingIdentifier {
            entity: self.entity.to_string(),
            operation: operation.to_string(),
        }
    }
}

/// Take the field map under the `entity` root key. An empty `<user/>` root
/// yields an empty map.
fn unwrap_envelope(document: Value, entity: &str) -> DomainResult<FieldMap> {
    let Value::Object(mut root) = document else {
        return Err(DomainError::MalformedInput(
            "translated document is not an object".to_string(),
        ));
    };

    match root.remove(entity) {
        Some(Value::Object(fields)) => Ok(fields),
        Some(Value::Null) => Ok(FieldMap::new()),
        Some(_) => Err(DomainError::MalformedInput(format!(
            "envelope '{}' must contain fields, not text",
            entity
        ))),
        None => Err(DomainError::EnvelopeMismatch {
            expected: entity.to_string(),
            found: root.keys().next().cloned().unwrap_or_default(),
        }),
    }
}

/// CRM record ids are ASCII alphanumeric. Anything else never reaches a
/// request path and counts as a missing id.
fn identifier(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(id) => id.trim().to_string(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };

    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(id)
}
