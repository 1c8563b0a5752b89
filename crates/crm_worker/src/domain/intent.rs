use common::domain::{EntityOperation, FieldMap};

/// What the CRM should do for one inbound message, independent of wire format
#[derive(Debug, Clone, PartialEq)]
pub enum CrmIntent {
    Create { body: FieldMap },
    /// `body` never contains the `Id` field
    Update { id: String, body: FieldMap },
    Delete { id: String },
}

impl CrmIntent {
    pub fn operation(&self) -> EntityOperation {
        match self {
            Self::Create { .. } => EntityOperation::Create,
            Self::Update { .. } => EntityOperation::Update,
            Self::Delete { .. } => EntityOperation::Delete,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Create { .. } => None,
            Self::Update { id, .. } | Self::Delete { id } => Some(id),
        }
    }
}
