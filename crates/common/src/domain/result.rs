use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Per-message failures raised while translating, dispatching or forwarding
/// an inbound delivery. None of these are fatal to a consumer runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid routing key: {0}")]
    InvalidRoutingKey(String),

    #[error("Envelope mismatch: expected root '{expected}', found '{found}'")]
    EnvelopeMismatch { expected: String, found: String },

    #[error("Missing identifier: {entity} {operation} requires an Id field")]
    MissingIdentifier { entity: String, operation: String },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("CRM {operation} failed with status {status}: {body}")]
    CrmCallFailure {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("CRM transport error: {0}")]
    CrmTransport(String),

    #[error("CRM authentication failed: {0}")]
    CrmAuthentication(String),
}

impl DomainError {
    /// Defects in the message itself; redelivery cannot fix these.
    pub fn is_content_defect(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput(_)
                | Self::InvalidRoutingKey(_)
                | Self::EnvelopeMismatch { .. }
                | Self::MissingIdentifier { .. }
                | Self::UnknownOperation(_)
        )
    }

    /// HTTP-style code reported for this failure in operational log events.
    /// CRM rejections keep the CRM's own status.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::CrmCallFailure { status, .. } => *status,
            Self::CrmAuthentication(_) => 401,
            Self::CrmTransport(_) => 503,
            _ => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_defects() {
        assert!(DomainError::MalformedInput("x".into()).is_content_defect());
        assert!(DomainError::MissingIdentifier {
            entity: "user".into(),
            operation: "delete".into(),
        }
        .is_content_defect());
        assert!(!DomainError::CrmCallFailure {
            operation: "create".into(),
            status: 500,
            body: String::new(),
        }
        .is_content_defect());
        assert!(!DomainError::CrmTransport("timeout".into()).is_content_defect());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(DomainError::UnknownOperation("upsert".into()).status_code(), 400);
        assert_eq!(
            DomainError::CrmCallFailure {
                operation: "delete".into(),
                status: 404,
                body: String::new(),
            }
            .status_code(),
            404
        );
        assert_eq!(DomainError::CrmAuthentication("denied".into()).status_code(), 401);
        assert_eq!(DomainError::CrmTransport("timeout".into()).status_code(), 503);
    }

    #[test]
    fn test_crm_call_failure_message_carries_body() {
        let err = DomainError::CrmCallFailure {
            operation: "update".into(),
            status: 400,
            body: "[{\"errorCode\":\"INVALID_FIELD\"}]".into(),
        };
        let message = err.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("INVALID_FIELD"));
    }
}
