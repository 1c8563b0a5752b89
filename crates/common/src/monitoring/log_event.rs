use crate::domain::{DomainError, DomainResult};
use crate::xml::json_to_xml;
use serde::Serialize;
use std::fmt;

pub const LOG_ROOT: &str = "Log";
pub const DEFAULT_LOG_EXCHANGE: &str = "log_monitoring";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational event for the control room, rendered as
/// `<Log><ServiceName/><Status/><Code/><Message/></Log>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEvent {
    pub service_name: String,
    pub status: String,
    pub code: u16,
    pub message: String,
}

impl LogEvent {
    pub fn new(
        service_name: impl Into<String>,
        level: LogLevel,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            status: level.as_str().to_string(),
            code,
            message: message.into(),
        }
    }

    pub fn to_xml(&self) -> DomainResult<Vec<u8>> {
        let record = serde_json::to_value(self)
            .map_err(|e| DomainError::MalformedInput(format!("unserializable log event: {}", e)))?;

        let mut document = serde_json::Map::new();
        document.insert(LOG_ROOT.to_string(), record);
        json_to_xml(&serde_json::Value::Object(document))
    }
}
