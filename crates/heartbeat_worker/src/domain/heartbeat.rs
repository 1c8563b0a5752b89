use chrono::{DateTime, SecondsFormat, Utc};
use common::domain::{DomainError, DomainResult};
use common::xml::json_to_xml;
use serde::Serialize;
use std::time::Duration;

pub const HEARTBEAT_ROOT: &str = "Heartbeat";
pub const STATUS_OK: &str = "OK";

/// Static part of every heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub service_name: String,
    pub version: String,
    pub host: String,
    pub environment: String,
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            service_name: "CRM_Service".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: "localhost".to_string(),
            environment: "development".to_string(),
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeartbeatMetadata {
    pub version: String,
    pub host: String,
    pub environment: String,
}

/// Liveness record published on `monitoring.heartbeat.create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Heartbeat {
    pub service_name: String,
    pub status: String,
    /// Generation time, not send time
    pub timestamp: String,
    /// Seconds between heartbeats
    pub heart_beat_interval: u64,
    pub metadata: HeartbeatMetadata,
}

impl Heartbeat {
    pub fn new(config: &HeartbeatConfig, timestamp: DateTime<Utc>) -> Self {
        Self {
            service_name: config.service_name.clone(),
            status: STATUS_OK.to_string(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            heart_beat_interval: config.interval.as_secs(),
            metadata: HeartbeatMetadata {
                version: config.version.clone(),
                host: config.host.clone(),
                environment: config.environment.clone(),
            },
        }
    }

    pub fn to_xml(&self) -> DomainResult<Vec<u8>> {
        let mut document = serde_json::Map::new();
        let record = serde_json::to_value(self)
            .map_err(|e| DomainError::MalformedInput(format!("unserializable heartbeat: {}", e)))?;
        document.insert(HEARTBEAT_ROOT.to_string(), record);
        json_to_xml(&serde_json::Value::Object(document))
    }
}
