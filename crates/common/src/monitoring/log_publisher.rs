use crate::amqp::MessagePublisher;
use crate::domain::LOG_ROUTING_KEY;
use crate::monitoring::{LogEvent, LogLevel};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends [`LogEvent`]s to the log exchange under `controlroom.log.event`.
///
/// Fire-and-forget like the heartbeat: a failed render or publish is logged
/// locally and never reaches the caller.
pub struct LogEventPublisher {
    service_name: String,
    publisher: Arc<dyn MessagePublisher>,
}

impl LogEventPublisher {
    pub fn new(service_name: impl Into<String>, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            service_name: service_name.into(),
            publisher,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub async fn send(&self, level: LogLevel, code: u16, message: impl Into<String>) {
        let event = LogEvent::new(self.service_name.clone(), level, code, message);
        self.publish(&event).await;
    }

    pub async fn publish(&self, event: &LogEvent) {
        let payload = match event.to_xml() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to render log event, dropping");
                return;
            }
        };

        match self.publisher.publish(LOG_ROUTING_KEY, Bytes::from(payload)).await {
            Ok(()) => debug!(status = %event.status, code = event.code, "log event published"),
            Err(e) => warn!(
                status = %event.status,
                code = event.code,
                error = %format!("{:#}", e),
                "failed to publish log event, dropping"
            ),
        }
    }
}
