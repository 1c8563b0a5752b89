use crate::amqp::trace_context::inject_trace_context;
use crate::amqp::MessagePublisher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use lapin::options::BasicPublishOptions;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use tracing::{debug, instrument, warn};

const REPLY_SUCCESS: u16 = 200;
pub const CONTENT_TYPE_XML: &str = "application/xml";

/// Publishes XML payloads to one exchange over a dedicated channel.
///
/// Publishing is fire-and-forget: no publisher confirms are awaited.
pub struct AmqpPublisher {
    channel: Channel,
    exchange: String,
}

impl AmqpPublisher {
    pub fn new(channel: Channel, exchange: impl Into<String>) -> Self {
        Self {
            channel,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub async fn close(&self) {
        if !self.channel.status().connected() {
            return;
        }
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "publisher shutdown").await {
            warn!(exchange = %self.exchange, error = %e, "failed to close publisher channel");
        }
    }
}

#[async_trait]
impl MessagePublisher for AmqpPublisher {
    #[instrument(skip(self, payload), fields(exchange = %self.exchange, routing_key = %routing_key, payload_size = payload.len()))]
    async fn publish(&self, routing_key: &str, payload: Bytes) -> Result<()> {
        let mut headers = FieldTable::default();
        inject_trace_context(&mut headers);

        let timestamp = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let properties = BasicProperties::default()
            .with_content_type(CONTENT_TYPE_XML.into())
            .with_timestamp(timestamp)
            .with_headers(headers);

        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .context("failed to publish message")?;

        debug!("message published");
        Ok(())
    }
}
