use crate::amqp::{ConsumeRequest, DeliveryAcker};
use async_trait::async_trait;
use bytes::Bytes;
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::types::{AMQPValue, FieldTable};
use std::fmt;
use std::sync::Arc;

/// Header quorum queues use to count previous delivery attempts
pub const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// A delivery pulled off a queue, detached from the lapin consumer so the
/// consume loop can be driven from any stream
pub struct InboundDelivery {
    pub routing_key: String,
    pub payload: Bytes,
    pub headers: Option<FieldTable>,
    pub redelivered: bool,
    /// Previous delivery attempts reported by the broker, if any
    pub delivery_count: Option<u32>,
    acker: Arc<dyn DeliveryAcker>,
}

impl InboundDelivery {
    pub fn new(routing_key: impl Into<String>, payload: Bytes, acker: Arc<dyn DeliveryAcker>) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload,
            headers: None,
            redelivered: false,
            delivery_count: None,
            acker,
        }
    }

    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.delivery_count = delivery_count(&headers);
        self.headers = Some(headers);
        self
    }

    pub fn with_redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    pub fn acker(&self) -> &Arc<dyn DeliveryAcker> {
        &self.acker
    }

    pub fn to_request(&self) -> ConsumeRequest {
        ConsumeRequest::new(self.routing_key.clone(), self.payload.clone(), self.headers.clone())
            .with_redelivered(self.redelivered)
            .with_delivery_count(self.delivery_count)
    }
}

impl From<Delivery> for InboundDelivery {
    fn from(delivery: Delivery) -> Self {
        let inbound = InboundDelivery::new(
            delivery.routing_key.as_str(),
            Bytes::from(delivery.data),
            Arc::new(LapinAcker(delivery.acker)),
        )
        .with_redelivered(delivery.redelivered);

        match delivery.properties.headers().clone() {
            Some(headers) => inbound.with_headers(headers),
            None => inbound,
        }
    }
}

impl fmt::Debug for InboundDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundDelivery")
            .field("routing_key", &self.routing_key)
            .field("payload_bytes", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .field("delivery_count", &self.delivery_count)
            .finish()
    }
}

fn delivery_count(headers: &FieldTable) -> Option<u32> {
    let value = headers
        .inner()
        .iter()
        .find(|(name, _)| name.as_str() == DELIVERY_COUNT_HEADER)
        .map(|(_, value)| value)?;

    match value {
        AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongUInt(n) => Some(*n),
        AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
        _ => None,
    }
}

struct LapinAcker(Acker);

#[async_trait]
impl DeliveryAcker for LapinAcker {
    async fn ack(&self) -> anyhow::Result<()> {
        self.0.ack(BasicAckOptions { multiple: false }).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> anyhow::Result<()> {
        self.0
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await?;
        Ok(())
    }
}
