use async_trait::async_trait;
use bytes::Bytes;

/// Settles a single broker delivery
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> anyhow::Result<()>;

    /// Negative acknowledgement; `requeue` asks the broker to redeliver
    async fn nack(&self, requeue: bool) -> anyhow::Result<()>;
}

/// Publishes a payload to the publisher's exchange under a routing key
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, payload: Bytes) -> anyhow::Result<()>;
}
