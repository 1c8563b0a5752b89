use crate::domain::RoutingKey;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};

/// Exchange kinds the bridge declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeType {
    Topic,
    Direct,
}

impl From<ExchangeType> for ExchangeKind {
    fn from(kind: ExchangeType) -> Self {
        match kind {
            ExchangeType::Topic => ExchangeKind::Topic,
            ExchangeType::Direct => ExchangeKind::Direct,
        }
    }
}

/// An exchange to declare before publishing or binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeType,
    pub durable: bool,
}

impl ExchangeSpec {
    pub fn topic(name: impl Into<String>, durable: bool) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeType::Topic,
            durable,
        }
    }

    pub fn direct(name: impl Into<String>, durable: bool) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeType::Direct,
            durable,
        }
    }

    /// Idempotent as long as the broker's existing exchange has the same kind and durability
    pub async fn declare(&self, channel: &Channel) -> Result<(), lapin::Error> {
        channel
            .exchange_declare(
                &self.name,
                self.kind.into(),
                ExchangeDeclareOptions {
                    durable: self.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
    }
}

/// Queue bound to an exchange by a routing key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub durable: bool,
}

impl QueueBinding {
    /// Binding with the queue named after the routing key
    /// (`crm.user.create` binds `crm_user_create_queue`)
    pub fn for_routing_key(exchange: impl Into<String>, routing_key: &RoutingKey) -> Self {
        Self {
            queue: routing_key.queue_name(),
            exchange: exchange.into(),
            routing_key: routing_key.to_string(),
            durable: false,
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Declare the queue, then bind it. The exchange must already exist.
    pub async fn declare(&self, channel: &Channel) -> Result<(), lapin::Error> {
        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: self.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                &self.queue,
                &self.exchange,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
    }
}
