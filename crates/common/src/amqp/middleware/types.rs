use bytes::Bytes;
use lapin::types::FieldTable;

/// One broker delivery as seen by the tower stack.
///
/// Owns its data so it can travel through middleware layers; the acker stays
/// with the consumer loop, which settles the delivery from the response.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// Routing key the message was published with
    pub routing_key: String,
    pub payload: Bytes,
    /// AMQP headers, carrying trace context when present
    pub headers: Option<FieldTable>,
    pub redelivered: bool,
    /// Previous delivery attempts reported by the broker, if any
    pub delivery_count: Option<u32>,
}

impl ConsumeRequest {
    pub fn new(routing_key: impl Into<String>, payload: Bytes, headers: Option<FieldTable>) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload,
            headers,
            redelivered: false,
            delivery_count: None,
        }
    }

    pub fn with_redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    pub fn with_delivery_count(mut self, delivery_count: Option<u32>) -> Self {
        self.delivery_count = delivery_count;
        self
    }
}

/// How the consumer loop settles a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    /// Processed; acknowledge it
    Ack,
    /// Failed; negatively acknowledge it so the broker redelivers
    Nak(Option<String>),
}

impl ConsumeResponse {
    pub fn ack() -> Self {
        Self::Ack
    }

    pub fn nak(reason: impl Into<String>) -> Self {
        Self::Nak(Some(reason.into()))
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nak(_) => "nak",
        }
    }
}
