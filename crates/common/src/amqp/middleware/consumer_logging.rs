use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::amqp::{ConsumeRequest, ConsumeResponse, TRACEPARENT_HEADER};
use tower::{Layer, Service};
use tracing::{error, info, warn, Instrument, Span};

/// Tower layer logging the outcome and duration of each consumed delivery
#[derive(Clone, Default)]
pub struct AmqpConsumeLoggingLayer;

impl AmqpConsumeLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AmqpConsumeLoggingLayer {
    type Service = AmqpConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AmqpConsumeLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct AmqpConsumeLoggingService<S> {
    inner: S,
}

/// Broker-side facts about a delivery, taken before the request moves on
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeliveryRecord {
    routing_key: String,
    payload_bytes: usize,
    redelivered: bool,
    /// Broker-reported previous attempts; absent on classic queues
    delivery_count: Option<u32>,
    /// Publisher sent W3C trace context
    traced: bool,
}

impl DeliveryRecord {
    fn capture(req: &ConsumeRequest) -> Self {
        let traced = req.headers.as_ref().is_some_and(|headers| {
            headers
                .inner()
                .keys()
                .any(|name| name.as_str() == TRACEPARENT_HEADER)
        });

        Self {
            routing_key: req.routing_key.clone(),
            payload_bytes: req.payload.len(),
            redelivered: req.redelivered,
            delivery_count: req.delivery_count,
            traced,
        }
    }

    /// 1 for a first delivery. Falls back to the redelivered flag when the
    /// queue does not count.
    fn attempt(&self) -> u32 {
        match self.delivery_count {
            Some(count) => count.saturating_add(1),
            None if self.redelivered => 2,
            None => 1,
        }
    }

    fn log<E: Display>(&self, result: &Result<ConsumeResponse, E>, duration_ms: u128) {
        let routing_key = &self.routing_key;
        let attempt = self.attempt();

        match result {
            Ok(ConsumeResponse::Ack) => info!(
                routing_key = %routing_key,
                payload_bytes = self.payload_bytes,
                attempt,
                delivery_count = ?self.delivery_count,
                traced = self.traced,
                outcome = "ack",
                duration_ms = %duration_ms,
                "consumed {routing_key} (attempt {attempt}) in {duration_ms}ms [ack]"
            ),
            Ok(ConsumeResponse::Nak(reason)) => {
                let reason = reason.as_deref().unwrap_or("unspecified");
                warn!(
                    routing_key = %routing_key,
                    payload_bytes = self.payload_bytes,
                    attempt,
                    delivery_count = ?self.delivery_count,
                    redelivered = self.redelivered,
                    traced = self.traced,
                    outcome = "nak",
                    reason = %reason,
                    duration_ms = %duration_ms,
                    "consumed {routing_key} (attempt {attempt}) in {duration_ms}ms [nak]: {reason}"
                )
            }
            Err(e) => error!(
                routing_key = %routing_key,
                payload_bytes = self.payload_bytes,
                attempt,
                delivery_count = ?self.delivery_count,
                traced = self.traced,
                duration_ms = %duration_ms,
                error = %e,
                "service failed on {routing_key} (attempt {attempt}) after {duration_ms}ms: {e}"
            ),
        }
    }
}

impl<S> Service<ConsumeRequest> for AmqpConsumeLoggingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let record = DeliveryRecord::capture(&req);
        let start = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                record.log(&result, start.elapsed().as_millis());
                result
            }
            .instrument(Span::current()),
        )
    }
}
