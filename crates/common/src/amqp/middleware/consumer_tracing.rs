use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::amqp::trace_context::extract_trace_context;
use crate::amqp::{ConsumeRequest, ConsumeResponse};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Tower layer opening a `receive` span per delivery, parented on the
/// publisher's trace context when the headers carry one
#[derive(Clone, Default)]
pub struct AmqpConsumeTracingLayer;

impl AmqpConsumeTracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AmqpConsumeTracingLayer {
    type Service = AmqpConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AmqpConsumeTracingService { inner: service }
    }
}

#[derive(Clone)]
pub struct AmqpConsumeTracingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for AmqpConsumeTracingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let span = info_span!(
            target: "amqp",
            "amqp_consume",
            otel.name = %format!("{} receive", req.routing_key),
            messaging.system = "rabbitmq",
            messaging.operation = "receive",
            messaging.rabbitmq.destination.routing_key = %req.routing_key,
            messaging.message.body.size = req.payload.len(),
        );

        if let Some(headers) = &req.headers {
            span.set_parent(extract_trace_context(headers));
        }

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;

                match &result {
                    Ok(response) => {
                        tracing::debug!(outcome = response.outcome(), "delivery processed");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "delivery processing failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::AmqpConsumeLoggingLayer;
    use bytes::Bytes;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    #[tokio::test]
    async fn test_layers_pass_responses_through() {
        let service = ServiceBuilder::new()
            .layer(AmqpConsumeTracingLayer::new())
            .layer(AmqpConsumeLoggingLayer::new())
            .service(service_fn(|req: ConsumeRequest| async move {
                if req.payload.is_empty() {
                    Ok::<_, anyhow::Error>(ConsumeResponse::nak("empty payload"))
                } else {
                    Ok(ConsumeResponse::ack())
                }
            }));

        let response = service
            .clone()
            .oneshot(ConsumeRequest::new(
                "crm.user.create",
                Bytes::from("<user/>"),
                None,
            ))
            .await
            .unwrap();
        assert!(response.is_ack());

        let response = service
            .oneshot(ConsumeRequest::new("crm.user.create", Bytes::new(), None))
            .await
            .unwrap();
        assert_eq!(response, ConsumeResponse::nak("empty payload"));
    }

    #[tokio::test]
    async fn test_layers_propagate_errors() {
        let service = ServiceBuilder::new()
            .layer(AmqpConsumeTracingLayer::new())
            .layer(AmqpConsumeLoggingLayer::new())
            .service(service_fn(|_req: ConsumeRequest| async move {
                Err::<ConsumeResponse, _>(anyhow::anyhow!("boom"))
            }));

        let result = service
            .oneshot(ConsumeRequest::new("crm.company.delete", Bytes::from("x"), None))
            .await;
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }
}
