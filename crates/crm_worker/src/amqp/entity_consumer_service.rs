use crate::domain::EntitySyncService;
use common::amqp::{ConsumeRequest, ConsumeResponse};
use common::domain::DomainError;
use common::monitoring::{LogEventPublisher, LogLevel};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, warn};

/// Tower service mapping a sync outcome onto ack or nak.
///
/// Every failure, including content defects that redelivery cannot fix,
/// becomes a nak; the consumer runtime decides whether to requeue. Failures
/// are also reported to the log exchange.
#[derive(Clone)]
pub struct EntityConsumerService {
    sync_service: Arc<EntitySyncService>,
    event_log: Arc<LogEventPublisher>,
}

impl EntityConsumerService {
    pub fn new(sync_service: Arc<EntitySyncService>, event_log: Arc<LogEventPublisher>) -> Self {
        Self {
            sync_service,
            event_log,
        }
    }
}

/// Content defects are the publisher's problem; everything else is ours
fn failure_level(error: &DomainError) -> LogLevel {
    if error.is_content_defect() {
        LogLevel::Warn
    } else {
        LogLevel::Error
    }
}

impl Service<ConsumeRequest> for EntityConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let sync_service = Arc::clone(&self.sync_service);
        let event_log = Arc::clone(&self.event_log);

        Box::pin(async move {
            match sync_service.sync(&req.routing_key, &req.payload).await {
                Ok(response) => {
                    debug!(
                        routing_key = %req.routing_key,
                        status = response.status,
                        "entity synced to crm"
                    );
                    Ok(ConsumeResponse::ack())
                }
                Err(e) => {
                    warn!(
                        routing_key = %req.routing_key,
                        redelivered = req.redelivered,
                        content_defect = e.is_content_defect(),
                        error = %e,
                        "failed to sync entity"
                    );
                    event_log
                        .send(
                            failure_level(&e),
                            e.status_code(),
                            format!("{}: {}", req.routing_key, e),
                        )
                        .await;
                    Ok(ConsumeResponse::nak(e.to_string()))
                }
            }
        })
    }
}
