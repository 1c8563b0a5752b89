use crate::amqp::EntityConsumerService;
use crate::domain::{CrmOperationGateway, EntityDispatcher, EntitySyncService};
use common::amqp::{
    AmqpClient, AmqpConsumeLoggingLayer, AmqpConsumeLoggingService, AmqpConsumeTracingLayer,
    AmqpConsumeTracingService, AmqpConsumer, ConsumerOptions, ExchangeSpec, QueueBinding,
};
use common::domain::{CrmApi, EntityKind, EntityOperation, RoutingKey};
use common::monitoring::LogEventPublisher;
use crm_runner::AppProcess;
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

pub type EntityConsumerStack =
    AmqpConsumeTracingService<AmqpConsumeLoggingService<EntityConsumerService>>;

#[derive(Debug, Clone)]
pub struct CrmWorkerConfig {
    pub entity: EntityKind,
    pub exchange: String,
    pub exchange_durable: bool,
    pub queue_durable: bool,
    pub consumer: ConsumerOptions,
}

impl CrmWorkerConfig {
    pub fn new(entity: EntityKind, exchange: impl Into<String>) -> Self {
        Self {
            entity,
            exchange: exchange.into(),
            exchange_durable: true,
            queue_durable: false,
            consumer: ConsumerOptions::default(),
        }
    }

    /// Binding for one `crm.{entity}.{operation}` queue
    pub fn binding(&self, operation: EntityOperation) -> QueueBinding {
        QueueBinding::for_routing_key(&self.exchange, &RoutingKey::crm(self.entity, operation))
            .durable(self.queue_durable)
    }
}

/// Tracing outermost so the logging layer runs inside the consume span
pub fn build_service_stack(
    sync_service: Arc<EntitySyncService>,
    event_log: Arc<LogEventPublisher>,
) -> EntityConsumerStack {
    ServiceBuilder::new()
        .layer(AmqpConsumeTracingLayer::new())
        .layer(AmqpConsumeLoggingLayer::new())
        .service(EntityConsumerService::new(sync_service, event_log))
}

/// Consumes the create, update and delete queues of one entity kind
pub struct CrmWorker {
    entity: EntityKind,
    consumers: Vec<AmqpConsumer<EntityConsumerStack>>,
}

impl CrmWorker {
    pub async fn new(
        client: &AmqpClient,
        crm_api: Arc<dyn CrmApi>,
        event_log: Arc<LogEventPublisher>,
        config: CrmWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!(entity = %config.entity, exchange = %config.exchange, "Initializing CRM worker");

        let sync_service = Arc::new(EntitySyncService::new(
            EntityDispatcher::new(config.entity),
            CrmOperationGateway::new(config.entity, crm_api),
        ));

        let exchange = ExchangeSpec::topic(&config.exchange, config.exchange_durable);
        let mut consumers = Vec::with_capacity(EntityOperation::ALL.len());

        for operation in EntityOperation::ALL {
            // One channel per queue keeps prefetch and acks independent
            let channel = client.open_channel().await?;
            exchange.declare(&channel).await?;

            let consumer_tag = format!("crm-bridge-{}-{}", config.entity, operation);
            let consumer = AmqpConsumer::bind(
                channel,
                config.binding(operation),
                &consumer_tag,
                config.consumer,
                build_service_stack(Arc::clone(&sync_service), Arc::clone(&event_log)),
            )
            .await?;
            consumers.push(consumer);
        }

        info!(entity = %config.entity, queues = consumers.len(), "CRM worker initialized");

        Ok(Self {
            entity: config.entity,
            consumers,
        })
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    /// One named process per queue
    pub fn into_runner_processes(self) -> Vec<(String, AppProcess)> {
        self.consumers
            .into_iter()
            .map(|mut consumer| {
                let name = format!("crm-consumer-{}", consumer.binding().queue);
                let process: AppProcess =
                    Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }));
                (name, process)
            })
            .collect()
    }
}
