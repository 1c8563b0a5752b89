use crate::domain::{HeartbeatConfig, HeartbeatProducer};
use common::amqp::MessagePublisher;
use crm_runner::AppProcess;
use std::sync::Arc;
use tracing::info;

pub struct HeartbeatWorker {
    producer: HeartbeatProducer,
}

impl HeartbeatWorker {
    pub fn new(config: HeartbeatConfig, publisher: Arc<dyn MessagePublisher>) -> Self {
        info!(service = %config.service_name, host = %config.host, "Initializing heartbeat worker");
        Self {
            producer: HeartbeatProducer::new(config, publisher),
        }
    }

    pub fn into_runner_process(self) -> (String, AppProcess) {
        let mut producer = self.producer;
        let process: AppProcess =
            Box::new(move |ctx| Box::pin(async move { producer.run(ctx).await }));
        ("heartbeat-producer".to_string(), process)
    }
}
