mod config;

use common::amqp::{AmqpClient, AmqpPublisher, ExchangeSpec};
use common::crm::{SalesforceClient, SalesforceObjectApi};
use common::domain::{EntityKind, EntityOperation};
use common::monitoring::{LogEventPublisher, LogLevel};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use crate::config::ServiceConfig;
use crm_runner::Runner;
use crm_worker::{CrmWorker, CrmWorkerConfig};
use heartbeat_worker::HeartbeatWorker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

struct Bridge {
    amqp_client: Arc<AmqpClient>,
    heartbeat_publisher: Arc<AmqpPublisher>,
    log_publisher: Arc<AmqpPublisher>,
    event_log: Arc<LogEventPublisher>,
    crm_workers: Vec<CrmWorker>,
    heartbeat_worker: HeartbeatWorker,
}

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        environment = %config.environment,
        otel_enabled = config.otel_enabled,
        user_exchange = %config.user_exchange,
        company_exchange = %config.company_exchange,
        "Starting crm-bridge service"
    );

    let bridge = match initialize(&config).await {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to initialize crm-bridge");
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new();

    for worker in bridge.crm_workers {
        for (name, process) in worker.into_runner_processes() {
            runner = runner.with_boxed_process(name, process);
        }
    }

    let (name, process) = bridge.heartbeat_worker.into_runner_process();
    runner = runner.with_boxed_process(name, process);

    bridge
        .event_log
        .send(LogLevel::Info, 200, "Consumers for CRM bridge started")
        .await;

    let amqp_client = bridge.amqp_client;
    let heartbeat_publisher = bridge.heartbeat_publisher;
    let log_publisher = bridge.log_publisher;
    let event_log = bridge.event_log;
    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            event_log.send(LogLevel::Info, 200, "CRM bridge shutting down").await;
            heartbeat_publisher.close().await;
            log_publisher.close().await;
            amqp_client.close().await?;

            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn initialize(config: &ServiceConfig) -> anyhow::Result<Bridge> {
    info!("Connecting to RabbitMQ...");
    let amqp_client = Arc::new(AmqpClient::connect(config.amqp(), &config.connect_retry()).await?);

    let log_channel = amqp_client.open_channel().await?;
    ExchangeSpec::direct(&config.log_exchange, true)
        .declare(&log_channel)
        .await?;
    let log_publisher = Arc::new(AmqpPublisher::new(log_channel, &config.log_exchange));
    let event_log = Arc::new(LogEventPublisher::new(
        &config.log_service_name,
        log_publisher.clone(),
    ));
    event_log
        .send(LogLevel::Info, 200, "Connected to RabbitMQ")
        .await;

    // From here on the log exchange is up, so failures are reported there too
    let (crm_workers, heartbeat_publisher, heartbeat_worker) =
        match start_workers(config, &amqp_client, &event_log).await {
            Ok(workers) => workers,
            Err(e) => {
                event_log
                    .send(LogLevel::Error, 500, format!("Error during startup: {:#}", e))
                    .await;
                return Err(e);
            }
        };

    info!(
        consumers = crm_workers.len() * EntityOperation::ALL.len(),
        exchange = %amqp_client.exchange(),
        log_exchange = %config.log_exchange,
        "crm-bridge initialized"
    );

    Ok(Bridge {
        amqp_client,
        heartbeat_publisher,
        log_publisher,
        event_log,
        crm_workers,
        heartbeat_worker,
    })
}

async fn start_workers(
    config: &ServiceConfig,
    amqp_client: &AmqpClient,
    event_log: &Arc<LogEventPublisher>,
) -> anyhow::Result<(Vec<CrmWorker>, Arc<AmqpPublisher>, HeartbeatWorker)> {
    let salesforce = Arc::new(SalesforceClient::new(config.salesforce())?);

    let mut crm_workers = Vec::with_capacity(EntityKind::ALL.len());
    for entity in EntityKind::ALL {
        let api = Arc::new(SalesforceObjectApi::new(
            Arc::clone(&salesforce),
            config.sobject_for(entity),
        ));
        let worker_config = CrmWorkerConfig {
            exchange_durable: config.entity_exchange_durable,
            queue_durable: config.entity_queue_durable,
            consumer: config.consumer_options(),
            ..CrmWorkerConfig::new(entity, config.exchange_for(entity))
        };
        crm_workers.push(
            CrmWorker::new(amqp_client, api, Arc::clone(event_log), worker_config).await?,
        );
    }

    let heartbeat_publisher = Arc::new(AmqpPublisher::new(
        amqp_client.open_channel().await?,
        amqp_client.exchange(),
    ));
    let heartbeat_worker = HeartbeatWorker::new(config.heartbeat(), heartbeat_publisher.clone());

    Ok((crm_workers, heartbeat_publisher, heartbeat_worker))
}
