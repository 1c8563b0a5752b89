#![cfg(feature = "integration-tests")]

use bytes::Bytes;
use common::amqp::{
    AmqpClient, AmqpConfig, AmqpPublisher, ExchangeSpec, MessagePublisher, RetryPolicy,
};
use common::domain::{CrmResponse, EntityKind, FieldMap, MockCrmApi, LOG_ROUTING_KEY};
use common::monitoring::{LogEventPublisher, DEFAULT_LOG_EXCHANGE};
use common::xml::xml_to_json;
use lapin::options::{BasicGetOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use crm_runner::Runner;
use crm_worker::{CrmWorker, CrmWorkerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::WaitFor;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const EXCHANGE: &str = "crm.integration";

struct TestEnvironment {
    _rabbitmq: ContainerAsync<GenericImage>,
    config: AmqpConfig,
}

async fn setup_test_env() -> TestEnvironment {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .try_init();

    let rabbitmq = GenericImage::new("rabbitmq", "3.13-alpine")
        .with_exposed_port(5672.into())
        .with_wait_for(WaitFor::message_on_stdout("Server startup complete"))
        .start()
        .await
        .unwrap();

    let host = rabbitmq.get_host().await.unwrap().to_string();
    let port = rabbitmq.get_host_port_ipv4(5672).await.unwrap();

    TestEnvironment {
        _rabbitmq: rabbitmq,
        config: AmqpConfig {
            host,
            port,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            exchange: EXCHANGE.to_string(),
        },
    }
}

#[tokio::test]
async fn test_failed_delivery_is_redelivered_until_the_crm_accepts_it() {
    let env = setup_test_env().await;
    let client = Arc::new(
        AmqpClient::connect(env.config.clone(), &RetryPolicy::new(5, Duration::from_secs(1)))
            .await
            .unwrap(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, FieldMap)>();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut api = MockCrmApi::new();
    api.expect_create().returning(move |body| {
        let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = tx.send((attempt, body.clone()));
        // First attempt fails so the broker has to redeliver
        if attempt == 1 {
            Ok(CrmResponse::new(503, "unavailable"))
        } else {
            Ok(CrmResponse::new(201, r#"{"id":"003XYZ"}"#))
        }
    });

    // Log exchange plus a private queue to watch it
    let log_channel = client.open_channel().await.unwrap();
    ExchangeSpec::direct(DEFAULT_LOG_EXCHANGE, true)
        .declare(&log_channel)
        .await
        .unwrap();
    let watch = log_channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                exclusive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap();
    log_channel
        .queue_bind(
            watch.name().as_str(),
            DEFAULT_LOG_EXCHANGE,
            LOG_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .unwrap();
    let log_publisher = Arc::new(AmqpPublisher::new(
        client.open_channel().await.unwrap(),
        DEFAULT_LOG_EXCHANGE,
    ));
    let event_log = Arc::new(LogEventPublisher::new("CRM_Service", log_publisher.clone()));

    let worker = CrmWorker::new(
        &client,
        Arc::new(api),
        event_log,
        CrmWorkerConfig::new(EntityKind::User, EXCHANGE),
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    let mut runner = Runner::new().with_cancellation_token(token.clone());
    for (name, process) in worker.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }
    let running = tokio::spawn(runner.run_until_stopped());

    let publisher = AmqpPublisher::new(client.open_channel().await.unwrap(), EXCHANGE);
    publisher
        .publish(
            "crm.user.create",
            Bytes::from_static(b"<user><FirstName>Zero</FirstName><LastName>Cool</LastName></user>"),
        )
        .await
        .unwrap();

    let (first_attempt, first_body) = timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let (second_attempt, second_body) = timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first_attempt, 1);
    assert_eq!(second_attempt, 2);
    assert_eq!(first_body, second_body);
    assert_eq!(
        second_body.get("LastName").and_then(|v| v.as_str()),
        Some("Cool")
    );

    // The 503 was reported on the log exchange
    let logged = timeout(Duration::from_secs(10), async {
        loop {
            if let Some(message) = log_channel
                .basic_get(watch.name().as_str(), BasicGetOptions { no_ack: true })
                .await
                .unwrap()
            {
                break message.delivery.data;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .unwrap();
    let document = xml_to_json(&logged).unwrap();
    assert_eq!(document["Log"]["Status"], "ERROR");
    assert_eq!(document["Log"]["Code"], "503");

    token.cancel();
    let result = timeout(Duration::from_secs(10), running).await.unwrap().unwrap();
    assert!(result.is_ok());

    publisher.close().await;
    log_publisher.close().await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_closed_client_refuses_channels() {
    let env = setup_test_env().await;
    let client = AmqpClient::connect(env.config.clone(), &RetryPolicy::default())
        .await
        .unwrap();

    assert!(client.is_open());
    client.close().await.unwrap();
    assert!(!client.is_open());
    assert!(client.open_channel().await.is_err());
}
