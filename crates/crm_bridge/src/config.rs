use common::amqp::{AmqpConfig, ConsumerOptions, RedeliveryPolicy, RetryPolicy};
use common::crm::{default_sobject, SalesforceConfig};
use common::domain::EntityKind;
use common::monitoring::DEFAULT_LOG_EXCHANGE;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use heartbeat_worker::HeartbeatConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deployment environment reported in heartbeats and telemetry
    #[serde(default = "default_environment")]
    pub environment: String,

    // RabbitMQ configuration. Connection fields have no defaults; anything
    // missing is reported by the connection manager.
    pub rabbitmq_host: Option<String>,
    pub rabbitmq_port: Option<u16>,
    pub rabbitmq_username: Option<String>,
    pub rabbitmq_password: Option<String>,
    /// Exchange the heartbeat is published to
    pub rabbitmq_exchange: Option<String>,

    #[serde(default = "default_rabbitmq_vhost")]
    pub rabbitmq_vhost: String,

    /// Connection attempts before startup gives up
    #[serde(default = "default_connect_max_attempts")]
    pub connect_max_attempts: u32,

    #[serde(default = "default_connect_retry_delay_secs")]
    pub connect_retry_delay_secs: u64,

    /// Unacknowledged deliveries per queue
    #[serde(default = "default_consumer_prefetch")]
    pub consumer_prefetch: u16,

    /// Deliveries after which a failing message is dropped instead of
    /// requeued. Unset means requeue forever.
    pub consumer_max_deliveries: Option<u32>,

    #[serde(default = "default_user_exchange")]
    pub user_exchange: String,

    #[serde(default = "default_company_exchange")]
    pub company_exchange: String,

    #[serde(default = "default_true")]
    pub entity_exchange_durable: bool,

    #[serde(default)]
    pub entity_queue_durable: bool,

    // Heartbeat configuration
    #[serde(default = "default_heartbeat_service_name")]
    pub heartbeat_service_name: String,

    /// Whole seconds; must be at least 1
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Host reported in heartbeats; falls back to `$HOSTNAME`
    pub heartbeat_host: Option<String>,

    // Operational log events
    /// Durable direct exchange receiving `controlroom.log.event`
    #[serde(default = "default_log_exchange")]
    pub log_exchange: String,

    #[serde(default = "default_log_service_name")]
    pub log_service_name: String,

    // Salesforce configuration
    #[serde(default = "default_salesforce_login_url")]
    pub salesforce_login_url: String,

    #[serde(default)]
    pub salesforce_client_id: String,

    #[serde(default)]
    pub salesforce_client_secret: String,

    #[serde(default)]
    pub salesforce_username: String,

    #[serde(default)]
    pub salesforce_password: String,

    #[serde(default)]
    pub salesforce_security_token: String,

    #[serde(default = "default_salesforce_api_version")]
    pub salesforce_api_version: String,

    #[serde(default = "default_salesforce_user_sobject")]
    pub salesforce_user_sobject: String,

    #[serde(default = "default_salesforce_company_sobject")]
    pub salesforce_company_sobject: String,

    /// Per-request timeout for CRM calls in seconds
    #[serde(default = "default_salesforce_timeout_secs")]
    pub salesforce_timeout_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default)]
    pub otel_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_rabbitmq_vhost() -> String {
    "/".to_string()
}

fn default_connect_max_attempts() -> u32 {
    5
}

fn default_connect_retry_delay_secs() -> u64 {
    5
}

fn default_consumer_prefetch() -> u16 {
    10
}

fn default_user_exchange() -> String {
    "user".to_string()
}

fn default_company_exchange() -> String {
    "company".to_string()
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_service_name() -> String {
    "CRM_Service".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    1
}

fn default_log_exchange() -> String {
    DEFAULT_LOG_EXCHANGE.to_string()
}

fn default_log_service_name() -> String {
    "CRM_Service".to_string()
}

fn default_salesforce_login_url() -> String {
    "https://login.salesforce.com".to_string()
}

fn default_salesforce_api_version() -> String {
    "v60.0".to_string()
}

fn default_salesforce_user_sobject() -> String {
    default_sobject(EntityKind::User).to_string()
}

fn default_salesforce_company_sobject() -> String {
    default_sobject(EntityKind::Company).to_string()
}

fn default_salesforce_timeout_secs() -> u64 {
    30
}

fn default_otel_service_name() -> String {
    "crm-bridge".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("CRM_BRIDGE"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Values that deserialize but cannot run. Broker connection fields are
    /// checked later by the connection manager.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Message(
                "heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.log_exchange.trim().is_empty() {
            return Err(ConfigError::Message("log_exchange must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn amqp(&self) -> AmqpConfig {
        AmqpConfig {
            host: self.rabbitmq_host.clone().unwrap_or_default(),
            port: self.rabbitmq_port.unwrap_or_default(),
            username: self.rabbitmq_username.clone().unwrap_or_default(),
            password: self.rabbitmq_password.clone().unwrap_or_default(),
            vhost: self.rabbitmq_vhost.clone(),
            exchange: self.rabbitmq_exchange.clone().unwrap_or_default(),
        }
    }

    pub fn connect_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connect_max_attempts,
            Duration::from_secs(self.connect_retry_delay_secs),
        )
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            prefetch_count: self.consumer_prefetch,
            redelivery: match self.consumer_max_deliveries {
                Some(max) => RedeliveryPolicy::capped(max),
                None => RedeliveryPolicy::unbounded(),
            },
        }
    }

    pub fn exchange_for(&self, entity: EntityKind) -> &str {
        match entity {
            EntityKind::User => &self.user_exchange,
            EntityKind::Company => &self.company_exchange,
        }
    }

    pub fn sobject_for(&self, entity: EntityKind) -> &str {
        match entity {
            EntityKind::User => &self.salesforce_user_sobject,
            EntityKind::Company => &self.salesforce_company_sobject,
        }
    }

    pub fn salesforce(&self) -> SalesforceConfig {
        SalesforceConfig {
            login_url: self.salesforce_login_url.clone(),
            client_id: self.salesforce_client_id.clone(),
            client_secret: self.salesforce_client_secret.clone(),
            username: self.salesforce_username.clone(),
            password: self.salesforce_password.clone(),
            security_token: self.salesforce_security_token.clone(),
            api_version: self.salesforce_api_version.clone(),
            request_timeout: Duration::from_secs(self.salesforce_timeout_secs),
        }
    }

    pub fn heartbeat(&self) -> HeartbeatConfig {
        let host = self
            .heartbeat_host
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());

        HeartbeatConfig {
            service_name: self.heartbeat_service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host,
            environment: self.environment.clone(),
            interval: Duration::from_secs(self.heartbeat_interval_secs),
        }
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: self.environment.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests mutate process-wide environment variables
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 9] = [
        "CRM_BRIDGE_LOG_LEVEL",
        "CRM_BRIDGE_HEARTBEAT_INTERVAL_SECS",
        "CRM_BRIDGE_LOG_EXCHANGE",
        "CRM_BRIDGE_RABBITMQ_HOST",
        "CRM_BRIDGE_RABBITMQ_PORT",
        "CRM_BRIDGE_RABBITMQ_USERNAME",
        "CRM_BRIDGE_RABBITMQ_PASSWORD",
        "CRM_BRIDGE_RABBITMQ_EXCHANGE",
        "CRM_BRIDGE_CONSUMER_MAX_DELIVERIES",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: Test runs with mutex lock to prevent concurrent env access
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.exchange_for(EntityKind::User), "user");
        assert_eq!(config.exchange_for(EntityKind::Company), "company");
        assert_eq!(config.sobject_for(EntityKind::User), "Contact");
        assert_eq!(config.sobject_for(EntityKind::Company), "Account");
        assert_eq!(config.connect_retry(), RetryPolicy::default());
        assert_eq!(config.consumer_options(), ConsumerOptions::default());
        assert_eq!(config.heartbeat().interval, Duration::from_secs(1));
        assert_eq!(config.log_exchange, "log_monitoring");
        assert_eq!(config.log_service_name, "CRM_Service");
        assert_eq!(config.salesforce().request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_connection_fields_fail_validation() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        let err = config.amqp().validate().unwrap_err().to_string();
        assert!(err.contains("host"));
        assert!(err.contains("password"));
        assert!(err.contains("exchange"));
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("CRM_BRIDGE_LOG_LEVEL", "debug");
            std::env::set_var("CRM_BRIDGE_RABBITMQ_HOST", "rabbit");
            std::env::set_var("CRM_BRIDGE_RABBITMQ_PORT", "5673");
            std::env::set_var("CRM_BRIDGE_RABBITMQ_USERNAME", "bridge");
            std::env::set_var("CRM_BRIDGE_RABBITMQ_PASSWORD", "secret");
            std::env::set_var("CRM_BRIDGE_RABBITMQ_EXCHANGE", "monitoring");
            std::env::set_var("CRM_BRIDGE_CONSUMER_MAX_DELIVERIES", "3");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");

        let amqp = config.amqp();
        assert!(amqp.validate().is_ok());
        assert_eq!(amqp.host, "rabbit");
        assert_eq!(amqp.port, 5673);
        assert_eq!(amqp.vhost, "/");
        assert_eq!(
            config.consumer_options().redelivery,
            RedeliveryPolicy::capped(3)
        );

        clear_env();
    }

    #[test]
    fn test_zero_heartbeat_interval_is_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("CRM_BRIDGE_HEARTBEAT_INTERVAL_SECS", "0");
        }

        let result = ServiceConfig::from_env();
        clear_env();

        let err = result.err().expect("zero interval must fail").to_string();
        assert!(err.contains("heartbeat_interval_secs"));
    }

    #[test]
    fn test_blank_log_exchange_is_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("CRM_BRIDGE_HEARTBEAT_INTERVAL_SECS", "30");
            std::env::set_var("CRM_BRIDGE_LOG_EXCHANGE", " ");
        }

        let result = ServiceConfig::from_env();
        clear_env();

        assert!(result.is_err());
    }
}
