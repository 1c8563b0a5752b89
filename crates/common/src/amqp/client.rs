use crate::amqp::{retry_with_backoff, BrokerError, ExchangeSpec, RetryPolicy};
use lapin::uri::AMQPUri;
use lapin::{Channel, Connection, ConnectionProperties};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

const REPLY_SUCCESS: u16 = 200;

/// Broker connection parameters. `exchange` names the topic exchange
/// the connection's publisher writes to.
#[derive(Clone, PartialEq, Eq)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
}

impl AmqpConfig {
    pub fn validate(&self) -> Result<(), BrokerError> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if self.username.is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.vhost.is_empty() {
            missing.push("vhost");
        }
        if self.exchange.trim().is_empty() {
            missing.push("exchange");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::Configuration(format!(
                "missing or invalid connection parameters: {}",
                missing.join(", ")
            )))
        }
    }

    fn uri(&self) -> AMQPUri {
        let mut uri = AMQPUri::default();
        uri.authority.host = self.host.clone();
        uri.authority.port = self.port;
        uri.authority.userinfo.username = self.username.clone();
        uri.authority.userinfo.password = self.password.clone();
        uri.vhost = self.vhost.clone();
        uri
    }
}

impl fmt::Debug for AmqpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("exchange", &self.exchange)
            .finish()
    }
}

/// Owns the single broker connection. Consumers and publishers each get
/// their own channel from [`AmqpClient::open_channel`].
pub struct AmqpClient {
    connection: Connection,
    config: AmqpConfig,
    closed: AtomicBool,
}

impl AmqpClient {
    /// Connect and declare the configured exchange, retrying the whole
    /// sequence under `policy`. Configuration errors are returned without
    /// touching the network.
    pub async fn connect(config: AmqpConfig, policy: &RetryPolicy) -> Result<Self, BrokerError> {
        config.validate()?;

        info!(
            host = %config.host,
            port = config.port,
            vhost = %config.vhost,
            exchange = %config.exchange,
            max_attempts = policy.max_attempts,
            "Connecting to AMQP broker"
        );

        let config_ref = &config;
        let connection = retry_with_backoff(policy, "amqp_connect", move |attempt| async move {
            debug!(attempt, "opening AMQP connection");
            Self::establish(config_ref).await
        })
        .await?;

        info!(exchange = %config.exchange, "Successfully connected to AMQP broker");
        Ok(Self {
            connection,
            config,
            closed: AtomicBool::new(false),
        })
    }

    async fn establish(config: &AmqpConfig) -> Result<Connection, lapin::Error> {
        let connection = Connection::connect_uri(config.uri(), ConnectionProperties::default()).await?;

        if let Err(e) = Self::declare_exchange(&connection, &config.exchange).await {
            if let Err(close_err) = connection.close(REPLY_SUCCESS, "bootstrap failed").await {
                debug!(error = %close_err, "failed to close connection after bootstrap error");
            }
            return Err(e);
        }

        Ok(connection)
    }

    async fn declare_exchange(connection: &Connection, exchange: &str) -> Result<(), lapin::Error> {
        let channel = connection.create_channel().await?;
        ExchangeSpec::topic(exchange, true).declare(&channel).await?;
        channel.close(REPLY_SUCCESS, "exchange declared").await
    }

    /// Open a fresh channel on the shared connection
    pub async fn open_channel(&self) -> Result<Channel, BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::NotInitialized);
        }
        Ok(self.connection.create_channel().await?)
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connection.status().connected()
    }

    pub fn exchange(&self) -> &str {
        &self.config.exchange
    }

    /// Close the connection. Calling this more than once is a no-op.
    pub async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("AMQP connection already closed");
            return Ok(());
        }

        if !self.connection.status().connected() {
            warn!("AMQP connection was already lost before close");
            return Ok(());
        }

        info!("Closing AMQP connection");
        self.connection.close(REPLY_SUCCESS, "shutdown").await?;
        Ok(())
    }
}
