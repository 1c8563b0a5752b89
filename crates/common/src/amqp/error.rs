use thiserror::Error;

/// Failures of the broker connection manager.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Connection parameters are missing or invalid. Never retried.
    #[error("AMQP configuration error: {0}")]
    Configuration(String),

    /// The broker stayed unreachable for the whole retry budget.
    #[error("failed to connect to AMQP broker after {attempts} attempts: {reason}")]
    Connection { attempts: u32, reason: String },

    /// The client was closed or its connection is gone.
    #[error("AMQP connection is not initialized")]
    NotInitialized,

    #[error("AMQP channel error: {0}")]
    Channel(#[from] lapin::Error),
}
