use crate::amqp::error::BrokerError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fixed-delay retry budget used while bootstrapping broker resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Run `attempt` until it succeeds or the policy's attempts are used up,
/// sleeping `policy.delay` between failed attempts.
///
/// The closure receives the 1-based attempt number. A policy with zero
/// attempts still runs once.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, BrokerError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt_number in 1..=max_attempts {
        match attempt(attempt_number).await {
            Ok(value) => {
                if attempt_number > 1 {
                    info!(
                        operation = %operation,
                        attempt = attempt_number,
                        "succeeded after retrying"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                last_error = e.to_string();
                if attempt_number < max_attempts {
                    warn!(
                        operation = %operation,
                        attempt = attempt_number,
                        max_attempts,
                        retry_in_secs = policy.delay.as_secs_f64(),
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                } else {
                    error!(
                        operation = %operation,
                        attempt = attempt_number,
                        error = %e,
                        "final attempt failed, giving up"
                    );
                }
            }
        }
    }

    Err(BrokerError::Connection {
        attempts: max_attempts,
        reason: last_error,
    })
}
