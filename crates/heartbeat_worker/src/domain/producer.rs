use crate::domain::{Heartbeat, HeartbeatConfig};
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use common::amqp::MessagePublisher;
use common::domain::HEARTBEAT_ROUTING_KEY;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publishes a heartbeat on a fixed interval until cancelled.
///
/// Fire-and-forget: a failed publish is logged and the next tick carries on.
pub struct HeartbeatProducer {
    config: HeartbeatConfig,
    publisher: Arc<dyn MessagePublisher>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl HeartbeatProducer {
    pub fn new(config: HeartbeatConfig, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            config,
            publisher,
            last_timestamp: None,
        }
    }

    pub async fn run(&mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        if self.config.interval.is_zero() {
            anyhow::bail!("heartbeat interval must be greater than zero");
        }

        info!(
            service = %self.config.service_name,
            interval_secs = self.config.interval.as_secs(),
            routing_key = HEARTBEAT_ROUTING_KEY,
            "starting heartbeat producer"
        );

        // First tick completes immediately
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    info!("received shutdown signal, stopping heartbeat producer");
                    return Ok(());
                }
                _ = ticker.tick() => self.beat().await,
            }
        }
    }

    /// Build and publish a single heartbeat
    pub async fn beat(&mut self) {
        let timestamp = self.next_timestamp(Utc::now());
        let payload = match Heartbeat::new(&self.config, timestamp).to_xml() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to render heartbeat, skipping");
                return;
            }
        };

        match self
            .publisher
            .publish(HEARTBEAT_ROUTING_KEY, Bytes::from(payload))
            .await
        {
            Ok(()) => debug!(timestamp = %timestamp, "heartbeat published"),
            Err(e) => warn!(error = %format!("{:#}", e), "failed to publish heartbeat, skipping"),
        }
    }

    /// Wall-clock time, bumped past the previous heartbeat when the clock
    /// has not moved forward at millisecond resolution.
    fn next_timestamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let timestamp = match self.last_timestamp {
            Some(last) if now < last + TimeDelta::milliseconds(1) => {
                last + TimeDelta::milliseconds(1)
            }
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}
