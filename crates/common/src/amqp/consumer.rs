use crate::amqp::{ConsumeRequest, ConsumeResponse, InboundDelivery, QueueBinding};
use anyhow::{anyhow, Context, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

const REPLY_SUCCESS: u16 = 200;

pub type DeliveryStream = BoxStream<'static, Result<InboundDelivery>>;

/// Lifecycle of a queue consumer. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Unbound,
    Bound,
    Consuming,
    Closed,
}

/// Decides whether a failed delivery goes back to the queue.
///
/// Unbounded by default, so a poison message is redelivered until an
/// operator removes it. With `max_deliveries` set, a delivery whose
/// broker-reported attempt count reaches the cap is rejected without requeue
/// (dead-lettered when the queue has a DLX).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    pub max_deliveries: Option<u32>,
}

impl RedeliveryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn capped(max_deliveries: u32) -> Self {
        Self {
            max_deliveries: Some(max_deliveries),
        }
    }

    pub fn should_requeue(&self, delivery: &InboundDelivery) -> bool {
        match self.max_deliveries {
            None => true,
            Some(max) => {
                let attempts = delivery.delivery_count.unwrap_or(0).saturating_add(1);
                attempts < max
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Unacknowledged deliveries the broker may push to this consumer
    pub prefetch_count: u16,
    pub redelivery: RedeliveryPolicy,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            prefetch_count: 10,
            redelivery: RedeliveryPolicy::unbounded(),
        }
    }
}

/// Consumes one bound queue, feeding each delivery through a tower service
/// and settling it from the service's [`ConsumeResponse`].
///
/// Deliveries are handled one at a time in arrival order.
pub struct AmqpConsumer<S> {
    binding: QueueBinding,
    channel: Option<Channel>,
    deliveries: DeliveryStream,
    redelivery: RedeliveryPolicy,
    service: S,
    state: ConsumerState,
}

impl<S> AmqpConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error> + Send + 'static,
    S::Future: Send + 'static,
{
    /// Declare and bind the queue on `channel`, then start consuming with
    /// manual acknowledgement.
    pub async fn bind(
        channel: Channel,
        binding: QueueBinding,
        consumer_tag: &str,
        options: ConsumerOptions,
        service: S,
    ) -> Result<Self> {
        debug!(
            queue = %binding.queue,
            exchange = %binding.exchange,
            routing_key = %binding.routing_key,
            "binding amqp consumer"
        );
        let state = ConsumerState::Unbound;

        binding
            .declare(&channel)
            .await
            .with_context(|| format!("failed to bind queue {}", binding.queue))?;
        let state = transition(&binding.queue, state, ConsumerState::Bound);

        channel
            .basic_qos(options.prefetch_count, BasicQosOptions::default())
            .await
            .context("failed to set prefetch count")?;

        let consumer = channel
            .basic_consume(
                &binding.queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("failed to start consuming from {}", binding.queue))?;

        let deliveries = consumer
            .map(|delivery| delivery.map(InboundDelivery::from).map_err(anyhow::Error::from))
            .boxed();
        let state = transition(&binding.queue, state, ConsumerState::Consuming);

        info!(
            queue = %binding.queue,
            routing_key = %binding.routing_key,
            consumer_tag = %consumer_tag,
            prefetch = options.prefetch_count,
            "consumer started"
        );

        Ok(Self {
            binding,
            channel: Some(channel),
            deliveries,
            redelivery: options.redelivery,
            service,
            state,
        })
    }

    /// Consumer over an arbitrary delivery stream with no broker channel
    pub fn from_deliveries(
        binding: QueueBinding,
        deliveries: DeliveryStream,
        options: ConsumerOptions,
        service: S,
    ) -> Self {
        Self {
            binding,
            channel: None,
            deliveries,
            redelivery: options.redelivery,
            service,
            state: ConsumerState::Consuming,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn binding(&self) -> &QueueBinding {
        &self.binding
    }

    /// Process deliveries until `ctx` is cancelled.
    ///
    /// Returns an error if the delivery stream ends first, which means the
    /// broker connection or channel is gone.
    pub async fn run(&mut self, ctx: CancellationToken) -> Result<()> {
        debug!(queue = %self.binding.queue, "starting amqp consumer loop");

        let outcome = loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    info!(
                        queue = %self.binding.queue,
                        "received shutdown signal, stopping consumer"
                    );
                    break Ok(());
                }
                next = self.deliveries.next() => match next {
                    Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                    Some(Err(e)) => {
                        error!(
                            queue = %self.binding.queue,
                            error = %e,
                            "error receiving delivery"
                        );
                    }
                    None => {
                        break Err(anyhow!(
                            "delivery stream for queue {} ended unexpectedly",
                            self.binding.queue
                        ));
                    }
                }
            }
        };

        self.shutdown().await;
        outcome
    }

    async fn handle_delivery(&mut self, delivery: InboundDelivery) {
        let request = delivery.to_request();

        let response = match self.service.ready().await {
            Ok(service) => service.call(request).await,
            Err(e) => Err(e),
        };

        let response = response.unwrap_or_else(|e| {
            error!(
                routing_key = %delivery.routing_key,
                error = %e,
                "service error processing delivery"
            );
            ConsumeResponse::nak(e.to_string())
        });

        match response {
            ConsumeResponse::Ack => {
                if let Err(e) = delivery.acker().ack().await {
                    error!(
                        routing_key = %delivery.routing_key,
                        error = %e,
                        "failed to acknowledge delivery"
                    );
                }
            }
            ConsumeResponse::Nak(reason) => {
                let reason = reason.unwrap_or_default();
                let requeue = self.redelivery.should_requeue(&delivery);

                if requeue {
                    warn!(
                        routing_key = %delivery.routing_key,
                        redelivered = delivery.redelivered,
                        reason = %reason,
                        "rejecting delivery for redelivery"
                    );
                } else {
                    error!(
                        routing_key = %delivery.routing_key,
                        delivery_count = ?delivery.delivery_count,
                        reason = %reason,
                        "delivery reached redelivery limit, rejecting without requeue"
                    );
                }

                if let Err(e) = delivery.acker().nack(requeue).await {
                    error!(
                        routing_key = %delivery.routing_key,
                        error = %e,
                        "failed to reject delivery"
                    );
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(channel) = self.channel.take() {
            if channel.status().connected() {
                if let Err(e) = channel.close(REPLY_SUCCESS, "consumer shutdown").await {
                    warn!(queue = %self.binding.queue, error = %e, "failed to close consumer channel");
                }
            }
        }

        self.state = transition(&self.binding.queue, self.state, ConsumerState::Closed);
    }
}

fn transition(queue: &str, from: ConsumerState, to: ConsumerState) -> ConsumerState {
    debug!(queue = %queue, from = ?from, to = ?to, "consumer state changed");
    to
}
