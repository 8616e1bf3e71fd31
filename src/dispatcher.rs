// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Subscription Dispatcher
//!
//! Sets up a subscription on its own channel and drives its consumption loop.
//!
//! A subscription goes through `Declaring -> Bound -> Consuming -> Terminated`.
//! Setup failures jump straight to `Terminated` and are returned to the caller;
//! once consuming, the loop only ends when the delivery stream closes, which
//! happens when the channel or the connection is closed.

use crate::{
    channel::{DeliveryStream, SubscriptionChannel},
    consumer::consume,
    errors::AmqpError,
    handler::ConsumerHandler,
    topology::{AmqpTopology, ConsumerDefinition},
};
use futures_util::StreamExt;
use opentelemetry::global;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time::Instant};
use tracing::{debug, error, info};

/// How handler invocations of one subscription are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// The next delivery is pulled once the previous handler returned. Invocations
    /// never overlap and complete in the order the deliveries were received.
    ///
    /// The context deadline counts from when the loop pulls the delivery, which
    /// may have waited in the consumer buffer while the previous handler ran.
    #[default]
    Sequential,
    /// Every delivery is handed to its own task and the loop moves on at once.
    /// Invocations start in the order received and may complete in any order.
    Concurrent,
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Declaring,
    Bound,
    Consuming,
    Terminated,
}

/// Handle of a running subscription.
///
/// Dropping the handle does not stop the consumption, only closing the
/// connection does.
#[derive(Debug)]
pub struct Subscription {
    consumer_tag: String,
    state: watch::Receiver<SubscriptionState>,
}

impl Subscription {
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Waits until the delivery stream closed and the loop stopped.
    pub async fn terminated(&mut self) {
        let _ = self
            .state
            .wait_for(|state| *state == SubscriptionState::Terminated)
            .await;
    }
}

struct LoopOptions {
    consumer_tag: String,
    timeout: Duration,
    mode: DispatchMode,
}

/// Subscribes `handler` to the queue described by `def` using `channel`.
///
/// Validates the definition, declares the exchange and the queue, binds them,
/// registers the consumer and spawns the consumption loop. The loop task takes
/// ownership of the channel. Returns as soon as the loop is spawned.
pub async fn subscribe<C>(
    channel: C,
    def: &ConsumerDefinition,
    handler: Arc<dyn ConsumerHandler>,
) -> Result<Subscription, AmqpError>
where
    C: SubscriptionChannel + 'static,
{
    let (state_tx, state_rx) = watch::channel(SubscriptionState::Declaring);

    let (consumer_tag, deliveries) = match setup(&channel, def, &state_tx).await {
        Ok(res) => res,
        Err(err) => {
            error!(
                error = err.to_string(),
                exchange = def.exchange_name(),
                queue = def.queue_name(),
                "failure to subscribe"
            );
            state_tx.send_replace(SubscriptionState::Terminated);
            return Err(err);
        }
    };

    info!(
        exchange = def.exchange_name(),
        queue_name = def.queue_name(),
        routing_key = def.key(),
        consumer_name = consumer_tag.as_str(),
        "consumer registered"
    );

    let opts = LoopOptions {
        consumer_tag: consumer_tag.clone(),
        timeout: def.timeout(),
        mode: def.dispatch_mode(),
    };

    state_tx.send_replace(SubscriptionState::Consuming);

    tokio::spawn(async move {
        let _channel = channel;
        let tag = opts.consumer_tag.clone();

        consume_loop(deliveries, handler, opts).await;

        state_tx.send_replace(SubscriptionState::Terminated);
        debug!(consumer_tag = tag.as_str(), "delivery stream closed");
    });

    Ok(Subscription {
        consumer_tag,
        state: state_rx,
    })
}

async fn setup<C>(
    channel: &C,
    def: &ConsumerDefinition,
    state: &watch::Sender<SubscriptionState>,
) -> Result<(String, DeliveryStream), AmqpError>
where
    C: SubscriptionChannel,
{
    // the only topology check, shared by `Broker::subscribe` and direct callers
    def.validate()?;

    AmqpTopology::from(def).install(channel).await?;
    state.send_replace(SubscriptionState::Bound);

    let consumer_tag = def.resolve_consumer_tag();
    let deliveries = channel.consume(def.queue_name(), &consumer_tag).await?;

    Ok((consumer_tag, deliveries))
}

async fn consume_loop(
    mut deliveries: DeliveryStream,
    handler: Arc<dyn ConsumerHandler>,
    opts: LoopOptions,
) {
    while let Some(result) = deliveries.next().await {
        match result {
            Ok(msg) => {
                let received_at = Instant::now();
                let handler = handler.clone();
                let tag = opts.consumer_tag.clone();
                let timeout = opts.timeout;

                let invocation = tokio::spawn(async move {
                    consume(
                        &global::tracer("amqp consumer"),
                        handler.as_ref(),
                        msg,
                        received_at,
                        timeout,
                        &tag,
                    )
                    .await
                });

                if opts.mode == DispatchMode::Sequential {
                    if let Err(err) = invocation.await {
                        error!(
                            error = err.to_string(),
                            consumer_tag = opts.consumer_tag.as_str(),
                            "handler task failure"
                        );
                    }
                }
            }

            Err(err) => error!(error = err.to_string(), "errors consume msg"),
        }
    }
}
