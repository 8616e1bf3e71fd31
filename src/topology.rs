// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module describes what a consumer needs on the broker side and declares it.
//!
//! The main components are:
//! - `ConsumerDefinition`: the immutable description of a consumer (exchange, queue,
//!   binding key, consumer tag) together with how its handler is invoked
//! - `AmqpTopology`: the exchange, queue and binding derived from a definition, and
//!   the ordered declaration of them on a channel

use crate::{
    channel::SubscriptionChannel,
    dispatcher::DispatchMode,
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    queue::{QueueBinding, QueueDefinition},
};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Time a handler invocation has before its context is cancelled, measured from
/// the moment the delivery was received.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

fn default_handler_timeout() -> Duration {
    DEFAULT_HANDLER_TIMEOUT
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Everything needed to declare and consume a queue.
///
/// Can be built in code:
///
/// ```
/// use rabbitmq_subscriber::{exchange::ExchangeKind, topology::ConsumerDefinition};
///
/// let def = ConsumerDefinition::new("orders", "orders.created")
///     .kind(ExchangeKind::Topic)
///     .binding_key("order.created")
///     .consumer_tag("svc-a");
/// assert!(def.validate().is_ok());
/// ```
///
/// or deserialized from configuration, where the exchange kind is read from the
/// `exchange_type` key and the handler timeout from `handler_timeout_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsumerDefinition {
    pub(crate) exchange_name: String,
    #[serde(rename = "exchange_type", default)]
    pub(crate) exchange_kind: ExchangeKind,
    pub(crate) queue_name: String,
    #[serde(default)]
    pub(crate) binding_key: String,
    #[serde(default)]
    pub(crate) consumer_tag: String,
    #[serde(
        rename = "handler_timeout_secs",
        default = "default_handler_timeout",
        deserialize_with = "deserialize_secs"
    )]
    pub(crate) handler_timeout: Duration,
    #[serde(default)]
    pub(crate) dispatch: DispatchMode,
}

impl ConsumerDefinition {
    /// Creates a definition consuming `queue` bound to a direct `exchange`.
    pub fn new(exchange: &str, queue: &str) -> ConsumerDefinition {
        ConsumerDefinition {
            exchange_name: exchange.to_owned(),
            exchange_kind: ExchangeKind::Direct,
            queue_name: queue.to_owned(),
            binding_key: String::new(),
            consumer_tag: String::new(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            dispatch: DispatchMode::default(),
        }
    }

    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.exchange_kind = kind;
        self
    }

    pub fn binding_key(mut self, key: &str) -> Self {
        self.binding_key = key.to_owned();
        self
    }

    /// Sets the consumer tag. When left empty a tag is generated at subscribe time.
    pub fn consumer_tag(mut self, tag: &str) -> Self {
        self.consumer_tag = tag.to_owned();
        self
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn exchange_kind(&self) -> &ExchangeKind {
        &self.exchange_kind
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn key(&self) -> &str {
        &self.binding_key
    }

    pub fn tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn timeout(&self) -> Duration {
        self.handler_timeout
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch
    }

    /// Checks the invariants a broker declaration relies on.
    ///
    /// # Returns
    /// * `InvalidTopology` when the exchange or queue name is empty
    /// * `UnsupportedExchangeKind` when the kind is not direct, topic or fanout
    pub fn validate(&self) -> Result<(), AmqpError> {
        if self.exchange_name.trim().is_empty() {
            return Err(AmqpError::InvalidTopology(
                "exchange name must not be empty".to_owned(),
            ));
        }

        if self.queue_name.trim().is_empty() {
            return Err(AmqpError::InvalidTopology(
                "queue name must not be empty".to_owned(),
            ));
        }

        if let ExchangeKind::Unsupported(kind) = &self.exchange_kind {
            return Err(AmqpError::UnsupportedExchangeKind(kind.clone()));
        }

        Ok(())
    }

    /// Returns the configured consumer tag, or `<queue>-<uuid>` when none was set.
    pub(crate) fn resolve_consumer_tag(&self) -> String {
        if self.consumer_tag.is_empty() {
            format!("{}-{}", self.queue_name, Uuid::new_v4())
        } else {
            self.consumer_tag.clone()
        }
    }
}

/// The exchange, queue and binding declared for one consumer.
///
/// The exchange and the queue are durable and never auto-deleted, so redeclaring
/// the same topology is a no-op on the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmqpTopology {
    pub(crate) exchange: ExchangeDefinition,
    pub(crate) queue: QueueDefinition,
    pub(crate) binding: QueueBinding,
}

impl From<&ConsumerDefinition> for AmqpTopology {
    fn from(def: &ConsumerDefinition) -> Self {
        AmqpTopology {
            exchange: ExchangeDefinition::new(&def.exchange_name)
                .kind(def.exchange_kind.clone())
                .durable(),
            queue: QueueDefinition::new(&def.queue_name).durable(),
            binding: QueueBinding::new(&def.queue_name)
                .exchange(&def.exchange_name)
                .routing_key(&def.binding_key),
        }
    }
}

impl AmqpTopology {
    /// Installs the topology using the given channel.
    ///
    /// This method performs the following operations in order, stopping at the
    /// first failure:
    /// 1. Declares the exchange
    /// 2. Declares the queue
    /// 3. Binds the queue to the exchange
    pub async fn install<C>(&self, channel: &C) -> Result<(), AmqpError>
    where
        C: SubscriptionChannel + ?Sized,
    {
        debug!("creating exchange: {}", self.exchange.name);
        channel.declare_exchange(&self.exchange).await?;
        debug!("exchange: {} was created", self.exchange.name);

        debug!("creating queue: {}", self.queue.name);
        channel.declare_queue(&self.queue).await?;
        debug!("queue: {} was created", self.queue.name);

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            self.binding.queue_name, self.binding.exchange_name, self.binding.routing_key
        );
        channel.bind_queue(&self.binding).await?;
        debug!("queue was bounded");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockSubscriptionChannel;
    use mockall::Sequence;

    fn orders() -> ConsumerDefinition {
        ConsumerDefinition::new("orders", "orders.created")
            .kind(ExchangeKind::Topic)
            .binding_key("order.created")
            .consumer_tag("svc-a")
    }

    #[test]
    fn should_accept_valid_definition() {
        assert_eq!(orders().validate(), Ok(()));
    }

    #[test]
    fn should_reject_empty_names() {
        let def = ConsumerDefinition::new("", "orders.created");
        assert!(matches!(def.validate(), Err(AmqpError::InvalidTopology(_))));

        let def = ConsumerDefinition::new("orders", " ");
        assert!(matches!(def.validate(), Err(AmqpError::InvalidTopology(_))));
    }

    #[test]
    fn should_reject_unsupported_kind() {
        let def = orders().kind(ExchangeKind::from("headers"));
        assert_eq!(
            def.validate(),
            Err(AmqpError::UnsupportedExchangeKind("headers".to_owned()))
        );
    }

    #[test]
    fn should_generate_tag_when_empty() {
        assert_eq!(orders().resolve_consumer_tag(), "svc-a");

        let def = ConsumerDefinition::new("orders", "orders.created");
        let first = def.resolve_consumer_tag();
        let second = def.resolve_consumer_tag();
        assert!(first.starts_with("orders.created-"));
        assert_ne!(first, second);
    }

    #[test]
    fn should_deserialize_from_config_values() {
        let def: ConsumerDefinition = serde_json::from_value(serde_json::json!({
            "exchange_name": "orders",
            "exchange_type": "topic",
            "queue_name": "orders.created",
            "binding_key": "order.created",
            "handler_timeout_secs": 3,
            "dispatch": "concurrent"
        }))
        .unwrap();

        assert_eq!(def.exchange_kind(), &ExchangeKind::Topic);
        assert_eq!(def.timeout(), Duration::from_secs(3));
        assert_eq!(def.dispatch_mode(), DispatchMode::Concurrent);
        assert_eq!(def.tag(), "");

        let def: ConsumerDefinition = serde_json::from_value(serde_json::json!({
            "exchange_name": "orders",
            "queue_name": "orders.created"
        }))
        .unwrap();
        assert_eq!(def.timeout(), DEFAULT_HANDLER_TIMEOUT);
        assert_eq!(def.dispatch_mode(), DispatchMode::Sequential);
    }

    #[test]
    fn should_derive_durable_topology() {
        let topology = AmqpTopology::from(&orders());

        assert_eq!(topology.exchange.name(), "orders");
        assert_eq!(topology.exchange.exchange_kind(), &ExchangeKind::Topic);
        assert!(topology.exchange.is_durable());
        assert!(!topology.exchange.is_auto_delete());
        assert!(!topology.exchange.is_internal());

        assert_eq!(topology.queue.name(), "orders.created");
        assert!(topology.queue.is_durable());
        assert!(!topology.queue.is_exclusive());
        assert!(!topology.queue.is_auto_delete());

        assert_eq!(topology.binding.queue_name(), "orders.created");
        assert_eq!(topology.binding.exchange_name(), "orders");
        assert_eq!(topology.binding.key(), "order.created");
    }

    #[tokio::test]
    async fn should_install_in_order() {
        let mut seq = Sequence::new();
        let mut channel = MockSubscriptionChannel::new();

        channel
            .expect_declare_exchange()
            .withf(|def| def.name() == "orders")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        channel
            .expect_declare_queue()
            .withf(|def| def.name() == "orders.created")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        channel
            .expect_bind_queue()
            .withf(|binding| binding.key() == "order.created")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let topology = AmqpTopology::from(&orders());
        assert_eq!(topology.install(&channel).await, Ok(()));
    }

    #[tokio::test]
    async fn should_stop_at_first_failure() {
        let mut channel = MockSubscriptionChannel::new();

        channel
            .expect_declare_exchange()
            .returning(|def| Err(AmqpError::DeclareExchangeError(def.name().to_owned())));
        channel.expect_declare_queue().never();
        channel.expect_bind_queue().never();

        let topology = AmqpTopology::from(&orders());
        assert_eq!(
            topology.install(&channel).await,
            Err(AmqpError::DeclareExchangeError("orders".to_owned()))
        );
    }
}
