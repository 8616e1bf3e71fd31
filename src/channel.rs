// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Operations
//!
//! The broker operations a subscription performs on its own channel: declaring
//! the exchange and the queue, binding them and opening the delivery stream.
//! They sit behind the `SubscriptionChannel` trait so the subscription engine can
//! run against a test double instead of a live broker.

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::DeliveryEnvelope,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use lapin::{
    options::{BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel,
};
use tracing::{debug, error};

/// Stream of deliveries of one consumer. It ends when the channel or the
/// connection is closed.
pub type DeliveryStream = BoxStream<'static, Result<DeliveryEnvelope, AmqpError>>;

/// Per-subscription broker operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionChannel: Send + Sync {
    /// Declares the exchange. Redeclaring identical parameters succeeds.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Declares the queue. Redeclaring identical parameters succeeds.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Registers a consumer with automatic acknowledgement and returns its deliveries.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError>;
}

#[async_trait]
impl SubscriptionChannel for Channel {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        let kind = lapin::ExchangeKind::try_from(&def.kind)?;

        match self
            .exchange_declare(
                &def.name,
                kind,
                ExchangeDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    auto_delete: def.delete,
                    internal: def.internal,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    kind = def.kind.to_string(),
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        match self
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.delete,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        match self
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        let consumer = match self
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: true,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::BindingConsumerError(consumer_tag.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        debug!(queue, consumer_tag, "consumer created");

        Ok(consumer
            .map(|result| {
                result
                    .map(DeliveryEnvelope::from)
                    .map_err(|err| AmqpError::ConsumerError(err.to_string()))
            })
            .boxed())
    }
}
