// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Handlers
//!
//! The contract between the consumption loop and the business logic. A handler
//! receives a [`HandlerContext`] bound to a deadline and the [`DeliveryEnvelope`]
//! of one message.
//!
//! Messages are acknowledged on receipt, so a failing handler does not get the
//! message back: it is responsible for reporting or parking whatever it could not
//! process.

use crate::{errors::AmqpError, message::DeliveryEnvelope};
use async_trait::async_trait;
use std::{future::Future, time::Duration};
use tokio::time::Instant;

/// Execution context of a single handler invocation.
///
/// The context is cancelled once its deadline passes. Nothing interrupts the
/// handler at that point; long running handlers should check [`is_done`],
/// await [`done`] or wrap their work in [`run`].
///
/// [`is_done`]: HandlerContext::is_done
/// [`done`]: HandlerContext::done
/// [`run`]: HandlerContext::run
#[derive(Debug, Clone)]
pub struct HandlerContext {
    deadline: Instant,
    otel: opentelemetry::Context,
}

impl HandlerContext {
    pub fn new(deadline: Instant, otel: opentelemetry::Context) -> HandlerContext {
        HandlerContext { deadline, otel }
    }

    /// Creates a context cancelled `timeout` after `received_at`.
    pub fn with_timeout(received_at: Instant, timeout: Duration) -> HandlerContext {
        HandlerContext::new(received_at + timeout, opentelemetry::Context::new())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before cancellation, zero once cancelled.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_done(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Resolves when the context is cancelled.
    pub async fn done(&self) {
        tokio::time::sleep_until(self.deadline).await
    }

    /// Runs `fut` until it completes or the context is cancelled.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, AmqpError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.deadline, fut)
            .await
            .map_err(|_| AmqpError::HandlerTimeout)
    }

    /// Trace context propagated through the message headers.
    pub fn otel(&self) -> &opentelemetry::Context {
        &self.otel
    }
}

/// Processes the messages of a subscription.
///
/// Any `Fn(HandlerContext, DeliveryEnvelope) -> impl Future<Output = Result<(), AmqpError>>`
/// is a handler:
///
/// ```
/// use rabbitmq_subscriber::{
///     errors::AmqpError,
///     handler::{ConsumerHandler, HandlerContext},
///     message::DeliveryEnvelope,
/// };
/// use std::sync::Arc;
///
/// let handler: Arc<dyn ConsumerHandler> = Arc::new(
///     |_ctx: HandlerContext, msg: DeliveryEnvelope| async move {
///         msg.body_str()
///             .map(|_| ())
///             .map_err(|err| AmqpError::HandlerError(err.to_string()))
///     },
/// );
/// ```
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, ctx: HandlerContext, msg: DeliveryEnvelope) -> Result<(), AmqpError>;
}

#[async_trait]
impl<F, Fut> ConsumerHandler for F
where
    F: Fn(HandlerContext, DeliveryEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AmqpError>> + Send + 'static,
{
    async fn exec(&self, ctx: HandlerContext, msg: DeliveryEnvelope) -> Result<(), AmqpError> {
        (self)(ctx, msg).await
    }
}
