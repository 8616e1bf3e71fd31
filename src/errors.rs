// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Subscriber
//!
//! The `AmqpError` enum covers every failure the subscriber can report: connection
//! setup, topology declaration, consumer registration, handler failures and the
//! closed-connection condition reported by `ping`.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Setup errors (connection, configuration and every subscribe-time variant) are
/// returned to the caller. Handler errors are returned by user handlers and are
/// only logged by the consumption loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error loading the connection configuration
    #[error("failure to load configs: {0}")]
    ConfigError(String),

    /// The connection was closed by the peer, a network fault or `close`
    #[error("connection is closed")]
    ClosedError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// The consumer definition is missing a required name
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// The exchange kind is not one of direct, topic or fanout
    #[error("unsupported exchange kind `{0}`")]
    UnsupportedExchangeKind(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error received from the delivery stream
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// Error reported by a message handler
    #[error("handler failure: {0}")]
    HandlerError(String),

    /// The handler context deadline elapsed
    #[error("handler deadline exceeded")]
    HandlerTimeout,
}

impl AmqpError {
    /// Returns true for the errors a `subscribe` call can fail with.
    pub fn is_subscribe_error(&self) -> bool {
        matches!(
            self,
            AmqpError::ChannelError
                | AmqpError::InvalidTopology(_)
                | AmqpError::UnsupportedExchangeKind(_)
                | AmqpError::DeclareExchangeError(_)
                | AmqpError::DeclareQueueError(_)
                | AmqpError::BindingExchangeToQueueError(_, _)
                | AmqpError::BindingConsumerError(_)
        )
    }
}

impl From<config::ConfigError> for AmqpError {
    fn from(err: config::ConfigError) -> Self {
        AmqpError::ConfigError(err.to_string())
    }
}
