// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management for RabbitMQ
//!
//! Exchange kinds accepted by the subscriber and the declaration parameters used
//! when the exchange of a consumer is declared.

use crate::errors::AmqpError;
use serde::Deserialize;
use std::fmt;

/// Represents the types of exchanges a consumer can bind to.
///
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
///
/// Any other name parses into `Unsupported` so the mistake is reported when the
/// consumer is subscribed instead of being silently sent to the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Unsupported(String),
}

impl From<&str> for ExchangeKind {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            _ => ExchangeKind::Unsupported(value.to_owned()),
        }
    }
}

impl From<String> for ExchangeKind {
    fn from(value: String) -> Self {
        ExchangeKind::from(value.as_str())
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Direct => write!(f, "direct"),
            ExchangeKind::Fanout => write!(f, "fanout"),
            ExchangeKind::Topic => write!(f, "topic"),
            ExchangeKind::Unsupported(kind) => write!(f, "{}", kind),
        }
    }
}

impl TryFrom<&ExchangeKind> for lapin::ExchangeKind {
    type Error = AmqpError;

    fn try_from(kind: &ExchangeKind) -> Result<lapin::ExchangeKind, AmqpError> {
        match kind {
            ExchangeKind::Direct => Ok(lapin::ExchangeKind::Direct),
            ExchangeKind::Fanout => Ok(lapin::ExchangeKind::Fanout),
            ExchangeKind::Topic => Ok(lapin::ExchangeKind::Topic),
            ExchangeKind::Unsupported(kind) => {
                Err(AmqpError::UnsupportedExchangeKind(kind.clone()))
            }
        }
    }
}

/// Declaration parameters of a RabbitMQ exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) delete: bool,
    pub(crate) durable: bool,
    pub(crate) internal: bool,
}

impl ExchangeDefinition {
    /// Creates a new, non-durable, direct exchange definition with the given name.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            delete: false,
            durable: false,
            internal: false,
        }
    }

    /// Sets the exchange type.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exchange_kind(&self) -> &ExchangeKind {
        &self.kind
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.delete
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }
}
