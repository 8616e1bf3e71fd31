// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Envelope
//!
//! The value handed to a handler for every message received from a queue.

use crate::errors::AmqpError;
use lapin::{message::Delivery, BasicProperties};
use serde::de::DeserializeOwned;
use std::str::Utf8Error;

/// Broker metadata of one delivery.
#[derive(Debug, Clone, Default)]
pub struct DeliveryMetadata {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub properties: BasicProperties,
}

/// A message received by a consumer.
///
/// Each envelope is moved into exactly one handler invocation and exposes its
/// content read-only.
#[derive(Debug, Clone, Default)]
pub struct DeliveryEnvelope {
    metadata: DeliveryMetadata,
    body: Vec<u8>,
}

impl DeliveryEnvelope {
    pub fn new(metadata: DeliveryMetadata, body: Vec<u8>) -> DeliveryEnvelope {
        DeliveryEnvelope { metadata, body }
    }

    pub fn metadata(&self) -> &DeliveryMetadata {
        &self.metadata
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    /// Decodes the body as JSON.
    pub fn json<T>(&self) -> Result<T, AmqpError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|err| AmqpError::HandlerError(err.to_string()))
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

impl From<Delivery> for DeliveryEnvelope {
    fn from(delivery: Delivery) -> Self {
        DeliveryEnvelope {
            metadata: DeliveryMetadata {
                delivery_tag: delivery.delivery_tag,
                exchange: delivery.exchange.to_string(),
                routing_key: delivery.routing_key.to_string(),
                redelivered: delivery.redelivered,
                properties: delivery.properties,
            },
            body: delivery.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct OrderCreated {
        id: u32,
    }

    fn envelope(body: &[u8]) -> DeliveryEnvelope {
        DeliveryEnvelope::new(
            DeliveryMetadata {
                delivery_tag: 7,
                exchange: "orders".to_owned(),
                routing_key: "order.created".to_owned(),
                ..Default::default()
            },
            body.to_vec(),
        )
    }

    #[test]
    fn should_expose_body_and_metadata() {
        let msg = envelope(b"m1");
        assert_eq!(msg.body(), b"m1");
        assert_eq!(msg.body_str(), Ok("m1"));
        assert_eq!(msg.metadata().delivery_tag, 7);
        assert_eq!(msg.metadata().routing_key, "order.created");
        assert_eq!(msg.into_body(), b"m1".to_vec());
    }

    #[test]
    fn should_decode_json_body() {
        let msg = envelope(br#"{"id": 42}"#);
        assert_eq!(msg.json::<OrderCreated>(), Ok(OrderCreated { id: 42 }));

        let msg = envelope(b"not json");
        assert!(matches!(
            msg.json::<OrderCreated>(),
            Err(AmqpError::HandlerError(_))
        ));
    }
}
