// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! Runs the handler for one delivery: opens the consumer span, builds the
//! deadline-bound context and reports the outcome. Deliveries are already
//! acknowledged when they reach this point, so nothing here talks to the broker.

use crate::{
    handler::{ConsumerHandler, HandlerContext},
    message::DeliveryEnvelope,
    otel,
};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::{borrow::Cow, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Invokes `handler` for one delivery.
///
/// # Parameters
/// * `tracer` - OpenTelemetry tracer for creating spans
/// * `handler` - Handler of the subscription
/// * `msg` - The received delivery, moved into the handler
/// * `received_at` - Instant the delivery came out of the stream
/// * `timeout` - Time the handler has, counted from `received_at`
/// * `consumer_tag` - Tag of the subscription, for logging
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    handler: &dyn ConsumerHandler,
    msg: DeliveryEnvelope,
    received_at: Instant,
    timeout: Duration,
    consumer_tag: &str,
) {
    let metadata = msg.metadata();
    let (otel_ctx, mut span) = otel::new_span(&metadata.properties, tracer, &metadata.routing_key);

    debug!(
        consumer_tag,
        delivery_tag = metadata.delivery_tag,
        "received: {} - exchange: {}",
        metadata.routing_key,
        metadata.exchange,
    );

    let delivery_tag = metadata.delivery_tag;
    let ctx = HandlerContext::new(received_at + timeout, otel_ctx);
    let deadline = ctx.deadline();

    match handler.exec(ctx, msg).await {
        Ok(()) => {
            debug!(consumer_tag, delivery_tag, "message successfully processed");
            span.set_status(Status::Ok);
        }
        Err(err) => {
            error!(
                error = err.to_string(),
                consumer_tag, delivery_tag, "error whiling handling msg"
            );
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from(err.to_string()),
            });
        }
    }

    if Instant::now() > deadline {
        warn!(
            consumer_tag,
            delivery_tag, "handler finished after its context deadline"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::AmqpError, message::DeliveryMetadata};
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn should_bind_deadline_to_receipt() {
        let seen = Arc::new(Mutex::new(None));
        let handler = {
            let seen = seen.clone();
            move |ctx: HandlerContext, _msg: DeliveryEnvelope| {
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = Some(ctx.deadline());
                    Ok::<(), AmqpError>(())
                }
            }
        };

        let received_at = Instant::now();
        tokio::time::advance(Duration::from_secs(3)).await;

        consume(
            &opentelemetry::global::tracer("test"),
            &handler,
            DeliveryEnvelope::new(DeliveryMetadata::default(), b"m1".to_vec()),
            received_at,
            Duration::from_secs(10),
            "svc-a",
        )
        .await;

        assert_eq!(
            *seen.lock().unwrap(),
            Some(received_at + Duration::from_secs(10))
        );
    }

    #[tokio::test]
    async fn should_swallow_handler_errors() {
        let handler = |_ctx: HandlerContext, _msg: DeliveryEnvelope| async {
            Err::<(), AmqpError>(AmqpError::HandlerError("boom".to_owned()))
        };

        consume(
            &opentelemetry::global::tracer("test"),
            &handler,
            DeliveryEnvelope::default(),
            Instant::now(),
            Duration::from_secs(10),
            "svc-a",
        )
        .await;
    }
}
