// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Client
//!
//! Owns the connection to the RabbitMQ server. The connection is created
//! explicitly by the caller and shared by every subscription made through it,
//! each of them on its own channel.

use crate::{
    channel::SubscriptionChannel,
    configs::RabbitMQConfigs,
    dispatcher::{self, Subscription},
    errors::AmqpError,
    handler::ConsumerHandler,
    topology::ConsumerDefinition,
};
use async_trait::async_trait;
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error, warn};

#[cfg(test)]
use crate::channel::MockSubscriptionChannel;

/// Reply code sent to the broker on a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Capabilities of a broker connection.
///
/// Consumers of this crate should depend on `Arc<dyn Broker>` so a test double can
/// stand in for the RabbitMQ client.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Closes the connection and every channel created from it. Closing an
    /// already closed connection does nothing.
    async fn close(&self);

    /// Reports the last known connection state without a network round trip.
    fn ping(&self) -> Result<(), AmqpError>;

    /// Declares the topology of `def` on a new channel and starts consuming it.
    async fn subscribe(
        &self,
        def: &ConsumerDefinition,
        handler: Arc<dyn ConsumerHandler>,
    ) -> Result<Subscription, AmqpError>;
}

/// Transport under [`RabbitMQClient`].
#[cfg_attr(test, mockall::automock(type Channel = MockSubscriptionChannel;))]
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    type Channel: SubscriptionChannel + 'static;

    /// False once the peer or a network fault closed the connection.
    fn is_connected(&self) -> bool;

    /// Runs the close handshake.
    async fn shutdown(&self) -> Result<(), AmqpError>;

    async fn open_channel(&self) -> Result<Self::Channel, AmqpError>;
}

#[async_trait]
impl AmqpConnection for Connection {
    type Channel = Channel;

    fn is_connected(&self) -> bool {
        self.status().connected()
    }

    async fn shutdown(&self) -> Result<(), AmqpError> {
        match self.close(REPLY_SUCCESS, "closing").await {
            Err(err) => Err(AmqpError::ConnectionError(err.to_string())),
            _ => {
                debug!("amqp connection closed");
                Ok(())
            }
        }
    }

    async fn open_channel(&self) -> Result<Channel, AmqpError> {
        debug!("creating amqp channel...");
        match self.create_channel().await {
            Ok(c) => {
                debug!("channel created");
                Ok(c)
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }
    }
}

/// Broker connection, backed by lapin unless a test transport is given.
pub struct RabbitMQClient<C = Connection> {
    conn: C,
    closed: AtomicBool,
}

impl RabbitMQClient<Connection> {
    /// Connects to the broker at `uri`.
    ///
    /// `client_name` is reported to the broker as the connection name.
    ///
    /// # Returns
    /// The client, or `ConnectionError` when the uri is malformed, the broker is
    /// unreachable or the credentials are refused.
    pub async fn open(uri: &str, client_name: &str) -> Result<RabbitMQClient, AmqpError> {
        debug!("creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(client_name.to_owned()));

        let conn = match Connection::connect(uri, options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError(err.to_string()))
            }
        }?;
        debug!("amqp connected");

        Ok(RabbitMQClient::new(conn))
    }

    /// Connects using the uri and connection name of `cfg`.
    pub async fn from_configs(cfg: &RabbitMQConfigs) -> Result<RabbitMQClient, AmqpError> {
        Self::open(&cfg.uri()?, &cfg.connection_name).await
    }
}

impl<C> RabbitMQClient<C> {
    /// Wraps an already established connection.
    pub fn new(conn: C) -> Self {
        RabbitMQClient {
            conn,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<C> Broker for RabbitMQClient<C>
where
    C: AmqpConnection,
{
    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("amqp connection already closed");
            return;
        }

        if !self.conn.is_connected() {
            debug!("amqp connection was closed by the peer");
            return;
        }

        if let Err(err) = self.conn.shutdown().await {
            warn!(error = err.to_string(), "failure to close the connection");
        }
    }

    fn ping(&self) -> Result<(), AmqpError> {
        if self.closed.load(Ordering::SeqCst) || !self.conn.is_connected() {
            return Err(AmqpError::ClosedError);
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        def: &ConsumerDefinition,
        handler: Arc<dyn ConsumerHandler>,
    ) -> Result<Subscription, AmqpError> {
        if self.ping().is_err() {
            error!("failure to create a channel on a closed connection");
            return Err(AmqpError::ChannelError);
        }

        let channel = self.conn.open_channel().await?;

        dispatcher::subscribe(channel, def, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatcher::SubscriptionState, handler::HandlerContext, message::DeliveryEnvelope,
    };
    use futures_util::{stream, StreamExt};

    fn noop() -> Arc<dyn ConsumerHandler> {
        Arc::new(|_ctx: HandlerContext, _msg: DeliveryEnvelope| async {
            Ok::<(), AmqpError>(())
        })
    }

    fn orders() -> ConsumerDefinition {
        ConsumerDefinition::new("orders", "orders.created").consumer_tag("svc-a")
    }

    #[tokio::test]
    async fn should_ping_open_connection() {
        let mut conn = MockAmqpConnection::new();
        conn.expect_is_connected().return_const(true);

        let client = RabbitMQClient::new(conn);

        assert_eq!(client.ping(), Ok(()));
    }

    #[tokio::test]
    async fn should_close_once() {
        let mut conn = MockAmqpConnection::new();
        conn.expect_is_connected().return_const(true);
        conn.expect_shutdown().times(1).returning(|| Ok(()));

        let client = RabbitMQClient::new(conn);
        client.close().await;
        client.close().await;

        assert_eq!(client.ping(), Err(AmqpError::ClosedError));
    }

    #[tokio::test]
    async fn should_skip_handshake_when_peer_closed() {
        let mut conn = MockAmqpConnection::new();
        conn.expect_is_connected().return_const(false);
        conn.expect_shutdown().never();

        let client = RabbitMQClient::new(conn);
        assert_eq!(client.ping(), Err(AmqpError::ClosedError));

        client.close().await;
        assert_eq!(client.ping(), Err(AmqpError::ClosedError));
    }

    #[tokio::test]
    async fn should_swallow_shutdown_errors() {
        let mut conn = MockAmqpConnection::new();
        conn.expect_is_connected().return_const(true);
        conn.expect_shutdown()
            .times(1)
            .returning(|| Err(AmqpError::ConnectionError("broken pipe".to_owned())));

        let client = RabbitMQClient::new(conn);
        client.close().await;

        assert_eq!(client.ping(), Err(AmqpError::ClosedError));
    }

    #[tokio::test]
    async fn should_not_open_channel_after_close() {
        let mut conn = MockAmqpConnection::new();
        conn.expect_is_connected().return_const(true);
        conn.expect_shutdown().returning(|| Ok(()));
        conn.expect_open_channel().never();

        let client = RabbitMQClient::new(conn);
        client.close().await;

        let err = client.subscribe(&orders(), noop()).await.unwrap_err();
        assert_eq!(err, AmqpError::ChannelError);
    }

    #[tokio::test]
    async fn should_surface_channel_failures() {
        let mut conn = MockAmqpConnection::new();
        conn.expect_is_connected().return_const(true);
        conn.expect_open_channel()
            .times(1)
            .returning(|| Err(AmqpError::ChannelError));

        let client = RabbitMQClient::new(conn);

        let err = client.subscribe(&orders(), noop()).await.unwrap_err();
        assert_eq!(err, AmqpError::ChannelError);
    }

    #[tokio::test]
    async fn should_reject_invalid_topology_before_declaring() {
        let mut conn = MockAmqpConnection::new();
        conn.expect_is_connected().return_const(true);
        conn.expect_open_channel()
            .times(1)
            .returning(|| Ok(MockSubscriptionChannel::new()));

        let client = RabbitMQClient::new(conn);
        let def = ConsumerDefinition::new("", "orders.created");

        let err = client.subscribe(&def, noop()).await.unwrap_err();
        assert!(matches!(err, AmqpError::InvalidTopology(_)));
    }

    #[tokio::test]
    async fn should_subscribe_on_a_new_channel() {
        let mut channel = MockSubscriptionChannel::new();
        channel.expect_declare_exchange().returning(|_| Ok(()));
        channel.expect_declare_queue().returning(|_| Ok(()));
        channel.expect_bind_queue().returning(|_| Ok(()));
        channel
            .expect_consume()
            .return_once(|_, _| Ok(stream::pending().boxed()));

        let mut conn = MockAmqpConnection::new();
        conn.expect_is_connected().return_const(true);
        conn.expect_open_channel()
            .times(1)
            .return_once(move || Ok(channel));

        let client = RabbitMQClient::new(conn);
        let subscription = client.subscribe(&orders(), noop()).await.unwrap();

        assert_eq!(subscription.consumer_tag(), "svc-a");
        assert_eq!(subscription.state(), SubscriptionState::Consuming);
    }
}
