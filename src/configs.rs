// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Configuration
//!
//! Connection settings for the RabbitMQ server. Values are read from an optional
//! `config/rabbitmq` file and from `RABBITMQ_*` environment variables, falling back
//! to the defaults of a local broker.

use crate::errors::AmqpError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;
use url::Url;

/// Default file (without extension) looked up by [`RabbitMQConfigs::load`].
pub const DEFAULT_CONFIG_FILE: &str = "config/rabbitmq";
/// Prefix of the environment variables read by [`RabbitMQConfigs::load`].
pub const ENV_PREFIX: &str = "RABBITMQ";

/// Settings used to reach the RabbitMQ server.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RabbitMQConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    /// Reported to the broker as the `connection_name` client property.
    pub connection_name: String,
}

impl Default for RabbitMQConfigs {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
            connection_name: env!("CARGO_PKG_NAME").to_owned(),
        }
    }
}

impl fmt::Debug for RabbitMQConfigs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitMQConfigs")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("vhost", &self.vhost)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

impl RabbitMQConfigs {
    /// Loads the configs from [`DEFAULT_CONFIG_FILE`] and the environment.
    pub fn load() -> Result<Self, AmqpError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads the configs from the given file (optional) and the environment.
    ///
    /// Environment variables take precedence over the file, e.g. `RABBITMQ_HOST`
    /// overrides `host`. Missing keys keep their default value.
    pub fn load_from(file: &str) -> Result<Self, AmqpError> {
        let cfg = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    /// Builds the AMQP endpoint URI.
    ///
    /// User, password and vhost are percent-encoded, so the default `/` vhost is
    /// written as `%2F` and credentials may hold `@`, `:`, `/` or `#`.
    pub fn uri(&self) -> Result<String, AmqpError> {
        let mut uri = Url::parse(&format!("amqp://{}:{}", self.host, self.port)).map_err(|err| {
            AmqpError::ConfigError(format!("invalid host `{}`: {}", self.host, err))
        })?;

        uri.set_username(&self.user)
            .map_err(|_| AmqpError::ConfigError("invalid user".to_owned()))?;
        uri.set_password(Some(&self.password))
            .map_err(|_| AmqpError::ConfigError("invalid password".to_owned()))?;
        uri.path_segments_mut()
            .map_err(|_| AmqpError::ConfigError("invalid vhost".to_owned()))?
            .push(&self.vhost);

        Ok(uri.to_string())
    }
}
