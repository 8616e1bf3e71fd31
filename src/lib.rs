// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod consumer;
mod otel;

pub mod channel;
pub mod client;
pub mod configs;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod message;
pub mod queue;
pub mod topology;
