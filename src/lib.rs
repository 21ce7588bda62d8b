//! HTTP gateway to a message bus.
//!
//! Publish, request/reply, streaming subscriptions and key/value access,
//! each exposed as an HTTP bridge over a [`bus::MessageBus`].

pub mod bus;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod stream;

pub use config::schema::GatewayConfig;
pub use http::{BusContext, HttpServer};
pub use lifecycle::Shutdown;
