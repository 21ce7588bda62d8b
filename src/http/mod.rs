//! HTTP bridge subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → server.rs (request ID, tracing, timeout, body limit, metrics)
//!     → bridge handler (publish.rs, reply.rs, subscribe.rs, kv.rs)
//!     → context.rs (authorization hook, then the bus)
//!     → error.rs maps failures to caller-facing responses
//! ```

pub mod context;
pub mod error;
pub mod kv;
pub mod publish;
pub mod reply;
pub mod server;
pub mod subscribe;

pub use context::BusContext;
pub use error::CallerError;
pub use server::{AppState, BridgePolicy, HttpServer};
