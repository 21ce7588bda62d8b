//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (Authorizer: credential + target → allow/deny)
//!     → headers.rs (which inbound headers may reach the bus)
//!     → Pass to the bridge
//! ```
//!
//! # Design Decisions
//! - The authorizer is injected, never global
//! - Fail closed: a denied check never touches the bus
//! - Hop-by-hop headers never leave the HTTP layer

pub mod auth;
pub mod headers;

pub use auth::{AllowAll, Authorizer, StaticToken};
pub use headers::ForwardPolicy;
