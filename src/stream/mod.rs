//! Streaming subsystem: bus subscriptions delivered as server-sent events.
//!
//! # Data Flow
//! ```text
//! GET /sub/{subject}
//!     → session::open (subscribe, spawn consumer)
//!     → consumer task: Subscription → bounded channel
//!     → flush side: channel → event::render → SSE body
//! ```
//!
//! # Design Decisions
//! - The consumer and the flush side share only the channel and a token
//! - Bus errors are reported in-band on `gateway.system`
//! - Client disconnect and server shutdown both end the session by cancellation

pub mod event;
pub mod session;

pub use session::{SessionOptions, SessionState, SYSTEM_SUBJECT};
