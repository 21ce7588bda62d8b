//! Process lifecycle: startup order and graceful shutdown.
//!
//! ```text
//! main.rs:   config → logging/metrics → bus connection → listener → serve
//! signals.rs: SIGINT / SIGTERM → Shutdown::trigger
//! shutdown:  token cancelled → streaming sessions end → HTTP drain → exit
//! ```
//!
//! Streaming sessions hold child tokens of the shutdown token, so they end
//! before the server waits for open connections.

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
