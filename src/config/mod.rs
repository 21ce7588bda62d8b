//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (toml → GatewayConfig)
//!     → validation.rs (addresses, bus URL, non-zero limits, auth token)
//!     → main.rs builds the bus, authorizer and server from it
//!
//! On file change:
//!     watcher.rs reloads and validates
//!     → HttpServer swaps its BridgePolicy
//! ```
//!
//! # Design Decisions
//! - Every field has a default, so an empty file is a valid config
//! - Invalid reloads are logged and dropped; the running config stays
//! - Only bridge timing and header forwarding are hot-reloadable;
//!   listener, bus and auth changes need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::GatewayConfig;
pub use schema::{AuthConfig, AuthMode, BusConfig, ListenerConfig, LogFormat, ObservabilityConfig, StreamConfig};
