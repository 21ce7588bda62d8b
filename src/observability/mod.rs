//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Bridges, sessions, config reload
//!     → logging.rs (tracing subscriber: env filter + pretty/json output)
//!     → metrics.rs (request, session and stream event series)
//!
//! Exposed as:
//!     → stdout log lines, one span per HTTP request carrying x-request-id
//!     → Prometheus scrape endpoint when metrics are enabled
//! ```
//!
//! # Design Decisions
//! - Metric recording is a no-op until the exporter is installed
//! - Session outcomes are counted by reason, not logged per message

pub mod logging;
pub mod metrics;
