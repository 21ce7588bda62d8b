//! Bus-layer error kinds.

use thiserror::Error;

/// Failures reported by a [`MessageBus`](crate::bus::MessageBus) adapter.
///
/// The set is closed so the bridges can match on it instead of comparing
/// against client-specific sentinel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A bucket or key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A request was sent to a subject nobody listens on.
    #[error("no responders available for request")]
    NoResponders,

    /// The operation did not complete within its deadline.
    #[error("timed out")]
    Timeout,

    /// The subscription or connection is gone and will not deliver again.
    #[error("subscription closed")]
    Closed,

    /// Anything else the bus client reported.
    #[error("bus error: {0}")]
    Other(String),
}

impl BusError {
    /// Wrap an arbitrary client error as [`BusError::Other`].
    pub fn other(err: impl std::fmt::Display) -> Self {
        Self::Other(err.to_string())
    }
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;
