//! Error types for notification delivery.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// No event is ready right now.
    #[error("no event available")]
    Empty,

    /// The publishing side has gone away.
    #[error("subscription closed")]
    Closed,

    /// The backing transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
