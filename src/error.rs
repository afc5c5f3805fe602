//! Error types for tagbus

use thiserror::Error;

/// Errors that can occur in the bus
///
/// Handler invocation failures are deliberately absent: they are caught at
/// the handler boundary, reported through `tracing`, and governed by the
/// bus's failure policy — never surfaced to the poster.
#[derive(Debug, Error)]
pub enum BusError {
    /// A listener declared an invalid binding (registration-time failure)
    #[error("Invalid binding on method '{method}': {reason}")]
    InvalidBinding {
        /// Name of the offending bound method
        method: String,
        /// What was wrong with the declaration
        reason: String,
    },

    /// Thread-confinement policy rejected the calling context
    #[error("Bus '{bus}' accessed from disallowed thread {thread}")]
    PolicyViolation {
        /// Name of the bus being accessed
        bus: String,
        /// Description of the offending thread
        thread: String,
    },

    /// The target stream has already completed (never revived)
    ///
    /// Internal signal: the registry's get-or-create loop retries with a
    /// fresh stream when it loses the race against completion.
    #[error("Stream for channel '{key}' already completed")]
    StreamCompleted {
        /// Display form of the channel key
        key: String,
    },
}

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;
