//! Error types for selection protocol operations.
//!
//! Only transport-level failures are modeled as errors here. Protocol
//! negatives (unsupported target, absent owner, peer timeout, malformed
//! escape sequences) are expected outcomes of an unreliable cross-process
//! protocol and are returned as ordinary values by the facade.

use thiserror::Error;

/// Result type for selection operations
pub type SelectionResult<T> = std::result::Result<T, SelectionError>;

/// Errors that can occur during selection operations
#[derive(Error, Debug)]
pub enum SelectionError {
    /// Display connection failure (property I/O, event send, ownership calls)
    #[error("transport error: {0}")]
    Transport(String),

    /// Atom interning failed
    #[error("atom interning failed for \"{name}\": {reason}")]
    InternFailed {
        /// Atom name that could not be interned
        name: String,
        /// Transport-reported reason
        reason: String,
    },

    /// A request was issued while another was still pending for the same selection
    #[error("request already in flight for selection \"{0}\"")]
    RequestInFlight(String),
}

impl SelectionError {
    /// Build a transport error from any displayable reason
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }

    /// Returns true if this error indicates the display connection is unusable
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::InternFailed { .. })
    }

    /// Returns true if this error is a caller-side usage error
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::RequestInFlight(_))
    }
}
