//! Error types for action execution.

use thiserror::Error;

use crate::backend::BackendError;

/// Result type alias for action execution.
pub type Result<T> = std::result::Result<T, ActionError>;

/// Failure modes of executing one action node.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    /// The messaging backend rejected or failed the call.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The session's send queue is gone.
    #[error("send queue closed for session {session}")]
    QueueClosed {
        /// Session whose queue is unavailable.
        session: String,
    },
}

impl ActionError {
    /// Creates a queue-closed error.
    pub fn queue_closed(session: impl Into<String>) -> Self {
        Self::QueueClosed { session: session.into() }
    }
}
