/// Error kinds raised by the history buffer and its coordinator.
use std::thread::ThreadId;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// A required argument was missing or unusable.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The operation is not allowed in the current state.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// The history was accessed from a thread other than the one that created it.
    #[error("history owned by thread {owner:?} was accessed from thread {caller:?}")]
    ContextViolation { owner: ThreadId, caller: ThreadId },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    /// The weakly referenced target has been dropped.
    #[error("history target is no longer available")]
    TargetUnavailable,

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HistoryError {
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
