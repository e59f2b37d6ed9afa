//! Engine error taxonomy.

use ledger_state::StorageError;

use crate::conflict::Conflict;

/// Errors surfaced by [`crate::SessionEngine`].
///
/// None of these are engine-fatal; all are meant to be shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session {session_id} is not active ({status})")]
    SessionNotActive { session_id: String, status: String },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("commit blocked by {} conflicting record(s)", conflicts.len())]
    Conflict { conflicts: Vec<Conflict> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl EngineError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::SessionNotActive { .. } => "SESSION_NOT_ACTIVE",
            EngineError::NothingToUndo => "NOTHING_TO_UNDO",
            EngineError::NothingToRedo => "NOTHING_TO_REDO",
            EngineError::Conflict { .. } => "CONFLICT",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::InvalidTransfer(_) => "INVALID_TRANSFER",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Conflicts carried by a `Conflict` error, empty otherwise.
    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            EngineError::Conflict { conflicts } => conflicts,
            _ => &[],
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RecordNotFound { .. }
            | StorageError::VersionNotFound { .. }
            | StorageError::VersionEntryNotFound { .. }
            | StorageError::SessionNotFound { .. }
            | StorageError::OperationNotFound { .. } => EngineError::NotFound(err.to_string()),
            other => EngineError::Storage(other),
        }
    }
}

impl From<ledger_state::FieldError> for EngineError {
    fn from(err: ledger_state::FieldError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
