//! Error types for ledger-state

use thiserror::Error;

/// Errors that can occur while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits.
///
/// Every backend (in-memory fake or SurrealDB) maps its failures onto these
/// variants so callers can match on them without knowing the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("record not found: {record_id}")]
    RecordNotFound { record_id: String },

    #[error("record already exists: {record_id}")]
    DuplicateRecord { record_id: String },

    #[error("version mismatch on record {record_id}: expected {expected}, found {actual}")]
    VersionMismatch {
        record_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("version {version} of record {record_id} not found")]
    VersionNotFound { record_id: String, version: u64 },

    #[error("version entry not found: {entry_id}")]
    VersionEntryNotFound { entry_id: String },

    #[error("version {version} of record {record_id} already recorded")]
    DuplicateVersion { record_id: String, version: u64 },

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("session already exists: {session_id}")]
    DuplicateSession { session_id: String },

    #[error("operation {sequence} already recorded in session {session_id}")]
    DuplicateOperation { session_id: String, sequence: u64 },

    #[error("operation {sequence} not found in session {session_id}")]
    OperationNotFound { session_id: String, sequence: u64 },

    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_mentions_both_versions() {
        let err = StorageError::VersionMismatch {
            record_id: "r-1".to_string(),
            expected: 3,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("r-1"));
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("found 5"));
    }

    #[test]
    fn state_error_converts_to_backend() {
        let err: StorageError = StateError::Connection("refused".to_string()).into();
        assert!(matches!(err, StorageError::Backend(ref m) if m.contains("refused")));
    }
}
