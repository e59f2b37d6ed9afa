//! Storage trait definitions for the ledger
//!
//! These traits define the core storage abstractions:
//! - `RecordStore`: Live financial records with optimistic versioning
//! - `VersionLog`: Append-only per-record history of committed versions
//! - `SessionStore`: Sessions, their operation logs, draft overlays and notes
//! - `LedgerWriter`: All-or-nothing application of version bumps
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{
    DraftOverlay, Operation, Record, RecordId, SessionId, SessionNote, SessionRecord,
    SessionStatus, VersionEntry, VersionEntryId, WorkspaceId,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// RecordStore — Live Records
// ---------------------------------------------------------------------------

/// Live record store.
///
/// Guarantees:
/// - `update_record` is a compare-and-swap on `version`: it succeeds only if
///   the stored version equals `expected_version`.
/// - Soft-deleted records are still returned by `get_record`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails with `DuplicateRecord` if the id exists.
    async fn insert_record(&self, record: &Record) -> StorageResult<()>;

    /// Fetch a record by id. Returns `RecordNotFound` if absent.
    async fn get_record(&self, record_id: &RecordId) -> StorageResult<Record>;

    /// Fetch a record by id, `None` if absent.
    async fn find_record(&self, record_id: &RecordId) -> StorageResult<Option<Record>>;

    /// Replace a record if its stored version is still `expected_version`.
    async fn update_record(&self, record: &Record, expected_version: u64) -> StorageResult<()>;

    /// Hard-delete a record. No-op if absent.
    async fn delete_record(&self, record_id: &RecordId) -> StorageResult<()>;

    /// All records of a workspace, oldest first.
    async fn list_records(
        &self,
        workspace_id: &WorkspaceId,
        include_deleted: bool,
    ) -> StorageResult<Vec<Record>>;
}

// ---------------------------------------------------------------------------
// VersionLog — Record History
// ---------------------------------------------------------------------------

/// Append-only version history.
///
/// Guarantees:
/// - At most one entry per `(record_id, version)`.
/// - `history` is ordered by ascending version.
#[async_trait]
pub trait VersionLog: Send + Sync {
    /// Append an entry. Fails with `DuplicateVersion` on a repeated version.
    async fn append(&self, entry: &VersionEntry) -> StorageResult<()>;

    /// Fetch a specific version of a record. Returns `VersionNotFound` if absent.
    async fn get_version(&self, record_id: &RecordId, version: u64)
        -> StorageResult<VersionEntry>;

    /// Fetch an entry by its own id. Returns `VersionEntryNotFound` if absent.
    async fn get_entry(&self, entry_id: &VersionEntryId) -> StorageResult<VersionEntry>;

    /// Every entry of a record, ascending by version.
    async fn history(&self, record_id: &RecordId) -> StorageResult<Vec<VersionEntry>>;

    /// Every entry of a workspace, ascending by `changed_at`.
    async fn workspace_entries(&self, workspace_id: &WorkspaceId)
        -> StorageResult<Vec<VersionEntry>>;

    /// Remove every entry of a record, returning how many were removed.
    async fn clear_history(&self, record_id: &RecordId) -> StorageResult<u64>;
}

// ---------------------------------------------------------------------------
// SessionStore — Sessions, Operations, Drafts, Notes
// ---------------------------------------------------------------------------

/// Session persistence.
///
/// Guarantees:
/// - Operation sequences are unique within a session.
/// - At most one draft overlay per `(session_id, record_id)`.
/// - `operations` and `notes` are ordered by ascending sequence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Fails with `DuplicateSession` if the id exists.
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()>;

    /// Fetch a session. Returns `SessionNotFound` if absent.
    async fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord>;

    /// Overwrite an existing session.
    async fn save_session(&self, session: &SessionRecord) -> StorageResult<()>;

    /// Sessions of a workspace, newest first, optionally filtered.
    async fn list_sessions(
        &self,
        workspace_id: &WorkspaceId,
        status: Option<SessionStatus>,
        owner_id: Option<&str>,
    ) -> StorageResult<Vec<SessionRecord>>;

    /// Append an operation. Fails with `DuplicateOperation` on a repeated sequence.
    async fn append_operation(&self, operation: &Operation) -> StorageResult<()>;

    /// Overwrite an existing operation (undo/redo flags).
    async fn save_operation(&self, operation: &Operation) -> StorageResult<()>;

    /// Operation log of a session, ascending by sequence.
    async fn operations(&self, session_id: &SessionId) -> StorageResult<Vec<Operation>>;

    /// Insert or replace the overlay for `(session_id, record_id)`.
    async fn put_overlay(&self, overlay: &DraftOverlay) -> StorageResult<()>;

    async fn get_overlay(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
    ) -> StorageResult<Option<DraftOverlay>>;

    /// All overlays of a session.
    async fn overlays(&self, session_id: &SessionId) -> StorageResult<Vec<DraftOverlay>>;

    /// Drop every overlay of a session.
    async fn clear_overlays(&self, session_id: &SessionId) -> StorageResult<()>;

    /// Append a note. Its `sequence` is assigned by the caller.
    async fn append_note(&self, note: &SessionNote) -> StorageResult<()>;

    /// Notes of a session, ascending by sequence.
    async fn notes(&self, session_id: &SessionId) -> StorageResult<Vec<SessionNote>>;
}

// ---------------------------------------------------------------------------
// LedgerWriter — Atomic Version Bumps
// ---------------------------------------------------------------------------

/// One record moving to its next version, with the entry that records it.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedWrite {
    pub record: Record,
    pub expected_version: u64,
    pub entry: VersionEntry,
}

/// Record writes, history entries and hard deletes that land together.
///
/// A batch names each record at most once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    pub writes: Vec<VersionedWrite>,
    pub removals: Vec<RecordId>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.removals.is_empty()
    }
}

/// Applies a [`CommitBatch`] across the record store and the version log.
///
/// Guarantees:
/// - Every write is checked before anything is written: the stored version
///   must equal `expected_version` (`VersionMismatch`), the record must exist
///   (`RecordNotFound`) and `(record_id, entry.version)` must be unused
///   (`DuplicateVersion`).
/// - On any error no record, entry or removal of the batch is applied.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn apply_batch(&self, batch: &CommitBatch) -> StorageResult<()>;
}
