//! Ledger-State: persistence layer for the cashflow ledger
//!
//! This crate owns every piece of durable state: live records, their version
//! history, and working sessions with their operation logs, draft overlays
//! and notes.
//!
//! ## Key Components
//!
//! - `storage_traits`: `RecordStore`, `VersionLog`, `SessionStore`, `LedgerWriter`
//! - `fakes`: in-memory implementations of the traits
//! - `SurrealStore`: SurrealDB implementation of the traits
//! - `SurrealHandle`: connection setup (in-memory, local file, cloud)

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
pub mod model;
mod schema;
pub mod snapshot;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, SurrealHandle};
pub use model::{
    Actor, Area, ChangeType, ChangesSummary, DraftOverlay, FieldError, NoteRole, Operation,
    OperationType, Record, RecordFields, RecordId, SessionId, SessionNote, SessionRecord,
    SessionStatus, TransferEntry, UnknownVariant, VersionEntry, VersionEntryId, WorkspaceId,
};
pub use snapshot::{ContentDigest, FieldChange, Snapshot, DELETED_KEY};
pub use storage_traits::{
    CommitBatch, LedgerWriter, RecordStore, SessionStore, StorageResult, VersionLog,
    VersionedWrite,
};
pub use surreal_store::SurrealStore;

/// Result type for ledger-state operations
pub type Result<T> = std::result::Result<T, StateError>;
