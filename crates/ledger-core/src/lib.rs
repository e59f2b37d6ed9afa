//! Ledger Core Library
//!
//! The session engine for the cashflow ledger: bounded editing sessions with
//! draft overlays, undo/redo, optimistic conflict detection, atomic commit,
//! plus version-history restore and workspace rollback.

pub mod conflict;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod telemetry;

pub use conflict::{Conflict, ConflictResolution, ResolutionStrategy};
pub use engine::{
    CommitResult, DiscardResult, Edit, HistoryEntry, RecordView, SessionEngine, TransferInfo,
};
pub use error::{EngineError, Result};
pub use metrics::METRICS;
pub use obs::{
    emit_commit_aborted, emit_committed, emit_conflicts_detected, emit_discarded,
    emit_edit_applied, emit_record_restored, emit_redone, emit_session_opened, emit_undone,
    emit_workspace_rolled_back, SessionSpan,
};
pub use telemetry::init_tracing;

pub use ledger_state::{
    Actor, Area, ChangeType, Operation, OperationType, Record, RecordFields, RecordId, SessionId,
    SessionNote, SessionRecord, SessionStatus, Snapshot, VersionEntry, VersionEntryId,
    WorkspaceId,
};
