//! Structured observability hooks for session and history lifecycle events.
//!
//! This module provides:
//! - Session-scoped tracing spans via `SessionSpan` RAII guard
//! - Emission functions for key lifecycle events: open, edit, undo/redo,
//!   commit (and aborted commits), conflicts, discard, restore and rollback
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).

use tracing::{info, warn};

/// RAII guard that enters a session-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SessionSpan::enter("6f1c...");
/// // Now all tracing calls are associated with session_id = "6f1c..."
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    /// Create and enter a span tagged with the session_id.
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("ledger.session", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: session opened.
pub fn emit_session_opened(session_id: &str, workspace_id: &str, owner_id: &str) {
    info!(
        event = "session.opened",
        session_id = %session_id,
        workspace_id = %workspace_id,
        owner_id = %owner_id,
    );
}

/// Emit event: an edit was drafted and logged.
pub fn emit_edit_applied(session_id: &str, record_id: &str, operation: &str, sequence: u64) {
    info!(
        event = "session.edit_applied",
        session_id = %session_id,
        record_id = %record_id,
        operation = %operation,
        sequence = sequence,
    );
}

pub fn emit_undone(session_id: &str, operation: &str, sequence: u64) {
    info!(event = "session.undone", session_id = %session_id, operation = %operation, sequence = sequence);
}

pub fn emit_redone(session_id: &str, operation: &str, sequence: u64) {
    info!(event = "session.redone", session_id = %session_id, operation = %operation, sequence = sequence);
}

/// Emit event: session committed with the number of versions written.
pub fn emit_committed(session_id: &str, changes_committed: usize) {
    info!(
        event = "session.committed",
        session_id = %session_id,
        changes_committed = changes_committed,
    );
}

/// Emit event: commit refused because of conflicts (warning level).
pub fn emit_conflicts_detected(session_id: &str, conflicts: usize) {
    warn!(
        event = "session.conflicts_detected",
        session_id = %session_id,
        conflicts = conflicts,
    );
}

pub fn emit_discarded(session_id: &str, changes_discarded: u64) {
    info!(
        event = "session.discarded",
        session_id = %session_id,
        changes_discarded = changes_discarded,
    );
}

pub fn emit_record_restored(record_id: &str, restored_version: u64, new_version: u64) {
    info!(
        event = "record.restored",
        record_id = %record_id,
        restored_version = restored_version,
        new_version = new_version,
    );
}

pub fn emit_workspace_rolled_back(workspace_id: &str, marker_entry_id: &str, records: usize) {
    info!(
        event = "workspace.rolled_back",
        workspace_id = %workspace_id,
        marker_entry_id = %marker_entry_id,
        records = records,
    );
}

/// Emit event: storage refused a commit batch; nothing was applied
/// (warning level).
pub fn emit_commit_aborted(session_id: &str, reason: &str) {
    warn!(
        event = "session.commit_aborted",
        session_id = %session_id,
        reason = %reason,
    );
}
