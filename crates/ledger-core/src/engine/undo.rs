//! Undo and redo over the session's operation log.

use chrono::Utc;
use tracing::instrument;

use ledger_state::{NoteRole, Operation, SessionId, Snapshot};

use super::SessionEngine;
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::obs;

/// The operation `redo` would reapply: the earliest undone operation newer
/// than every operation still applied. Undone operations older than an
/// applied one have been superseded and stay undone.
fn redo_target(operations: &[Operation]) -> Option<&Operation> {
    let newest_applied = operations
        .iter()
        .filter(|op| !op.is_undone)
        .map(|op| op.sequence)
        .max()
        .unwrap_or(0);
    operations
        .iter()
        .filter(|op| op.is_undone && op.sequence > newest_applied)
        .min_by_key(|op| op.sequence)
}

/// The draft a record returns to when `op` is reverted.
fn revert_snapshot(op: &Operation) -> Snapshot {
    match &op.before_snapshot {
        Some(before) => before.clone(),
        // Reverting a create hides the record until commit or discard.
        None => op.after_snapshot.clone().with_deleted(true),
    }
}

impl SessionEngine {
    /// Revert the session's most recent applied operation.
    #[instrument(skip(self))]
    pub async fn undo(&self, session_id: &SessionId) -> Result<Operation> {
        let mut session = self.active_session(session_id).await?;
        let operations = self.sessions.operations(session_id).await?;
        let mut op = operations
            .into_iter()
            .rev()
            .find(|op| !op.is_undone)
            .ok_or(EngineError::NothingToUndo)?;

        self.set_draft(session_id, &op.record_id, &revert_snapshot(&op))
            .await?;

        op.is_undone = true;
        op.undone_at = Some(Utc::now());
        self.sessions.save_operation(&op).await?;

        session.changes_count = session.changes_count.saturating_sub(1);
        session.changes_summary.retract(op.operation_type);
        self.append_note(
            session_id,
            NoteRole::System,
            format!("Undo: {} operation reverted", op.operation_type),
        )
        .await?;
        self.touch(&mut session).await?;

        obs::emit_undone(session_id.as_str(), op.operation_type.as_str(), op.sequence);
        METRICS.inc_undos();
        Ok(op)
    }

    /// Reapply the next undone operation, if nothing newer has been applied
    /// since it was undone.
    #[instrument(skip(self))]
    pub async fn redo(&self, session_id: &SessionId) -> Result<Operation> {
        let mut session = self.active_session(session_id).await?;
        let operations = self.sessions.operations(session_id).await?;
        let mut op = redo_target(&operations)
            .cloned()
            .ok_or(EngineError::NothingToRedo)?;

        self.set_draft(session_id, &op.record_id, &op.after_snapshot)
            .await?;

        op.is_undone = false;
        op.undone_at = None;
        self.sessions.save_operation(&op).await?;

        session.changes_count += 1;
        session.changes_summary.record(op.operation_type);
        self.append_note(
            session_id,
            NoteRole::System,
            format!("Redo: {} operation reapplied", op.operation_type),
        )
        .await?;
        self.touch(&mut session).await?;

        obs::emit_redone(session_id.as_str(), op.operation_type.as_str(), op.sequence);
        METRICS.inc_redos();
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_state::{Area, OperationType, RecordId};

    fn op(sequence: u64, is_undone: bool) -> Operation {
        Operation {
            session_id: SessionId::from("s"),
            sequence,
            operation_type: OperationType::Update,
            record_id: RecordId::from("r"),
            area: Area::Budget,
            before_snapshot: Some(Snapshot::new()),
            after_snapshot: Snapshot::new(),
            from_area: None,
            to_area: None,
            is_undone,
            undone_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn redo_picks_earliest_undone_tail_op() {
        let ops = vec![op(1, false), op(2, true), op(3, true)];
        assert_eq!(redo_target(&ops).map(|o| o.sequence), Some(2));
    }

    #[test]
    fn redo_ignores_ops_superseded_by_newer_edit() {
        let ops = vec![op(1, false), op(2, true), op(3, false)];
        assert!(redo_target(&ops).is_none());
    }

    #[test]
    fn redo_with_everything_undone_starts_at_first() {
        let ops = vec![op(1, true), op(2, true)];
        assert_eq!(redo_target(&ops).map(|o| o.sequence), Some(1));
    }

    #[test]
    fn reverting_a_create_marks_deleted() {
        let mut create = op(1, false);
        create.before_snapshot = None;
        assert_eq!(revert_snapshot(&create).deleted(), Some(true));
    }
}
