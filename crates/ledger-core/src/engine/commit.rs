//! Conflict detection, commit and conflict resolution.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use ledger_state::{
    ChangeType, CommitBatch, DraftOverlay, NoteRole, Operation, OperationType, RecordId,
    SessionId, SessionRecord, SessionStatus, VersionEntry,
};

use super::draft::reject_transfer_keys;
use super::{versioned_write, SessionEngine};
use crate::conflict::{Conflict, ConflictResolution, ResolutionStrategy};
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::obs;

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    pub session: SessionRecord,
    /// Records that received a new version. Several operations on one record
    /// count once; records created and dropped within the session not at all.
    pub changes_committed: usize,
    /// Applied operations the commit covered, the session's `changes_count`.
    pub operations_committed: u64,
    /// Version entries written, one per committed record.
    pub versions: Vec<VersionEntry>,
}

/// What the session's operations did to one record.
#[derive(Debug, Default)]
struct RecordOps {
    created: bool,
    pending: Vec<OperationType>,
}

impl RecordOps {
    fn index(operations: &[Operation]) -> HashMap<RecordId, RecordOps> {
        let mut by_record: HashMap<RecordId, RecordOps> = HashMap::new();
        for op in operations {
            let entry = by_record.entry(op.record_id.clone()).or_default();
            if op.operation_type == OperationType::Create {
                entry.created = true;
            }
            if !op.is_undone {
                entry.pending.push(op.operation_type);
            }
        }
        by_record
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// create > delete > transfer > update.
    fn change_type(&self) -> ChangeType {
        let has = |t: OperationType| self.pending.contains(&t);
        if has(OperationType::Create) {
            ChangeType::Create
        } else if has(OperationType::Delete) {
            ChangeType::Delete
        } else if has(OperationType::Transfer) {
            ChangeType::Transfer
        } else {
            ChangeType::Update
        }
    }
}

impl SessionEngine {
    /// Drafted records whose committed version moved past the draft's base.
    pub async fn check_conflicts(&self, session_id: &SessionId) -> Result<Vec<Conflict>> {
        let session = self.active_session(session_id).await?;
        self.detect_conflicts(&session).await
    }

    /// Commit every pending draft of the session as one new version per
    /// record. Nothing is written if any drafted record is in conflict.
    #[instrument(skip(self, message))]
    pub async fn commit(
        &self,
        session_id: &SessionId,
        message: Option<String>,
    ) -> Result<CommitResult> {
        let _gate = self.commit_gate.lock().await;
        let session = self.active_session(session_id).await?;
        self.commit_locked(session, message).await
    }

    /// Apply conflict resolutions to the session's drafts, then commit.
    ///
    /// Resolutions naming records the session has no draft for are ignored.
    #[instrument(skip(self, resolutions, message), fields(resolutions = resolutions.len()))]
    pub async fn resolve_conflicts(
        &self,
        session_id: &SessionId,
        resolutions: Vec<ConflictResolution>,
        message: Option<String>,
    ) -> Result<CommitResult> {
        let _gate = self.commit_gate.lock().await;
        let session = self.active_session(session_id).await?;

        let mut resolved = 0usize;
        for resolution in resolutions {
            let Some(mut overlay) = self
                .sessions
                .get_overlay(session_id, &resolution.record_id)
                .await?
            else {
                debug!(record_id = %resolution.record_id, "no draft to resolve");
                continue;
            };
            let Some(live) = self.records.find_record(&resolution.record_id).await? else {
                debug!(record_id = %resolution.record_id, "record gone, nothing to resolve");
                continue;
            };

            match resolution.strategy {
                ResolutionStrategy::KeepMine => {}
                ResolutionStrategy::KeepTheirs => {
                    overlay.draft_snapshot = live.snapshot();
                }
                ResolutionStrategy::Manual(values) => {
                    reject_transfer_keys(&values)?;
                    let view = live.with_snapshot(&overlay.draft_snapshot, &session.owner);
                    view.fields.try_apply(&values)?;
                    overlay.draft_snapshot.merge(&values);
                }
            }
            overlay.base_version = live.version;
            self.sessions.put_overlay(&overlay).await?;
            resolved += 1;
        }

        self.append_note(
            session_id,
            NoteRole::System,
            format!("Conflicts resolved: {resolved} record(s)"),
        )
        .await?;
        self.commit_locked(session, message).await
    }

    // -- internals -----------------------------------------------------------

    async fn pending_overlays(
        &self,
        session_id: &SessionId,
    ) -> Result<(Vec<DraftOverlay>, HashMap<RecordId, RecordOps>)> {
        let operations = self.sessions.operations(session_id).await?;
        let ops = RecordOps::index(&operations);
        let overlays = self.sessions.overlays(session_id).await?;
        Ok((overlays, ops))
    }

    async fn detect_conflicts(&self, session: &SessionRecord) -> Result<Vec<Conflict>> {
        let (overlays, ops) = self.pending_overlays(&session.id).await?;
        let mut conflicts = Vec::new();
        for overlay in &overlays {
            let pending = ops
                .get(&overlay.record_id)
                .is_some_and(RecordOps::has_pending);
            if !pending {
                continue;
            }
            let live = self
                .records
                .find_record(&overlay.record_id)
                .await?
                .ok_or_else(|| vanished(session, &overlay.record_id))?;
            if live.version != overlay.base_version {
                conflicts.push(Conflict::between(overlay, &live));
            }
        }
        Ok(conflicts)
    }

    /// Commit with the gate already held.
    async fn commit_locked(
        &self,
        mut session: SessionRecord,
        message: Option<String>,
    ) -> Result<CommitResult> {
        let conflicts = self.detect_conflicts(&session).await?;
        if !conflicts.is_empty() {
            obs::emit_conflicts_detected(session.id.as_str(), conflicts.len());
            METRICS.inc_conflicts();
            return Err(EngineError::Conflict { conflicts });
        }

        let (overlays, ops) = self.pending_overlays(&session.id).await?;
        let now = Utc::now();
        let mut batch = CommitBatch::default();

        for overlay in overlays {
            let record_ops = ops.get(&overlay.record_id);
            let created = record_ops.is_some_and(|o| o.created);

            let Some(record_ops) = record_ops.filter(|o| o.has_pending()) else {
                if created {
                    batch.removals.push(overlay.record_id);
                }
                continue;
            };
            if created && overlay.draft_snapshot.deleted() == Some(true) {
                batch.removals.push(overlay.record_id);
                continue;
            }

            let live = self
                .records
                .find_record(&overlay.record_id)
                .await?
                .ok_or_else(|| vanished(&session, &overlay.record_id))?;
            let mut record = live.with_snapshot(&overlay.draft_snapshot, &session.owner);
            record.updated_by = Some(session.owner.clone());
            record.updated_at = now;

            let change_type = record_ops.change_type();
            batch
                .writes
                .push(versioned_write(record, overlay.base_version, |r| {
                    VersionEntry::capture(
                        r,
                        change_type,
                        &session.owner,
                        Some(session.id.clone()),
                        message.clone(),
                        now,
                    )
                }));
        }

        if let Err(e) = self.writer.apply_batch(&batch).await {
            obs::emit_commit_aborted(session.id.as_str(), &e.to_string());
            return Err(e.into());
        }
        let versions: Vec<VersionEntry> = batch.writes.into_iter().map(|w| w.entry).collect();

        self.sessions.clear_overlays(&session.id).await?;
        self.append_note(
            &session.id,
            NoteRole::System,
            format!(
                "Session committed: {}",
                message.as_deref().unwrap_or("No message")
            ),
        )
        .await?;

        session.status = SessionStatus::Committed;
        session.committed_at = Some(now);
        session.commit_message = message;
        session.last_activity = now;
        self.sessions.save_session(&session).await?;

        obs::emit_committed(session.id.as_str(), versions.len());
        METRICS.inc_commits();
        Ok(CommitResult {
            changes_committed: versions.len(),
            operations_committed: session.changes_count,
            session,
            versions,
        })
    }
}

/// A record the session drafted that is no longer stored.
fn vanished(session: &SessionRecord, record_id: &RecordId) -> EngineError {
    EngineError::NotFound(format!(
        "record {record_id} drafted in session {} no longer exists",
        session.id
    ))
}
