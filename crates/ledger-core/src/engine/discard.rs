//! Discarding a session.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use ledger_state::{CommitBatch, NoteRole, OperationType, SessionId, SessionRecord, SessionStatus};

use super::SessionEngine;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;

/// Outcome of discarding a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardResult {
    pub session: SessionRecord,
    /// Applied operations that were thrown away.
    pub changes_discarded: u64,
}

impl SessionEngine {
    /// Abandon the session: drop its drafts and the records it created. The
    /// committed records never saw its edits, so nothing else is written.
    #[instrument(skip(self))]
    pub async fn discard(&self, session_id: &SessionId) -> Result<DiscardResult> {
        let mut session = self.active_session(session_id).await?;
        let operations = self.sessions.operations(session_id).await?;

        let changes_discarded = operations.iter().filter(|op| !op.is_undone).count() as u64;
        let created: HashSet<_> = operations
            .iter()
            .filter(|op| op.operation_type == OperationType::Create)
            .map(|op| op.record_id.clone())
            .collect();

        self.writer
            .apply_batch(&CommitBatch {
                writes: Vec::new(),
                removals: created.into_iter().collect(),
            })
            .await?;
        self.sessions.clear_overlays(session_id).await?;
        self.append_note(session_id, NoteRole::System, "Session discarded".to_string())
            .await?;

        let now = Utc::now();
        session.status = SessionStatus::Discarded;
        session.discarded_at = Some(now);
        session.last_activity = now;
        self.sessions.save_session(&session).await?;

        obs::emit_discarded(session_id.as_str(), changes_discarded);
        METRICS.inc_discards();
        Ok(DiscardResult {
            session,
            changes_discarded,
        })
    }
}
