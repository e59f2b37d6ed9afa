//! Draft overlays and the operation log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use ledger_state::{
    Area, DraftOverlay, Operation, OperationType, Record, RecordFields, RecordId, SessionId,
    SessionRecord, Snapshot, TransferEntry, WorkspaceId,
};

use super::SessionEngine;
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::obs;

/// One edit a session can make.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Create(RecordFields),
    Update {
        record_id: RecordId,
        changes: Snapshot,
    },
    Delete {
        record_id: RecordId,
    },
    Transfer {
        record_id: RecordId,
        to_area: Area,
        note: Option<String>,
    },
}

impl Edit {
    pub fn operation_type(&self) -> OperationType {
        match self {
            Edit::Create(_) => OperationType::Create,
            Edit::Update { .. } => OperationType::Update,
            Edit::Delete { .. } => OperationType::Delete,
            Edit::Transfer { .. } => OperationType::Transfer,
        }
    }
}

/// A record as one session sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub record: Record,
    /// True when the values come from the session's draft overlay.
    pub is_draft: bool,
}

/// Result of computing one edit before anything is persisted.
struct Drafted {
    record: Record,
    before: Option<Snapshot>,
    after: Snapshot,
    from_area: Option<Area>,
    to_area: Option<Area>,
    base_version: u64,
    existing_overlay: Option<DraftOverlay>,
}

impl SessionEngine {
    /// Draft one edit: update the session's overlay and append an operation.
    /// The live record is not touched.
    #[instrument(skip(self, edit), fields(operation = %edit.operation_type()))]
    pub async fn apply_edit(&self, session_id: &SessionId, edit: Edit) -> Result<RecordView> {
        let mut session = self.active_session(session_id).await?;
        let operation_type = edit.operation_type();

        let drafted = match edit {
            Edit::Create(fields) => self.draft_create(&session, fields).await?,
            Edit::Update { record_id, changes } => {
                self.draft_update(&session, &record_id, &changes).await?
            }
            Edit::Delete { record_id } => self.draft_delete(&session, &record_id).await?,
            Edit::Transfer {
                record_id,
                to_area,
                note,
            } => {
                self.draft_transfer(&session, &record_id, to_area, note)
                    .await?
            }
        };

        let now = Utc::now();
        let record_id = drafted.record.id.clone();
        let overlay = match drafted.existing_overlay {
            Some(mut overlay) => {
                overlay.draft_snapshot = drafted.after.clone();
                overlay
            }
            None => DraftOverlay {
                session_id: session.id.clone(),
                record_id: record_id.clone(),
                draft_snapshot: drafted.after.clone(),
                base_version: drafted.base_version,
                locked_at: now,
            },
        };
        self.sessions.put_overlay(&overlay).await?;

        let sequence = self
            .sessions
            .operations(session_id)
            .await?
            .last()
            .map_or(1, |op| op.sequence + 1);
        let operation = Operation {
            session_id: session.id.clone(),
            sequence,
            operation_type,
            record_id: record_id.clone(),
            area: drafted.record.area(),
            before_snapshot: drafted.before,
            after_snapshot: drafted.after,
            from_area: drafted.from_area,
            to_area: drafted.to_area,
            is_undone: false,
            undone_at: None,
            created_at: now,
        };
        self.sessions.append_operation(&operation).await?;

        session.changes_count += 1;
        session.changes_summary.record(operation_type);
        self.touch(&mut session).await?;

        obs::emit_edit_applied(
            session_id.as_str(),
            record_id.as_str(),
            operation_type.as_str(),
            sequence,
        );
        METRICS.inc_edits_applied();

        Ok(RecordView {
            record: drafted.record,
            is_draft: true,
        })
    }

    /// Draft a new record in the session.
    pub async fn create_record(
        &self,
        session_id: &SessionId,
        fields: RecordFields,
    ) -> Result<RecordView> {
        self.apply_edit(session_id, Edit::Create(fields)).await
    }

    /// Draft a field update; `changes` must only name known fields.
    pub async fn update_record(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
        changes: Snapshot,
    ) -> Result<RecordView> {
        self.apply_edit(
            session_id,
            Edit::Update {
                record_id: record_id.clone(),
                changes,
            },
        )
        .await
    }

    /// Draft a soft delete.
    pub async fn delete_record(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
    ) -> Result<RecordView> {
        self.apply_edit(
            session_id,
            Edit::Delete {
                record_id: record_id.clone(),
            },
        )
        .await
    }

    /// Draft a move of the record to another area.
    pub async fn transfer_record(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
        to_area: Area,
        note: Option<String>,
    ) -> Result<RecordView> {
        self.apply_edit(
            session_id,
            Edit::Transfer {
                record_id: record_id.clone(),
                to_area,
                note,
            },
        )
        .await
    }

    /// The record as `session_id` sees it: its draft while the session is
    /// active and has one, the committed record otherwise.
    pub async fn record_view(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
    ) -> Result<RecordView> {
        let session = self.sessions.get_session(session_id).await?;
        let live = self.workspace_record(&session, record_id).await?;
        if session.is_active() {
            if let Some(overlay) = self.sessions.get_overlay(session_id, record_id).await? {
                return Ok(RecordView {
                    record: live.with_snapshot(&overlay.draft_snapshot, &session.owner),
                    is_draft: true,
                });
            }
        }
        if live.is_pending() {
            return Err(pending_elsewhere(&session, record_id));
        }
        Ok(RecordView {
            record: live,
            is_draft: false,
        })
    }

    /// Committed records of a workspace. Records still pending creation in
    /// a session are left out.
    pub async fn list_records(
        &self,
        workspace_id: &WorkspaceId,
        include_deleted: bool,
    ) -> Result<Vec<Record>> {
        let mut records = self
            .records
            .list_records(workspace_id, include_deleted)
            .await?;
        records.retain(|r| !r.is_pending());
        Ok(records)
    }

    // -- drafting ------------------------------------------------------------

    async fn draft_create(&self, session: &SessionRecord, fields: RecordFields) -> Result<Drafted> {
        let record = Record::new(session.workspace_id.clone(), fields, &session.owner);
        self.records.insert_record(&record).await?;
        Ok(Drafted {
            after: record.snapshot(),
            before: None,
            from_area: None,
            to_area: None,
            base_version: record.version,
            existing_overlay: None,
            record,
        })
    }

    async fn draft_update(
        &self,
        session: &SessionRecord,
        record_id: &RecordId,
        changes: &Snapshot,
    ) -> Result<Drafted> {
        reject_transfer_keys(changes)?;
        let (view, existing_overlay, base_version) =
            self.session_view(session, record_id).await?;
        if view.is_deleted() {
            return Err(EngineError::Validation(format!(
                "record {record_id} is deleted"
            )));
        }

        let before = view.snapshot();
        let mut record = view;
        record.fields = record.fields.try_apply(changes)?;
        Ok(Drafted {
            after: record.snapshot(),
            before: Some(before),
            from_area: None,
            to_area: None,
            base_version,
            existing_overlay,
            record,
        })
    }

    async fn draft_delete(&self, session: &SessionRecord, record_id: &RecordId) -> Result<Drafted> {
        let (view, existing_overlay, base_version) =
            self.session_view(session, record_id).await?;
        if view.is_deleted() {
            return Err(EngineError::Validation(format!(
                "record {record_id} is already deleted"
            )));
        }

        let before = view.snapshot();
        let after = before.clone().with_deleted(true);
        let record = view.with_snapshot(&after, &session.owner);
        Ok(Drafted {
            record,
            before: Some(before),
            after,
            from_area: None,
            to_area: None,
            base_version,
            existing_overlay,
        })
    }

    async fn draft_transfer(
        &self,
        session: &SessionRecord,
        record_id: &RecordId,
        to_area: Area,
        note: Option<String>,
    ) -> Result<Drafted> {
        let (view, existing_overlay, base_version) =
            self.session_view(session, record_id).await?;
        if view.is_deleted() {
            return Err(EngineError::InvalidTransfer(format!(
                "record {record_id} is deleted"
            )));
        }
        let from_area = view.area();
        if from_area == to_area {
            return Err(EngineError::InvalidTransfer(format!(
                "record is already in area {to_area}"
            )));
        }

        let before = view.snapshot();
        let mut record = view;
        record.fields.area = to_area;
        record.fields.transfer_history.push(TransferEntry {
            from_area,
            to_area,
            transferred_at: Utc::now(),
            transferred_by: session.owner.id.clone(),
            note,
        });
        Ok(Drafted {
            after: record.snapshot(),
            before: Some(before),
            from_area: Some(from_area),
            to_area: Some(to_area),
            base_version,
            existing_overlay,
            record,
        })
    }

    /// The record with this session's overlay applied, the overlay itself,
    /// and the base version a new overlay would anchor to.
    async fn session_view(
        &self,
        session: &SessionRecord,
        record_id: &RecordId,
    ) -> Result<(Record, Option<DraftOverlay>, u64)> {
        let live = self.workspace_record(session, record_id).await?;
        let overlay = self.sessions.get_overlay(&session.id, record_id).await?;
        if live.is_pending() && overlay.is_none() {
            return Err(pending_elsewhere(session, record_id));
        }
        Ok(match overlay {
            Some(overlay) => {
                let view = live.with_snapshot(&overlay.draft_snapshot, &session.owner);
                let base = overlay.base_version;
                (view, Some(overlay), base)
            }
            None => {
                let base = live.version;
                (live, None, base)
            }
        })
    }

    /// Fetch a live record, hiding records of other workspaces. Pending
    /// creates are filtered by the callers, which know the overlay.
    async fn workspace_record(
        &self,
        session: &SessionRecord,
        record_id: &RecordId,
    ) -> Result<Record> {
        let live = self.records.get_record(record_id).await?;
        if live.workspace_id != session.workspace_id {
            return Err(EngineError::NotFound(format!(
                "record {record_id} in workspace {}",
                session.workspace_id
            )));
        }
        Ok(live)
    }
}

/// Field changes may not touch what only a transfer maintains.
pub(super) fn reject_transfer_keys(changes: &Snapshot) -> Result<()> {
    if changes.contains_key("area") {
        return Err(EngineError::Validation(
            "area changes must go through a transfer".to_string(),
        ));
    }
    if changes.contains_key("transfer_history") {
        return Err(EngineError::Validation(
            "transfer_history is maintained by transfers".to_string(),
        ));
    }
    Ok(())
}

/// A record another session created and has not committed yet.
fn pending_elsewhere(session: &SessionRecord, record_id: &RecordId) -> EngineError {
    EngineError::NotFound(format!(
        "record {record_id} in workspace {}",
        session.workspace_id
    ))
}
