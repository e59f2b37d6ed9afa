//! SurrealDB-backed implementation of the storage traits
//!
//! Uses the `schema` row types for persistence, converting to/from `model`
//! types at the boundary. Commit batches run as one SurrealQL transaction.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::model::*;
use crate::schema::{DraftRow, NoteRow, OperationRow, RecordRow, SessionRow, VersionRow};
use crate::storage_traits::*;

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed [`RecordStore`], [`VersionLog`], [`SessionStore`] and
/// [`LedgerWriter`].
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    pub fn new(handle: &SurrealHandle) -> Self {
        Self {
            db: handle.db().clone(),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let handle = SurrealHandle::setup_db().await?;
        info!("SurrealStore connected (in-memory)");
        Ok(Self::new(&handle))
    }

    /// Create from environment variables.
    ///
    /// Uses the same env-var chain as [`SurrealHandle::setup_from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        let handle = SurrealHandle::setup_from_env().await?;
        Ok(Self::new(&handle))
    }

    // -- private helpers -----------------------------------------------------

    /// Run a query with string bindings and deserialize its first result.
    async fn select<T: DeserializeOwned>(
        &self,
        sql: &'static str,
        binds: Vec<(&'static str, String)>,
    ) -> StorageResult<Vec<T>> {
        let mut query = self.db.query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let mut res = query.await.map_err(backend)?;
        res.take(0).map_err(backend)
    }

    async fn fetch_record_row(&self, rid: &str) -> StorageResult<Option<RecordRow>> {
        let rows: Vec<RecordRow> = self
            .select(
                "SELECT * FROM records WHERE record_id = $rid",
                vec![("rid", rid.to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_session_row(&self, sid: &str) -> StorageResult<SessionRow> {
        let rows: Vec<SessionRow> = self
            .select(
                "SELECT * FROM sessions WHERE session_id = $sid",
                vec![("sid", sid.to_string())],
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::SessionNotFound {
                session_id: sid.to_string(),
            })
    }

    async fn fetch_operation_row(
        &self,
        sid: &str,
        sequence: u64,
    ) -> StorageResult<Option<OperationRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM session_operations WHERE session_id = $sid AND sequence = $seq")
            .bind(("sid", sid.to_string()))
            .bind(("seq", sequence))
            .await
            .map_err(backend)?;
        let rows: Vec<OperationRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_draft_row(&self, sid: &str, rid: &str) -> StorageResult<Option<DraftRow>> {
        let rows: Vec<DraftRow> = self
            .select(
                "SELECT * FROM session_drafts WHERE session_id = $sid AND record_id = $rid",
                vec![("sid", sid.to_string()), ("rid", rid.to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RecordStore for SurrealStore {
    async fn insert_record(&self, record: &Record) -> StorageResult<()> {
        if self.fetch_record_row(record.id.as_str()).await?.is_some() {
            return Err(StorageError::DuplicateRecord {
                record_id: record.id.0.clone(),
            });
        }
        debug!(record_id = %record.id, "inserting record");
        let _created: Option<RecordRow> = self
            .db
            .create("records")
            .content(RecordRow::from_record(record)?)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_record(&self, record_id: &RecordId) -> StorageResult<Record> {
        self.find_record(record_id)
            .await?
            .ok_or_else(|| StorageError::RecordNotFound {
                record_id: record_id.0.clone(),
            })
    }

    async fn find_record(&self, record_id: &RecordId) -> StorageResult<Option<Record>> {
        self.fetch_record_row(record_id.as_str())
            .await?
            .map(RecordRow::into_record)
            .transpose()
    }

    async fn update_record(&self, record: &Record, expected_version: u64) -> StorageResult<()> {
        let existing = self
            .fetch_record_row(record.id.as_str())
            .await?
            .ok_or_else(|| StorageError::RecordNotFound {
                record_id: record.id.0.clone(),
            })?;
        if existing.version != expected_version {
            return Err(StorageError::VersionMismatch {
                record_id: record.id.0.clone(),
                expected: expected_version,
                actual: existing.version,
            });
        }

        let mut row = RecordRow::from_record(record)?;
        row.id = existing.id;
        let mut res = self
            .db
            .query("UPDATE records CONTENT $row WHERE record_id = $rid AND version = $expected")
            .bind(("row", row))
            .bind(("rid", record.id.0.clone()))
            .bind(("expected", expected_version))
            .await
            .map_err(backend)?;
        let updated: Vec<RecordRow> = res.take(0).map_err(backend)?;

        if updated.is_empty() {
            // Lost a race between the read above and the conditional update.
            let actual = self
                .fetch_record_row(record.id.as_str())
                .await?
                .map(|r| r.version)
                .unwrap_or_default();
            return Err(StorageError::VersionMismatch {
                record_id: record.id.0.clone(),
                expected: expected_version,
                actual,
            });
        }
        Ok(())
    }

    async fn delete_record(&self, record_id: &RecordId) -> StorageResult<()> {
        self.db
            .query("DELETE records WHERE record_id = $rid")
            .bind(("rid", record_id.0.clone()))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_records(
        &self,
        workspace_id: &WorkspaceId,
        include_deleted: bool,
    ) -> StorageResult<Vec<Record>> {
        let sql = if include_deleted {
            "SELECT * FROM records WHERE workspace_id = $ws ORDER BY created_at ASC"
        } else {
            "SELECT * FROM records WHERE workspace_id = $ws AND deleted = false ORDER BY created_at ASC"
        };
        let rows: Vec<RecordRow> = self
            .select(sql, vec![("ws", workspace_id.0.clone())])
            .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }
}

// ---------------------------------------------------------------------------
// VersionLog
// ---------------------------------------------------------------------------

#[async_trait]
impl VersionLog for SurrealStore {
    async fn append(&self, entry: &VersionEntry) -> StorageResult<()> {
        match self.get_version(&entry.record_id, entry.version).await {
            Ok(_) => {
                return Err(StorageError::DuplicateVersion {
                    record_id: entry.record_id.0.clone(),
                    version: entry.version,
                })
            }
            Err(StorageError::VersionNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        debug!(record_id = %entry.record_id, version = entry.version, "appending version");
        let _created: Option<VersionRow> = self
            .db
            .create("record_versions")
            .content(VersionRow::from_entry(entry))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_version(
        &self,
        record_id: &RecordId,
        version: u64,
    ) -> StorageResult<VersionEntry> {
        let mut res = self
            .db
            .query("SELECT * FROM record_versions WHERE record_id = $rid AND version = $v")
            .bind(("rid", record_id.0.clone()))
            .bind(("v", version))
            .await
            .map_err(backend)?;
        let rows: Vec<VersionRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::VersionNotFound {
                record_id: record_id.0.clone(),
                version,
            })?
            .into_entry()
    }

    async fn get_entry(&self, entry_id: &VersionEntryId) -> StorageResult<VersionEntry> {
        let rows: Vec<VersionRow> = self
            .select(
                "SELECT * FROM record_versions WHERE entry_id = $eid",
                vec![("eid", entry_id.0.clone())],
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::VersionEntryNotFound {
                entry_id: entry_id.0.clone(),
            })?
            .into_entry()
    }

    async fn history(&self, record_id: &RecordId) -> StorageResult<Vec<VersionEntry>> {
        let rows: Vec<VersionRow> = self
            .select(
                "SELECT * FROM record_versions WHERE record_id = $rid ORDER BY version ASC",
                vec![("rid", record_id.0.clone())],
            )
            .await?;
        rows.into_iter().map(VersionRow::into_entry).collect()
    }

    async fn workspace_entries(
        &self,
        workspace_id: &WorkspaceId,
    ) -> StorageResult<Vec<VersionEntry>> {
        let rows: Vec<VersionRow> = self
            .select(
                "SELECT * FROM record_versions WHERE workspace_id = $ws ORDER BY changed_at ASC, version ASC",
                vec![("ws", workspace_id.0.clone())],
            )
            .await?;
        rows.into_iter().map(VersionRow::into_entry).collect()
    }

    async fn clear_history(&self, record_id: &RecordId) -> StorageResult<u64> {
        let removed: Vec<VersionRow> = self
            .select(
                "DELETE record_versions WHERE record_id = $rid RETURN BEFORE",
                vec![("rid", record_id.0.clone())],
            )
            .await?;
        Ok(removed.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

#[async_trait]
impl SessionStore for SurrealStore {
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()> {
        match self.fetch_session_row(session.id.as_str()).await {
            Ok(_) => {
                return Err(StorageError::DuplicateSession {
                    session_id: session.id.0.clone(),
                })
            }
            Err(StorageError::SessionNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        debug!(session_id = %session.id, "creating session");
        let _created: Option<SessionRow> = self
            .db
            .create("sessions")
            .content(SessionRow::from_session(session))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord> {
        self.fetch_session_row(session_id.as_str())
            .await?
            .into_session()
    }

    async fn save_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let existing = self.fetch_session_row(session.id.as_str()).await?;
        let mut row = SessionRow::from_session(session);
        row.id = existing.id;
        self.db
            .query("UPDATE sessions CONTENT $row WHERE session_id = $sid")
            .bind(("row", row))
            .bind(("sid", session.id.0.clone()))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_sessions(
        &self,
        workspace_id: &WorkspaceId,
        status: Option<SessionStatus>,
        owner_id: Option<&str>,
    ) -> StorageResult<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = self
            .select(
                "SELECT * FROM sessions WHERE workspace_id = $ws ORDER BY created_at DESC",
                vec![("ws", workspace_id.0.clone())],
            )
            .await?;
        let sessions = rows
            .into_iter()
            .map(SessionRow::into_session)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(sessions
            .into_iter()
            .filter(|s| status.map_or(true, |st| s.status == st))
            .filter(|s| owner_id.map_or(true, |o| s.owner.id == o))
            .collect())
    }

    async fn append_operation(&self, operation: &Operation) -> StorageResult<()> {
        self.fetch_session_row(operation.session_id.as_str()).await?;
        if self
            .fetch_operation_row(operation.session_id.as_str(), operation.sequence)
            .await?
            .is_some()
        {
            return Err(StorageError::DuplicateOperation {
                session_id: operation.session_id.0.clone(),
                sequence: operation.sequence,
            });
        }
        let _created: Option<OperationRow> = self
            .db
            .create("session_operations")
            .content(OperationRow::from_operation(operation))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn save_operation(&self, operation: &Operation) -> StorageResult<()> {
        let existing = self
            .fetch_operation_row(operation.session_id.as_str(), operation.sequence)
            .await?
            .ok_or_else(|| StorageError::OperationNotFound {
                session_id: operation.session_id.0.clone(),
                sequence: operation.sequence,
            })?;
        let mut row = OperationRow::from_operation(operation);
        row.id = existing.id;
        self.db
            .query("UPDATE session_operations CONTENT $row WHERE session_id = $sid AND sequence = $seq")
            .bind(("row", row))
            .bind(("sid", operation.session_id.0.clone()))
            .bind(("seq", operation.sequence))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn operations(&self, session_id: &SessionId) -> StorageResult<Vec<Operation>> {
        self.fetch_session_row(session_id.as_str()).await?;
        let rows: Vec<OperationRow> = self
            .select(
                "SELECT * FROM session_operations WHERE session_id = $sid ORDER BY sequence ASC",
                vec![("sid", session_id.0.clone())],
            )
            .await?;
        rows.into_iter().map(OperationRow::into_operation).collect()
    }

    async fn put_overlay(&self, overlay: &DraftOverlay) -> StorageResult<()> {
        self.fetch_session_row(overlay.session_id.as_str()).await?;
        let mut row = DraftRow::from_overlay(overlay);
        match self
            .fetch_draft_row(overlay.session_id.as_str(), overlay.record_id.as_str())
            .await?
        {
            Some(existing) => {
                row.id = existing.id;
                self.db
                    .query("UPDATE session_drafts CONTENT $row WHERE session_id = $sid AND record_id = $rid")
                    .bind(("row", row))
                    .bind(("sid", overlay.session_id.0.clone()))
                    .bind(("rid", overlay.record_id.0.clone()))
                    .await
                    .map_err(backend)?;
            }
            None => {
                let _created: Option<DraftRow> = self
                    .db
                    .create("session_drafts")
                    .content(row)
                    .await
                    .map_err(backend)?;
            }
        }
        Ok(())
    }

    async fn get_overlay(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
    ) -> StorageResult<Option<DraftOverlay>> {
        self.fetch_session_row(session_id.as_str()).await?;
        Ok(self
            .fetch_draft_row(session_id.as_str(), record_id.as_str())
            .await?
            .map(DraftRow::into_overlay))
    }

    async fn overlays(&self, session_id: &SessionId) -> StorageResult<Vec<DraftOverlay>> {
        self.fetch_session_row(session_id.as_str()).await?;
        let rows: Vec<DraftRow> = self
            .select(
                "SELECT * FROM session_drafts WHERE session_id = $sid ORDER BY locked_at ASC",
                vec![("sid", session_id.0.clone())],
            )
            .await?;
        Ok(rows.into_iter().map(DraftRow::into_overlay).collect())
    }

    async fn clear_overlays(&self, session_id: &SessionId) -> StorageResult<()> {
        self.fetch_session_row(session_id.as_str()).await?;
        self.db
            .query("DELETE session_drafts WHERE session_id = $sid")
            .bind(("sid", session_id.0.clone()))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn append_note(&self, note: &SessionNote) -> StorageResult<()> {
        self.fetch_session_row(note.session_id.as_str()).await?;
        let _created: Option<NoteRow> = self
            .db
            .create("session_notes")
            .content(NoteRow::from_note(note))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn notes(&self, session_id: &SessionId) -> StorageResult<Vec<SessionNote>> {
        self.fetch_session_row(session_id.as_str()).await?;
        let rows: Vec<NoteRow> = self
            .select(
                "SELECT * FROM session_notes WHERE session_id = $sid ORDER BY sequence ASC",
                vec![("sid", session_id.0.clone())],
            )
            .await?;
        rows.into_iter().map(NoteRow::into_note).collect()
    }
}

// ---------------------------------------------------------------------------
// LedgerWriter
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerWriter for SurrealStore {
    async fn apply_batch(&self, batch: &CommitBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Check every write up front so callers get a typed error.
        let mut rows = Vec::with_capacity(batch.writes.len());
        for write in &batch.writes {
            let existing = self
                .fetch_record_row(write.record.id.as_str())
                .await?
                .ok_or_else(|| StorageError::RecordNotFound {
                    record_id: write.record.id.0.clone(),
                })?;
            if existing.version != write.expected_version {
                return Err(StorageError::VersionMismatch {
                    record_id: write.record.id.0.clone(),
                    expected: write.expected_version,
                    actual: existing.version,
                });
            }
            match self
                .get_version(&write.entry.record_id, write.entry.version)
                .await
            {
                Ok(_) => {
                    return Err(StorageError::DuplicateVersion {
                        record_id: write.entry.record_id.0.clone(),
                        version: write.entry.version,
                    })
                }
                Err(StorageError::VersionNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
            let mut row = RecordRow::from_record(&write.record)?;
            row.id = existing.id;
            rows.push(row);
        }

        // The guarded UPDATE throws if another writer got in between,
        // cancelling the whole transaction.
        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for i in 0..rows.len() {
            sql.push_str(&format!(
                "LET $updated{i} = (UPDATE records CONTENT $row{i} \
                 WHERE record_id = $rid{i} AND version = $expected{i});\n\
                 IF array::len($updated{i}) = 0 {{ THROW \"record changed during commit\" }};\n\
                 CREATE record_versions CONTENT $entry{i};\n"
            ));
        }
        for i in 0..batch.removals.len() {
            sql.push_str(&format!("DELETE records WHERE record_id = $removed{i};\n"));
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut query = self.db.query(sql);
        for (i, (write, row)) in batch.writes.iter().zip(rows).enumerate() {
            query = query
                .bind((format!("row{i}"), row))
                .bind((format!("rid{i}"), write.record.id.0.clone()))
                .bind((format!("expected{i}"), write.expected_version))
                .bind((format!("entry{i}"), VersionRow::from_entry(&write.entry)));
        }
        for (i, record_id) in batch.removals.iter().enumerate() {
            query = query.bind((format!("removed{i}"), record_id.0.clone()));
        }

        debug!(
            writes = batch.writes.len(),
            removals = batch.removals.len(),
            "applying commit batch"
        );
        query
            .await
            .map_err(backend)?
            .check()
            .map_err(|e| StorageError::Backend(format!("commit batch rolled back: {e}")))?;
        Ok(())
    }
}
