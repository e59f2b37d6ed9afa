//! Schema definitions for the ledger's SurrealDB tables
//!
//! Tables:
//! - records: Live financial records
//! - record_versions: Append-only per-record history
//! - sessions: Working sessions
//! - session_operations: Per-session operation log
//! - session_drafts: Per-session draft overlays
//! - session_notes: Per-session message log
//!
//! Rows convert to and from the `model` types at the storage boundary.
//! Enums are stored as their lowercase wire strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::model::*;
use crate::snapshot::{ContentDigest, Snapshot};
use crate::storage_traits::StorageResult;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

fn parse<T>(value: &str) -> StorageResult<T>
where
    T: std::str::FromStr<Err = UnknownVariant>,
{
    value
        .parse()
        .map_err(|e: UnknownVariant| StorageError::Backend(e.to_string()))
}

fn parse_opt<T>(value: Option<String>) -> StorageResult<Option<T>>
where
    T: std::str::FromStr<Err = UnknownVariant>,
{
    value.as_deref().map(parse).transpose()
}

// ---------------------------------------------------------------------------
// records
// ---------------------------------------------------------------------------

/// Live record row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub record_id: String,
    pub workspace_id: String,
    /// `RecordFields` as a JSON object
    pub fields: serde_json::Value,
    pub version: u64,
    pub created_by: Option<Actor>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Actor>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
    /// Mirrors `deleted_at.is_some()` for filtering in queries
    pub deleted: bool,
    #[serde(with = "surreal_datetime_opt")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
}

impl RecordRow {
    pub fn from_record(record: &Record) -> StorageResult<Self> {
        let fields = serde_json::to_value(&record.fields)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(RecordRow {
            id: None,
            record_id: record.id.0.clone(),
            workspace_id: record.workspace_id.0.clone(),
            fields,
            version: record.version,
            created_by: record.created_by.clone(),
            created_at: record.created_at,
            updated_by: record.updated_by.clone(),
            updated_at: record.updated_at,
            deleted: record.is_deleted(),
            deleted_at: record.deleted_at,
            deleted_by: record.deleted_by.clone(),
        })
    }

    pub fn into_record(self) -> StorageResult<Record> {
        let fields = serde_json::from_value(self.fields).map_err(|e| {
            StorageError::Backend(format!("corrupt fields on record {}: {e}", self.record_id))
        })?;
        Ok(Record {
            id: RecordId(self.record_id),
            workspace_id: WorkspaceId(self.workspace_id),
            fields,
            version: self.version,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_by: self.updated_by,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            deleted_by: self.deleted_by,
        })
    }
}

// ---------------------------------------------------------------------------
// record_versions
// ---------------------------------------------------------------------------

/// Version history row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub entry_id: String,
    pub record_id: String,
    pub workspace_id: String,
    pub version: u64,
    pub snapshot: Snapshot,
    pub snapshot_digest: String,
    #[serde(with = "surreal_datetime")]
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<Actor>,
    pub session_id: Option<String>,
    pub change_type: String,
    pub note: Option<String>,
}

impl VersionRow {
    pub fn from_entry(entry: &VersionEntry) -> Self {
        VersionRow {
            id: None,
            entry_id: entry.id.0.clone(),
            record_id: entry.record_id.0.clone(),
            workspace_id: entry.workspace_id.0.clone(),
            version: entry.version,
            snapshot: entry.snapshot.clone(),
            snapshot_digest: entry.snapshot_digest.as_str().to_string(),
            changed_at: entry.changed_at,
            changed_by: entry.changed_by.clone(),
            session_id: entry.session_id.as_ref().map(|s| s.0.clone()),
            change_type: entry.change_type.as_str().to_string(),
            note: entry.note.clone(),
        }
    }

    pub fn into_entry(self) -> StorageResult<VersionEntry> {
        Ok(VersionEntry {
            id: VersionEntryId(self.entry_id),
            record_id: RecordId(self.record_id),
            workspace_id: WorkspaceId(self.workspace_id),
            version: self.version,
            snapshot: self.snapshot,
            snapshot_digest: ContentDigest::try_from(self.snapshot_digest)?,
            changed_at: self.changed_at,
            changed_by: self.changed_by,
            session_id: self.session_id.map(SessionId),
            change_type: parse(&self.change_type)?,
            note: self.note,
        })
    }
}

// ---------------------------------------------------------------------------
// sessions
// ---------------------------------------------------------------------------

/// Session row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub session_id: String,
    pub workspace_id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub title: Option<String>,
    /// active | committed | discarded
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub last_activity: DateTime<Utc>,
    #[serde(with = "surreal_datetime_opt")]
    pub committed_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime_opt")]
    pub discarded_at: Option<DateTime<Utc>>,
    pub commit_message: Option<String>,
    pub changes_count: u64,
    pub changes_summary: ChangesSummary,
}

impl SessionRow {
    pub fn from_session(session: &SessionRecord) -> Self {
        SessionRow {
            id: None,
            session_id: session.id.0.clone(),
            workspace_id: session.workspace_id.0.clone(),
            owner_id: session.owner.id.clone(),
            owner_name: session.owner.name.clone(),
            title: session.title.clone(),
            status: session.status.as_str().to_string(),
            created_at: session.created_at,
            last_activity: session.last_activity,
            committed_at: session.committed_at,
            discarded_at: session.discarded_at,
            commit_message: session.commit_message.clone(),
            changes_count: session.changes_count,
            changes_summary: session.changes_summary,
        }
    }

    pub fn into_session(self) -> StorageResult<SessionRecord> {
        Ok(SessionRecord {
            id: SessionId(self.session_id),
            workspace_id: WorkspaceId(self.workspace_id),
            owner: Actor::new(self.owner_id, self.owner_name),
            title: self.title,
            status: parse(&self.status)?,
            created_at: self.created_at,
            last_activity: self.last_activity,
            committed_at: self.committed_at,
            discarded_at: self.discarded_at,
            commit_message: self.commit_message,
            changes_count: self.changes_count,
            changes_summary: self.changes_summary,
        })
    }
}

// ---------------------------------------------------------------------------
// session_operations
// ---------------------------------------------------------------------------

/// Operation log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub session_id: String,
    pub sequence: u64,
    pub operation_type: String,
    pub record_id: String,
    pub area: String,
    pub before_snapshot: Option<Snapshot>,
    pub after_snapshot: Snapshot,
    pub from_area: Option<String>,
    pub to_area: Option<String>,
    pub is_undone: bool,
    #[serde(with = "surreal_datetime_opt")]
    pub undone_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl OperationRow {
    pub fn from_operation(op: &Operation) -> Self {
        OperationRow {
            id: None,
            session_id: op.session_id.0.clone(),
            sequence: op.sequence,
            operation_type: op.operation_type.as_str().to_string(),
            record_id: op.record_id.0.clone(),
            area: op.area.as_str().to_string(),
            before_snapshot: op.before_snapshot.clone(),
            after_snapshot: op.after_snapshot.clone(),
            from_area: op.from_area.map(|a| a.as_str().to_string()),
            to_area: op.to_area.map(|a| a.as_str().to_string()),
            is_undone: op.is_undone,
            undone_at: op.undone_at,
            created_at: op.created_at,
        }
    }

    pub fn into_operation(self) -> StorageResult<Operation> {
        Ok(Operation {
            session_id: SessionId(self.session_id),
            sequence: self.sequence,
            operation_type: parse(&self.operation_type)?,
            record_id: RecordId(self.record_id),
            area: parse(&self.area)?,
            before_snapshot: self.before_snapshot,
            after_snapshot: self.after_snapshot,
            from_area: parse_opt(self.from_area)?,
            to_area: parse_opt(self.to_area)?,
            is_undone: self.is_undone,
            undone_at: self.undone_at,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// session_drafts
// ---------------------------------------------------------------------------

/// Draft overlay row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub session_id: String,
    pub record_id: String,
    pub draft_snapshot: Snapshot,
    pub base_version: u64,
    #[serde(with = "surreal_datetime")]
    pub locked_at: DateTime<Utc>,
}

impl DraftRow {
    pub fn from_overlay(overlay: &DraftOverlay) -> Self {
        DraftRow {
            id: None,
            session_id: overlay.session_id.0.clone(),
            record_id: overlay.record_id.0.clone(),
            draft_snapshot: overlay.draft_snapshot.clone(),
            base_version: overlay.base_version,
            locked_at: overlay.locked_at,
        }
    }

    pub fn into_overlay(self) -> DraftOverlay {
        DraftOverlay {
            session_id: SessionId(self.session_id),
            record_id: RecordId(self.record_id),
            draft_snapshot: self.draft_snapshot,
            base_version: self.base_version,
            locked_at: self.locked_at,
        }
    }
}

// ---------------------------------------------------------------------------
// session_notes
// ---------------------------------------------------------------------------

/// Session message row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub session_id: String,
    pub sequence: u64,
    /// system | user
    pub role: String,
    pub content: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl NoteRow {
    pub fn from_note(note: &SessionNote) -> Self {
        NoteRow {
            id: None,
            session_id: note.session_id.0.clone(),
            sequence: note.sequence,
            role: note.role.as_str().to_string(),
            content: note.content.clone(),
            created_at: note.created_at,
        }
    }

    pub fn into_note(self) -> StorageResult<SessionNote> {
        Ok(SessionNote {
            session_id: SessionId(self.session_id),
            sequence: self.sequence,
            role: parse(&self.role)?,
            content: self.content,
            created_at: self.created_at,
        })
    }
}
