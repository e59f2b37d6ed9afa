//! Persisted data model.
//!
//! - `Record`: a financial entry with a monotonically increasing `version`
//! - `VersionEntry`: immutable snapshot of a record at one committed version
//! - `SessionRecord`: a bounded unit of work owned by one actor
//! - `DraftOverlay`: a session's pending value for one record
//! - `Operation`: one logged edit in a session's timeline
//! - `SessionNote`: the session's system/user message log

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::{ContentDigest, Snapshot, DELETED_KEY};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier of a financial record
    RecordId
);
string_id!(
    /// Unique identifier of a workspace (tenant)
    WorkspaceId
);
string_id!(
    /// Unique identifier of a working session
    SessionId
);
string_id!(
    /// Unique identifier of a version entry
    VersionEntryId
);

/// A pre-validated identity supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Placeholder used when the last modifier of a record is not known.
    pub fn unknown() -> Self {
        Self::new("unknown", "Unknown User")
    }
}

/// Failure to parse one of the string-encoded enums below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Cashflow area a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Budget,
    Prospect,
    Orders,
    Actual,
}

string_enum!(Area, "area", {
    Budget => "budget",
    Prospect => "prospect",
    Orders => "orders",
    Actual => "actual",
});

/// One move of a record between areas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEntry {
    pub from_area: Area,
    pub to_area: Area,
    pub transferred_at: DateTime<Utc>,
    pub transferred_by: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Typed field values of a financial record.
///
/// Monetary amounts are in minor units (cents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    pub area: Area,
    #[serde(rename = "type")]
    pub kind: String,
    pub account: String,
    pub reference: String,
    #[serde(default)]
    pub note: Option<String>,
    pub date_cashflow: NaiveDate,
    pub date_offer: NaiveDate,
    pub amount: i64,
    #[serde(default)]
    pub vat: i64,
    pub total: i64,
    pub stage: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub next_action: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub bank_account_id: Option<String>,
    #[serde(default)]
    pub project_code: Option<String>,
    #[serde(default)]
    pub transfer_history: Vec<TransferEntry>,
}

/// Rejected field changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl RecordFields {
    fn to_map(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Field values as a snapshot (without the soft-delete flag).
    pub fn to_snapshot(&self) -> Snapshot {
        self.to_map().into_iter().collect()
    }

    /// Apply `changes` strictly: unknown keys and values that do not fit the
    /// field type are rejected.
    pub fn try_apply(&self, changes: &Snapshot) -> Result<RecordFields, FieldError> {
        let mut map = self.to_map();
        for (key, value) in changes.iter() {
            if !map.contains_key(key) {
                return Err(FieldError::UnknownField(key.clone()));
            }
            let mut trial = map.clone();
            trial.insert(key.clone(), value.clone());
            if let Err(e) = serde_json::from_value::<RecordFields>(Value::Object(trial)) {
                return Err(FieldError::InvalidValue {
                    field: key.clone(),
                    reason: e.to_string(),
                });
            }
            map.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(map)).map_err(|e| FieldError::InvalidValue {
            field: "*".to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply a stored snapshot leniently.
    ///
    /// Unknown keys are ignored and keys whose values no longer fit are
    /// skipped. Returns the resulting fields and the skipped keys.
    pub fn apply_lenient(&self, snapshot: &Snapshot) -> (RecordFields, Vec<String>) {
        let base = self.to_map();
        let mut skipped = Vec::new();

        let mut merged = base.clone();
        for (key, value) in snapshot.iter() {
            if key == DELETED_KEY {
                continue;
            }
            if merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            } else {
                skipped.push(key.clone());
            }
        }
        if let Ok(fields) = serde_json::from_value::<RecordFields>(Value::Object(merged)) {
            return (fields, skipped);
        }

        // Slow path: keep each key only if it still deserializes.
        let mut accepted = base;
        for (key, value) in snapshot.iter() {
            if key == DELETED_KEY || !accepted.contains_key(key) {
                continue;
            }
            let mut trial = accepted.clone();
            trial.insert(key.clone(), value.clone());
            if serde_json::from_value::<RecordFields>(Value::Object(trial.clone())).is_ok() {
                accepted = trial;
            } else {
                skipped.push(key.clone());
            }
        }
        let fields = serde_json::from_value(Value::Object(accepted)).unwrap_or_else(|_| self.clone());
        (fields, skipped)
    }
}

/// A financial record as held by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub workspace_id: WorkspaceId,
    pub fields: RecordFields,
    /// 0 while the record has never been committed, then +1 per commit.
    pub version: u64,
    pub created_by: Option<Actor>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Actor>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
}

impl Record {
    /// A new, never-committed record (`version == 0`).
    pub fn new(workspace_id: WorkspaceId, fields: RecordFields, actor: &Actor) -> Self {
        let now = Utc::now();
        Record {
            id: RecordId::new(),
            workspace_id,
            fields,
            version: 0,
            created_by: Some(actor.clone()),
            created_at: now,
            updated_by: Some(actor.clone()),
            updated_at: now,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Created inside a session that has not committed yet.
    pub fn is_pending(&self) -> bool {
        self.version == 0
    }

    pub fn area(&self) -> Area {
        self.fields.area
    }

    /// Field values plus the soft-delete flag.
    pub fn snapshot(&self) -> Snapshot {
        self.fields.to_snapshot().with_deleted(self.is_deleted())
    }

    /// Overwrite fields and deletion state from a snapshot.
    ///
    /// Identity, workspace and version are never taken from a snapshot.
    /// Returns the snapshot keys that could not be applied.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let (fields, skipped) = self.fields.apply_lenient(snapshot);
        self.fields = fields;
        match snapshot.deleted() {
            Some(true) if !self.is_deleted() => {
                self.deleted_at = Some(now);
                self.deleted_by = Some(actor.id.clone());
            }
            Some(false) => {
                self.deleted_at = None;
                self.deleted_by = None;
            }
            _ => {}
        }
        skipped
    }

    /// Copy of this record with `snapshot` applied.
    pub fn with_snapshot(&self, snapshot: &Snapshot, actor: &Actor) -> Record {
        let mut view = self.clone();
        view.apply_snapshot(snapshot, actor, Utc::now());
        view
    }
}

// ---------------------------------------------------------------------------
// Version log
// ---------------------------------------------------------------------------

/// Kind of committed change a version entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Transfer,
    Restore,
    Rollback,
}

string_enum!(ChangeType, "change type", {
    Create => "create",
    Update => "update",
    Delete => "delete",
    Transfer => "transfer",
    Restore => "restore",
    Rollback => "rollback",
});

/// Immutable snapshot of a record at one committed version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: VersionEntryId,
    pub record_id: RecordId,
    pub workspace_id: WorkspaceId,
    pub version: u64,
    pub snapshot: Snapshot,
    pub snapshot_digest: ContentDigest,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<Actor>,
    pub session_id: Option<SessionId>,
    pub change_type: ChangeType,
    pub note: Option<String>,
}

impl VersionEntry {
    /// Capture `record` as it stands (its `version` must already be bumped).
    pub fn capture(
        record: &Record,
        change_type: ChangeType,
        changed_by: &Actor,
        session_id: Option<SessionId>,
        note: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        let snapshot = record.snapshot();
        VersionEntry {
            id: VersionEntryId::new(),
            record_id: record.id.clone(),
            workspace_id: record.workspace_id.clone(),
            version: record.version,
            snapshot_digest: snapshot.digest(),
            snapshot,
            changed_at,
            changed_by: Some(changed_by.clone()),
            session_id,
            change_type,
            note,
        }
    }

    /// Whether the stored snapshot still matches its digest.
    pub fn verify(&self) -> bool {
        self.snapshot.digest() == self.snapshot_digest
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Lifecycle state of a session. `Committed` and `Discarded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Committed,
    Discarded,
}

string_enum!(SessionStatus, "session status", {
    Active => "active",
    Committed => "committed",
    Discarded => "discarded",
});

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// Kind of edit recorded in a session's operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    Transfer,
}

string_enum!(OperationType, "operation type", {
    Create => "create",
    Update => "update",
    Delete => "delete",
    Transfer => "transfer",
});

/// Per-type counts of the session's applied (non-undone) operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesSummary {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub transferred: u64,
}

impl ChangesSummary {
    fn slot(&mut self, op: OperationType) -> &mut u64 {
        match op {
            OperationType::Create => &mut self.created,
            OperationType::Update => &mut self.updated,
            OperationType::Delete => &mut self.deleted,
            OperationType::Transfer => &mut self.transferred,
        }
    }

    pub fn count(&self, op: OperationType) -> u64 {
        match op {
            OperationType::Create => self.created,
            OperationType::Update => self.updated,
            OperationType::Delete => self.deleted,
            OperationType::Transfer => self.transferred,
        }
    }

    pub fn record(&mut self, op: OperationType) {
        *self.slot(op) += 1;
    }

    pub fn retract(&mut self, op: OperationType) {
        let slot = self.slot(op);
        *slot = slot.saturating_sub(1);
    }

    pub fn total(&self) -> u64 {
        self.created + self.updated + self.deleted + self.transferred
    }
}

/// A bounded unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub workspace_id: WorkspaceId,
    pub owner: Actor,
    pub title: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub discarded_at: Option<DateTime<Utc>>,
    pub commit_message: Option<String>,
    pub changes_count: u64,
    pub changes_summary: ChangesSummary,
}

impl SessionRecord {
    pub fn new(workspace_id: WorkspaceId, owner: Actor, title: Option<String>) -> Self {
        let now = Utc::now();
        SessionRecord {
            id: SessionId::new(),
            workspace_id,
            owner,
            title,
            status: SessionStatus::Active,
            created_at: now,
            last_activity: now,
            committed_at: None,
            discarded_at: None,
            commit_message: None,
            changes_count: 0,
            changes_summary: ChangesSummary::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }
}

/// One logged edit within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub session_id: SessionId,
    /// Dense, 1-based, monotonic within the session.
    pub sequence: u64,
    pub operation_type: OperationType,
    pub record_id: RecordId,
    pub area: Area,
    pub before_snapshot: Option<Snapshot>,
    pub after_snapshot: Snapshot,
    pub from_area: Option<Area>,
    pub to_area: Option<Area>,
    pub is_undone: bool,
    pub undone_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A session's pending value for one record, anchored to the record version
/// seen when the session first touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOverlay {
    pub session_id: SessionId,
    pub record_id: RecordId,
    pub draft_snapshot: Snapshot,
    pub base_version: u64,
    pub locked_at: DateTime<Utc>,
}

/// Author of a session note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteRole {
    System,
    User,
}

string_enum!(NoteRole, "note role", {
    System => "system",
    User => "user",
});

/// Entry in a session's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionNote {
    pub session_id: SessionId,
    pub sequence: u64,
    pub role: NoteRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
