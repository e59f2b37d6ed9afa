//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRecordStore`, `MemoryVersionLog` and `MemorySessionStore`
//! that satisfy the trait contracts without any external dependencies, plus
//! `MemoryBackend` bundling all three and applying commit batches atomically.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryRecordStore
// ---------------------------------------------------------------------------

/// In-memory record store backed by a `HashMap<record_id, Record>`.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_record(&self, record: &Record) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(record.id.as_str()) {
            return Err(StorageError::DuplicateRecord {
                record_id: record.id.0.clone(),
            });
        }
        records.insert(record.id.0.clone(), record.clone());
        Ok(())
    }

    async fn get_record(&self, record_id: &RecordId) -> StorageResult<Record> {
        let records = self.records.lock().unwrap();
        records
            .get(record_id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::RecordNotFound {
                record_id: record_id.0.clone(),
            })
    }

    async fn find_record(&self, record_id: &RecordId) -> StorageResult<Option<Record>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(record_id.as_str()).cloned())
    }

    async fn update_record(&self, record: &Record, expected_version: u64) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        let stored =
            records
                .get_mut(record.id.as_str())
                .ok_or_else(|| StorageError::RecordNotFound {
                    record_id: record.id.0.clone(),
                })?;
        if stored.version != expected_version {
            return Err(StorageError::VersionMismatch {
                record_id: record.id.0.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        *stored = record.clone();
        Ok(())
    }

    async fn delete_record(&self, record_id: &RecordId) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        records.remove(record_id.as_str());
        Ok(())
    }

    async fn list_records(
        &self,
        workspace_id: &WorkspaceId,
        include_deleted: bool,
    ) -> StorageResult<Vec<Record>> {
        let records = self.records.lock().unwrap();
        let mut out: Vec<Record> = records
            .values()
            .filter(|r| &r.workspace_id == workspace_id)
            .filter(|r| include_deleted || !r.is_deleted())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemoryVersionLog
// ---------------------------------------------------------------------------

/// In-memory version log keyed by record id, then version.
#[derive(Debug, Default)]
pub struct MemoryVersionLog {
    entries: Mutex<HashMap<String, BTreeMap<u64, VersionEntry>>>,
}

impl MemoryVersionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionLog for MemoryVersionLog {
    async fn append(&self, entry: &VersionEntry) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let history = entries.entry(entry.record_id.0.clone()).or_default();
        if history.contains_key(&entry.version) {
            return Err(StorageError::DuplicateVersion {
                record_id: entry.record_id.0.clone(),
                version: entry.version,
            });
        }
        history.insert(entry.version, entry.clone());
        Ok(())
    }

    async fn get_version(
        &self,
        record_id: &RecordId,
        version: u64,
    ) -> StorageResult<VersionEntry> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(record_id.as_str())
            .and_then(|h| h.get(&version))
            .cloned()
            .ok_or_else(|| StorageError::VersionNotFound {
                record_id: record_id.0.clone(),
                version,
            })
    }

    async fn get_entry(&self, entry_id: &VersionEntryId) -> StorageResult<VersionEntry> {
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .flat_map(|h| h.values())
            .find(|e| &e.id == entry_id)
            .cloned()
            .ok_or_else(|| StorageError::VersionEntryNotFound {
                entry_id: entry_id.0.clone(),
            })
    }

    async fn history(&self, record_id: &RecordId) -> StorageResult<Vec<VersionEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(record_id.as_str())
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn workspace_entries(
        &self,
        workspace_id: &WorkspaceId,
    ) -> StorageResult<Vec<VersionEntry>> {
        let entries = self.entries.lock().unwrap();
        let mut out: Vec<VersionEntry> = entries
            .values()
            .flat_map(|h| h.values())
            .filter(|e| &e.workspace_id == workspace_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.changed_at.cmp(&b.changed_at).then(a.version.cmp(&b.version)));
        Ok(out)
    }

    async fn clear_history(&self, record_id: &RecordId) -> StorageResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        Ok(entries
            .remove(record_id.as_str())
            .map(|h| h.len() as u64)
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// MemorySessionStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SessionState {
    record: SessionRecord,
    operations: BTreeMap<u64, Operation>,
    overlays: HashMap<String, DraftOverlay>,
    notes: Vec<SessionNote>,
}

/// In-memory session store backed by a `HashMap<session_id, SessionState>`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn session_not_found(session_id: &SessionId) -> StorageError {
    StorageError::SessionNotFound {
        session_id: session_id.0.clone(),
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(session.id.as_str()) {
            return Err(StorageError::DuplicateSession {
                session_id: session.id.0.clone(),
            });
        }
        sessions.insert(
            session.id.0.clone(),
            SessionState {
                record: session.clone(),
                operations: BTreeMap::new(),
                overlays: HashMap::new(),
                notes: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id.as_str())
            .map(|s| s.record.clone())
            .ok_or_else(|| session_not_found(session_id))
    }

    async fn save_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get_mut(session.id.as_str())
            .ok_or_else(|| session_not_found(&session.id))?;
        state.record = session.clone();
        Ok(())
    }

    async fn list_sessions(
        &self,
        workspace_id: &WorkspaceId,
        status: Option<SessionStatus>,
        owner_id: Option<&str>,
    ) -> StorageResult<Vec<SessionRecord>> {
        let sessions = self.sessions.lock().unwrap();
        let mut out: Vec<SessionRecord> = sessions
            .values()
            .map(|s| &s.record)
            .filter(|s| &s.workspace_id == workspace_id)
            .filter(|s| status.map_or(true, |st| s.status == st))
            .filter(|s| owner_id.map_or(true, |o| s.owner.id == o))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn append_operation(&self, operation: &Operation) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get_mut(operation.session_id.as_str())
            .ok_or_else(|| session_not_found(&operation.session_id))?;
        if state.operations.contains_key(&operation.sequence) {
            return Err(StorageError::DuplicateOperation {
                session_id: operation.session_id.0.clone(),
                sequence: operation.sequence,
            });
        }
        state
            .operations
            .insert(operation.sequence, operation.clone());
        Ok(())
    }

    async fn save_operation(&self, operation: &Operation) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get_mut(operation.session_id.as_str())
            .ok_or_else(|| session_not_found(&operation.session_id))?;
        let stored = state.operations.get_mut(&operation.sequence).ok_or_else(|| {
            StorageError::OperationNotFound {
                session_id: operation.session_id.0.clone(),
                sequence: operation.sequence,
            }
        })?;
        *stored = operation.clone();
        Ok(())
    }

    async fn operations(&self, session_id: &SessionId) -> StorageResult<Vec<Operation>> {
        let sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get(session_id.as_str())
            .ok_or_else(|| session_not_found(session_id))?;
        Ok(state.operations.values().cloned().collect())
    }

    async fn put_overlay(&self, overlay: &DraftOverlay) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get_mut(overlay.session_id.as_str())
            .ok_or_else(|| session_not_found(&overlay.session_id))?;
        state
            .overlays
            .insert(overlay.record_id.0.clone(), overlay.clone());
        Ok(())
    }

    async fn get_overlay(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
    ) -> StorageResult<Option<DraftOverlay>> {
        let sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get(session_id.as_str())
            .ok_or_else(|| session_not_found(session_id))?;
        Ok(state.overlays.get(record_id.as_str()).cloned())
    }

    async fn overlays(&self, session_id: &SessionId) -> StorageResult<Vec<DraftOverlay>> {
        let sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get(session_id.as_str())
            .ok_or_else(|| session_not_found(session_id))?;
        let mut out: Vec<DraftOverlay> = state.overlays.values().cloned().collect();
        out.sort_by(|a, b| a.locked_at.cmp(&b.locked_at).then(a.record_id.cmp(&b.record_id)));
        Ok(out)
    }

    async fn clear_overlays(&self, session_id: &SessionId) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get_mut(session_id.as_str())
            .ok_or_else(|| session_not_found(session_id))?;
        state.overlays.clear();
        Ok(())
    }

    async fn append_note(&self, note: &SessionNote) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get_mut(note.session_id.as_str())
            .ok_or_else(|| session_not_found(&note.session_id))?;
        state.notes.push(note.clone());
        Ok(())
    }

    async fn notes(&self, session_id: &SessionId) -> StorageResult<Vec<SessionNote>> {
        let sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get(session_id.as_str())
            .ok_or_else(|| session_not_found(session_id))?;
        let mut out = state.notes.clone();
        out.sort_by_key(|n| n.sequence);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// All three in-memory stores behind one value.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pub records: MemoryRecordStore,
    pub versions: MemoryVersionLog,
    pub sessions: MemorySessionStore,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn insert_record(&self, record: &Record) -> StorageResult<()> {
        self.records.insert_record(record).await
    }

    async fn get_record(&self, record_id: &RecordId) -> StorageResult<Record> {
        self.records.get_record(record_id).await
    }

    async fn find_record(&self, record_id: &RecordId) -> StorageResult<Option<Record>> {
        self.records.find_record(record_id).await
    }

    async fn update_record(&self, record: &Record, expected_version: u64) -> StorageResult<()> {
        self.records.update_record(record, expected_version).await
    }

    async fn delete_record(&self, record_id: &RecordId) -> StorageResult<()> {
        self.records.delete_record(record_id).await
    }

    async fn list_records(
        &self,
        workspace_id: &WorkspaceId,
        include_deleted: bool,
    ) -> StorageResult<Vec<Record>> {
        self.records.list_records(workspace_id, include_deleted).await
    }
}

#[async_trait]
impl VersionLog for MemoryBackend {
    async fn append(&self, entry: &VersionEntry) -> StorageResult<()> {
        self.versions.append(entry).await
    }

    async fn get_version(
        &self,
        record_id: &RecordId,
        version: u64,
    ) -> StorageResult<VersionEntry> {
        self.versions.get_version(record_id, version).await
    }

    async fn get_entry(&self, entry_id: &VersionEntryId) -> StorageResult<VersionEntry> {
        self.versions.get_entry(entry_id).await
    }

    async fn history(&self, record_id: &RecordId) -> StorageResult<Vec<VersionEntry>> {
        self.versions.history(record_id).await
    }

    async fn workspace_entries(
        &self,
        workspace_id: &WorkspaceId,
    ) -> StorageResult<Vec<VersionEntry>> {
        self.versions.workspace_entries(workspace_id).await
    }

    async fn clear_history(&self, record_id: &RecordId) -> StorageResult<u64> {
        self.versions.clear_history(record_id).await
    }
}

#[async_trait]
impl SessionStore for MemoryBackend {
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()> {
        self.sessions.create_session(session).await
    }

    async fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord> {
        self.sessions.get_session(session_id).await
    }

    async fn save_session(&self, session: &SessionRecord) -> StorageResult<()> {
        self.sessions.save_session(session).await
    }

    async fn list_sessions(
        &self,
        workspace_id: &WorkspaceId,
        status: Option<SessionStatus>,
        owner_id: Option<&str>,
    ) -> StorageResult<Vec<SessionRecord>> {
        self.sessions
            .list_sessions(workspace_id, status, owner_id)
            .await
    }

    async fn append_operation(&self, operation: &Operation) -> StorageResult<()> {
        self.sessions.append_operation(operation).await
    }

    async fn save_operation(&self, operation: &Operation) -> StorageResult<()> {
        self.sessions.save_operation(operation).await
    }

    async fn operations(&self, session_id: &SessionId) -> StorageResult<Vec<Operation>> {
        self.sessions.operations(session_id).await
    }

    async fn put_overlay(&self, overlay: &DraftOverlay) -> StorageResult<()> {
        self.sessions.put_overlay(overlay).await
    }

    async fn get_overlay(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
    ) -> StorageResult<Option<DraftOverlay>> {
        self.sessions.get_overlay(session_id, record_id).await
    }

    async fn overlays(&self, session_id: &SessionId) -> StorageResult<Vec<DraftOverlay>> {
        self.sessions.overlays(session_id).await
    }

    async fn clear_overlays(&self, session_id: &SessionId) -> StorageResult<()> {
        self.sessions.clear_overlays(session_id).await
    }

    async fn append_note(&self, note: &SessionNote) -> StorageResult<()> {
        self.sessions.append_note(note).await
    }

    async fn notes(&self, session_id: &SessionId) -> StorageResult<Vec<SessionNote>> {
        self.sessions.notes(session_id).await
    }
}

#[async_trait]
impl LedgerWriter for MemoryBackend {
    async fn apply_batch(&self, batch: &CommitBatch) -> StorageResult<()> {
        // Records before entries, the only order both locks are taken in.
        let mut records = self.records.records.lock().unwrap();
        let mut entries = self.versions.entries.lock().unwrap();

        for write in &batch.writes {
            let id = write.record.id.as_str();
            let stored = records
                .get(id)
                .ok_or_else(|| StorageError::RecordNotFound {
                    record_id: id.to_string(),
                })?;
            if stored.version != write.expected_version {
                return Err(StorageError::VersionMismatch {
                    record_id: id.to_string(),
                    expected: write.expected_version,
                    actual: stored.version,
                });
            }
            let taken = entries
                .get(write.entry.record_id.as_str())
                .is_some_and(|h| h.contains_key(&write.entry.version));
            if taken {
                return Err(StorageError::DuplicateVersion {
                    record_id: write.entry.record_id.0.clone(),
                    version: write.entry.version,
                });
            }
        }

        for write in &batch.writes {
            records.insert(write.record.id.0.clone(), write.record.clone());
            entries
                .entry(write.entry.record_id.0.clone())
                .or_default()
                .insert(write.entry.version, write.entry.clone());
        }
        for record_id in &batch.removals {
            records.remove(record_id.as_str());
        }
        Ok(())
    }
}
