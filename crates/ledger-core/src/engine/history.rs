//! Version history: import, audit queries, restore and workspace rollback.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use ledger_state::{
    Actor, Area, ChangeType, CommitBatch, FieldChange, Record, RecordFields, RecordId, Snapshot,
    VersionEntry, VersionEntryId, WorkspaceId,
};

use super::{versioned_write, SessionEngine};
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    pub from_area: Area,
    pub to_area: Area,
}

/// One version entry with what changed relative to the entry before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entry: VersionEntry,
    pub diff: BTreeMap<String, FieldChange>,
    pub transfer: Option<TransferInfo>,
    /// Whether the stored snapshot still matches its digest.
    pub intact: bool,
}

fn snapshot_area(snapshot: &Snapshot) -> Option<Area> {
    snapshot.get("area")?.as_str()?.parse().ok()
}

impl SessionEngine {
    /// Seed a committed record outside any session.
    #[instrument(skip(self, record_fields, actor), fields(actor_id = %actor.id))]
    pub async fn import_record(
        &self,
        workspace_id: &WorkspaceId,
        record_fields: RecordFields,
        actor: &Actor,
    ) -> Result<Record> {
        let mut record = Record::new(workspace_id.clone(), record_fields, actor);
        record.version = 1;
        self.records.insert_record(&record).await?;
        let entry = VersionEntry::capture(
            &record,
            ChangeType::Create,
            actor,
            None,
            None,
            record.created_at,
        );
        self.versions.append(&entry).await?;
        debug!(record_id = %record.id, "record imported");
        Ok(record)
    }

    /// The record's version entries, oldest first, each diffed against its
    /// predecessor.
    pub async fn record_history(&self, record_id: &RecordId) -> Result<Vec<HistoryEntry>> {
        let entries = self.versions.history(record_id).await?;
        if entries.is_empty() {
            // Distinguish "no such record" from "history cleared".
            self.records.get_record(record_id).await?;
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(entries.len());
        let mut previous: Option<&Snapshot> = None;
        for entry in &entries {
            let diff = previous
                .map(|prev| prev.diff(&entry.snapshot))
                .unwrap_or_default();
            let transfer = match (entry.change_type, previous) {
                (ChangeType::Transfer, Some(prev)) => {
                    match (snapshot_area(prev), snapshot_area(&entry.snapshot)) {
                        (Some(from_area), Some(to_area)) => Some(TransferInfo { from_area, to_area }),
                        _ => None,
                    }
                }
                _ => None,
            };
            out.push(HistoryEntry {
                entry: entry.clone(),
                diff,
                transfer,
                intact: entry.verify(),
            });
            previous = Some(&entry.snapshot);
        }
        Ok(out)
    }

    /// Re-apply the snapshot of `version` as a new version.
    #[instrument(skip(self, actor, note), fields(actor_id = %actor.id))]
    pub async fn restore_version(
        &self,
        record_id: &RecordId,
        version: u64,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Record> {
        let _gate = self.commit_gate.lock().await;
        let target = self.versions.get_version(record_id, version).await?;
        if !target.verify() {
            return Err(EngineError::Validation(format!(
                "version {version} of record {record_id} fails its integrity check"
            )));
        }

        let mut record = self.records.get_record(record_id).await?;
        let expected = record.version;
        let now = Utc::now();
        let skipped = record.apply_snapshot(&target.snapshot, actor, now);
        if !skipped.is_empty() {
            warn!(record_id = %record_id, version, ?skipped, "restored snapshot keys skipped");
        }
        record.updated_by = Some(actor.clone());
        record.updated_at = now;

        let note = note.or_else(|| Some(format!("Restored from version {version}")));
        let write = versioned_write(record, expected, |r| {
            VersionEntry::capture(r, ChangeType::Restore, actor, None, note, now)
        });
        self.writer
            .apply_batch(&CommitBatch {
                writes: vec![write.clone()],
                removals: Vec::new(),
            })
            .await?;
        let record = write.record;

        obs::emit_record_restored(record_id.as_str(), version, record.version);
        METRICS.inc_restores();
        Ok(record)
    }

    /// Return every record of the workspace to its state at the time of the
    /// marker entry, as one batch. Returns the records that were changed.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn rollback_to_version(
        &self,
        workspace_id: &WorkspaceId,
        marker_id: &VersionEntryId,
        actor: &Actor,
    ) -> Result<Vec<Record>> {
        let _gate = self.commit_gate.lock().await;
        let marker = self.versions.get_entry(marker_id).await?;
        if marker.workspace_id != *workspace_id {
            return Err(EngineError::NotFound(format!(
                "version entry {marker_id} in workspace {workspace_id}"
            )));
        }
        let cutoff = marker.changed_at;

        // Most recently changed first, each record once.
        let mut later = self.versions.workspace_entries(workspace_id).await?;
        later.retain(|e| e.changed_at > cutoff);
        later.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
        let mut seen = HashSet::new();
        let affected: Vec<RecordId> = later
            .into_iter()
            .filter(|e| seen.insert(e.record_id.clone()))
            .map(|e| e.record_id)
            .collect();

        let now = Utc::now();
        let mut batch = CommitBatch::default();
        for record_id in affected {
            let Some(mut record) = self.records.find_record(&record_id).await? else {
                debug!(record_id = %record_id, "record gone, skipped");
                continue;
            };
            let history = self.versions.history(&record_id).await?;

            let prior = history.iter().rev().find(|e| e.changed_at <= cutoff);
            let (snapshot, note) = match prior {
                Some(prior) => (
                    prior.snapshot.clone(),
                    format!("Rolled back to version {}", prior.version),
                ),
                None => match history.first() {
                    Some(first)
                        if first.change_type == ChangeType::Create
                            && first.changed_at > cutoff =>
                    {
                        if record.is_deleted() {
                            continue;
                        }
                        (
                            record.snapshot().with_deleted(true),
                            "Rolled back before creation".to_string(),
                        )
                    }
                    _ => {
                        debug!(record_id = %record_id, "history predates marker, untouched");
                        continue;
                    }
                },
            };

            let expected = record.version;
            let skipped = record.apply_snapshot(&snapshot, actor, now);
            if !skipped.is_empty() {
                warn!(record_id = %record_id, ?skipped, "rollback snapshot keys skipped");
            }
            record.updated_by = Some(actor.clone());
            record.updated_at = now;
            batch.writes.push(versioned_write(record, expected, |r| {
                VersionEntry::capture(r, ChangeType::Rollback, actor, None, Some(note), now)
            }));
        }
        self.writer.apply_batch(&batch).await?;
        let changed: Vec<Record> = batch.writes.into_iter().map(|w| w.record).collect();

        obs::emit_workspace_rolled_back(workspace_id.as_str(), marker_id.as_str(), changed.len());
        METRICS.inc_rollbacks();
        Ok(changed)
    }

    /// Administrative removal of a record's version history. The record
    /// itself is left as it is.
    pub async fn clear_history(&self, record_id: &RecordId, actor: &Actor) -> Result<u64> {
        self.records.get_record(record_id).await?;
        let removed = self.versions.clear_history(record_id).await?;
        info!(
            record_id = %record_id,
            actor_id = %actor.id,
            removed,
            "version history cleared"
        );
        Ok(removed)
    }
}
