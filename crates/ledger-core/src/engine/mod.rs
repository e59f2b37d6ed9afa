//! The session engine.
//!
//! `SessionEngine` owns no state of its own beyond a commit gate; every
//! record, version entry, session, overlay, operation and note lives behind
//! the storage traits.
//!
//! Session edits live only in the session's draft overlays. The live record
//! always holds committed values: a session sees its own drafts layered over
//! it, other sessions never do. Undo, redo and discard rewrite overlays
//! only. Records a session creates are stored at version 0 and are visible
//! to that session alone until commit. Commit, restore and rollback bump
//! versions behind the commit gate, each as one
//! [`CommitBatch`](ledger_state::CommitBatch) that storage applies entirely
//! or not at all.

mod commit;
mod discard;
mod draft;
mod history;
mod lifecycle;
mod undo;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use ledger_state::fakes::MemoryBackend;
use ledger_state::{
    DraftOverlay, LedgerWriter, Record, RecordId, RecordStore, SessionId, SessionStore, Snapshot,
    VersionEntry, VersionLog, VersionedWrite,
};

use crate::error::Result;

pub use commit::CommitResult;
pub use discard::DiscardResult;
pub use draft::{Edit, RecordView};
pub use history::{HistoryEntry, TransferInfo};

/// Orchestrates sessions, drafts, undo/redo, commit and history.
pub struct SessionEngine {
    records: Arc<dyn RecordStore>,
    versions: Arc<dyn VersionLog>,
    sessions: Arc<dyn SessionStore>,
    writer: Arc<dyn LedgerWriter>,
    commit_gate: Mutex<()>,
}

impl SessionEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        versions: Arc<dyn VersionLog>,
        sessions: Arc<dyn SessionStore>,
        writer: Arc<dyn LedgerWriter>,
    ) -> Self {
        Self {
            records,
            versions,
            sessions,
            writer,
            commit_gate: Mutex::new(()),
        }
    }

    /// Build an engine whose stores and writer are the same backend.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RecordStore + VersionLog + SessionStore + LedgerWriter + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend.clone(), backend)
    }

    /// Engine over fresh in-memory fakes.
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryBackend::new()))
    }

    // -- shared helpers ------------------------------------------------------

    /// Replace the session's draft of a record. A missing overlay is anchored
    /// to the record's current version.
    async fn set_draft(
        &self,
        session_id: &SessionId,
        record_id: &RecordId,
        snapshot: &Snapshot,
    ) -> Result<()> {
        let overlay = match self.sessions.get_overlay(session_id, record_id).await? {
            Some(mut overlay) => {
                overlay.draft_snapshot = snapshot.clone();
                overlay
            }
            None => {
                let live = self.records.get_record(record_id).await?;
                DraftOverlay {
                    session_id: session_id.clone(),
                    record_id: record_id.clone(),
                    draft_snapshot: snapshot.clone(),
                    base_version: live.version,
                    locked_at: Utc::now(),
                }
            }
        };
        self.sessions.put_overlay(&overlay).await?;
        Ok(())
    }
}

/// Move `record` from `expected_version` to the next version, paired with the
/// entry that records it.
fn versioned_write(
    mut record: Record,
    expected_version: u64,
    entry_for: impl FnOnce(&Record) -> VersionEntry,
) -> VersionedWrite {
    record.version = expected_version + 1;
    let entry = entry_for(&record);
    VersionedWrite {
        record,
        expected_version,
        entry,
    }
}
