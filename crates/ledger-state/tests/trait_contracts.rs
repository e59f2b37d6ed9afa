//! Trait contract tests for RecordStore, VersionLog, SessionStore and
//! LedgerWriter.
//!
//! Every contract runs against both the in-memory fakes and the in-memory
//! SurrealDB store. Any conforming implementation must pass these.

use chrono::{Duration, NaiveDate, Utc};
use ledger_state::fakes::MemoryBackend;
use ledger_state::storage_traits::*;
use ledger_state::*;

fn fields(area: Area, amount: i64) -> RecordFields {
    RecordFields {
        area,
        kind: "0".to_string(),
        account: "ACME".to_string(),
        reference: "INV-7".to_string(),
        note: None,
        date_cashflow: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        date_offer: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        amount,
        vat: 0,
        total: amount,
        stage: "0".to_string(),
        owner: None,
        next_action: None,
        transaction_id: None,
        bank_account_id: None,
        project_code: None,
        transfer_history: Vec::new(),
    }
}

fn actor() -> Actor {
    Actor::new("u-1", "Ana")
}

fn record(ws: &str, amount: i64) -> Record {
    let mut r = Record::new(WorkspaceId::from(ws), fields(Area::Budget, amount), &actor());
    r.version = 1;
    r
}

// ===========================================================================
// RecordStore contracts
// ===========================================================================

async fn record_insert_get_and_duplicate<S: RecordStore>(store: &S) {
    let r = record("ws-a", 100);
    store.insert_record(&r).await.unwrap();

    let fetched = store.get_record(&r.id).await.unwrap();
    assert_eq!(fetched.fields, r.fields);
    assert_eq!(fetched.version, 1);

    let err = store.insert_record(&r).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateRecord { .. }));

    let missing = RecordId::new();
    assert!(store.find_record(&missing).await.unwrap().is_none());
    let err = store.get_record(&missing).await.unwrap_err();
    assert!(matches!(err, StorageError::RecordNotFound { .. }));
}

async fn record_update_is_compare_and_swap<S: RecordStore>(store: &S) {
    let mut r = record("ws-a", 100);
    store.insert_record(&r).await.unwrap();

    r.fields.amount = 200;
    r.version = 2;
    store.update_record(&r, 1).await.unwrap();
    assert_eq!(store.get_record(&r.id).await.unwrap().fields.amount, 200);

    r.fields.amount = 300;
    r.version = 3;
    let err = store.update_record(&r, 1).await.unwrap_err();
    assert_eq!(
        err,
        StorageError::VersionMismatch {
            record_id: r.id.0.clone(),
            expected: 1,
            actual: 2,
        }
    );
    assert_eq!(store.get_record(&r.id).await.unwrap().fields.amount, 200);
}

async fn record_list_filters_workspace_and_deleted<S: RecordStore>(store: &S) {
    let live = record("ws-list", 1);
    let mut gone = record("ws-list", 2);
    gone.deleted_at = Some(Utc::now());
    gone.deleted_by = Some("u-1".to_string());
    let other = record("ws-other", 3);
    for r in [&live, &gone, &other] {
        store.insert_record(r).await.unwrap();
    }

    let visible = store
        .list_records(&WorkspaceId::from("ws-list"), false)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, live.id);

    let all = store
        .list_records(&WorkspaceId::from("ws-list"), true)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    store.delete_record(&gone.id).await.unwrap();
    store.delete_record(&gone.id).await.unwrap();
    assert!(store.find_record(&gone.id).await.unwrap().is_none());
}

#[tokio::test]
async fn memory_record_store_contracts() {
    let store = MemoryBackend::new();
    record_insert_get_and_duplicate(&store).await;
    record_update_is_compare_and_swap(&store).await;
    record_list_filters_workspace_and_deleted(&store).await;
}

#[tokio::test]
async fn surreal_record_store_contracts() {
    let store = SurrealStore::in_memory().await.unwrap();
    record_insert_get_and_duplicate(&store).await;
    record_update_is_compare_and_swap(&store).await;
    record_list_filters_workspace_and_deleted(&store).await;
}

// ===========================================================================
// VersionLog contracts
// ===========================================================================

async fn version_log_append_and_query<S: VersionLog>(log: &S) {
    let mut r = record("ws-v", 10);
    let t0 = Utc::now();
    let v1 = VersionEntry::capture(&r, ChangeType::Create, &actor(), None, None, t0);
    log.append(&v1).await.unwrap();

    r.version = 2;
    r.fields.amount = 20;
    let v2 = VersionEntry::capture(
        &r,
        ChangeType::Update,
        &actor(),
        Some(SessionId::from("s-1")),
        None,
        t0 + Duration::seconds(1),
    );
    log.append(&v2).await.unwrap();

    let err = log.append(&v2).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::DuplicateVersion { version: 2, .. }
    ));

    let history = log.history(&r.id).await.unwrap();
    assert_eq!(
        history.iter().map(|e| e.version).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(history.iter().all(VersionEntry::verify));

    let fetched = log.get_version(&r.id, 2).await.unwrap();
    assert_eq!(fetched.snapshot.get("amount"), Some(&serde_json::json!(20)));
    assert_eq!(fetched.session_id, Some(SessionId::from("s-1")));
    assert_eq!(log.get_entry(&v1.id).await.unwrap().version, 1);

    let err = log.get_version(&r.id, 9).await.unwrap_err();
    assert!(matches!(err, StorageError::VersionNotFound { .. }));

    let ws = log
        .workspace_entries(&WorkspaceId::from("ws-v"))
        .await
        .unwrap();
    assert_eq!(ws.len(), 2);
    assert!(ws[0].changed_at <= ws[1].changed_at);

    assert_eq!(log.clear_history(&r.id).await.unwrap(), 2);
    assert!(log.history(&r.id).await.unwrap().is_empty());
    assert_eq!(log.clear_history(&r.id).await.unwrap(), 0);
}

#[tokio::test]
async fn memory_version_log_contracts() {
    version_log_append_and_query(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn surreal_version_log_contracts() {
    let store = SurrealStore::in_memory().await.unwrap();
    version_log_append_and_query(&store).await;
}

// ===========================================================================
// LedgerWriter contracts
// ===========================================================================

fn bump(record: &Record, amount: i64) -> VersionedWrite {
    let mut next = record.clone();
    next.fields.amount = amount;
    next.version = record.version + 1;
    let entry = VersionEntry::capture(&next, ChangeType::Update, &actor(), None, None, Utc::now());
    VersionedWrite {
        record: next,
        expected_version: record.version,
        entry,
    }
}

async fn batch_applies_all_or_nothing<S>(store: &S)
where
    S: RecordStore + VersionLog + LedgerWriter,
{
    let first = record("ws-b", 1);
    let second = record("ws-b", 2);
    let mut pending = record("ws-b", 3);
    pending.version = 0;
    for r in [&first, &second, &pending] {
        store.insert_record(r).await.unwrap();
    }

    // The second write expects a version that is no longer stored.
    let mut stale = bump(&second, 20);
    stale.expected_version = 7;
    let err = store
        .apply_batch(&CommitBatch {
            writes: vec![bump(&first, 10), stale],
            removals: vec![pending.id.clone()],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::VersionMismatch { expected: 7, .. }));
    assert_eq!(store.get_record(&first.id).await.unwrap().fields.amount, 1);
    assert_eq!(store.get_record(&first.id).await.unwrap().version, 1);
    assert!(store.history(&first.id).await.unwrap().is_empty());
    assert!(store.find_record(&pending.id).await.unwrap().is_some());

    // A taken (record_id, version) refuses the batch before the record moves.
    let taken = bump(&first, 10);
    store.append(&taken.entry).await.unwrap();
    let err = store
        .apply_batch(&CommitBatch {
            writes: vec![taken],
            removals: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateVersion { version: 2, .. }));
    assert_eq!(store.get_record(&first.id).await.unwrap().version, 1);
    store.clear_history(&first.id).await.unwrap();

    store
        .apply_batch(&CommitBatch {
            writes: vec![bump(&first, 10), bump(&second, 20)],
            removals: vec![pending.id.clone()],
        })
        .await
        .unwrap();
    let now_first = store.get_record(&first.id).await.unwrap();
    assert_eq!((now_first.version, now_first.fields.amount), (2, 10));
    assert_eq!(store.get_version(&second.id, 2).await.unwrap().version, 2);
    assert!(store.find_record(&pending.id).await.unwrap().is_none());

    store.apply_batch(&CommitBatch::default()).await.unwrap();
}

#[tokio::test]
async fn memory_ledger_writer_contracts() {
    batch_applies_all_or_nothing(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn surreal_ledger_writer_contracts() {
    let store = SurrealStore::in_memory().await.unwrap();
    batch_applies_all_or_nothing(&store).await;
}

// ===========================================================================
// SessionStore contracts
// ===========================================================================

fn operation(session: &SessionRecord, sequence: u64, record_id: &RecordId) -> Operation {
    Operation {
        session_id: session.id.clone(),
        sequence,
        operation_type: OperationType::Update,
        record_id: record_id.clone(),
        area: Area::Budget,
        before_snapshot: Some(Snapshot::new().with("amount", 1)),
        after_snapshot: Snapshot::new().with("amount", 2),
        from_area: None,
        to_area: None,
        is_undone: false,
        undone_at: None,
        created_at: Utc::now(),
    }
}

async fn session_lifecycle_and_logs<S: SessionStore>(store: &S) {
    let ws = WorkspaceId::from("ws-s");
    let mut session = SessionRecord::new(ws.clone(), actor(), Some("March".to_string()));
    store.create_session(&session).await.unwrap();
    let err = store.create_session(&session).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateSession { .. }));

    session.status = SessionStatus::Committed;
    session.changes_summary.record(OperationType::Create);
    store.save_session(&session).await.unwrap();
    assert_eq!(store.get_session(&session.id).await.unwrap(), session);

    let other = SessionRecord::new(ws.clone(), Actor::new("u-2", "Bo"), None);
    store.create_session(&other).await.unwrap();

    let active = store
        .list_sessions(&ws, Some(SessionStatus::Active), None)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, other.id);
    let mine = store.list_sessions(&ws, None, Some("u-1")).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, session.id);

    let rid = RecordId::new();
    store
        .append_operation(&operation(&other, 2, &rid))
        .await
        .unwrap();
    let mut first = operation(&other, 1, &rid);
    store.append_operation(&first).await.unwrap();
    let err = store.append_operation(&first).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::DuplicateOperation { sequence: 1, .. }
    ));

    first.is_undone = true;
    first.undone_at = Some(Utc::now());
    store.save_operation(&first).await.unwrap();
    let ops = store.operations(&other.id).await.unwrap();
    assert_eq!(ops.iter().map(|o| o.sequence).collect::<Vec<_>>(), vec![1, 2]);
    assert!(ops[0].is_undone);
    assert!(!ops[1].is_undone);

    let missing = operation(&other, 7, &rid);
    let err = store.save_operation(&missing).await.unwrap_err();
    assert!(matches!(err, StorageError::OperationNotFound { .. }));
}

async fn session_overlays_upsert_and_clear<S: SessionStore>(store: &S) {
    let session = SessionRecord::new(WorkspaceId::from("ws-o"), actor(), None);
    store.create_session(&session).await.unwrap();
    let rid = RecordId::new();

    let mut overlay = DraftOverlay {
        session_id: session.id.clone(),
        record_id: rid.clone(),
        draft_snapshot: Snapshot::new().with("amount", 5),
        base_version: 3,
        locked_at: Utc::now(),
    };
    store.put_overlay(&overlay).await.unwrap();
    overlay.draft_snapshot.insert("amount", 6);
    store.put_overlay(&overlay).await.unwrap();

    let all = store.overlays(&session.id).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(
        all[0].draft_snapshot.get("amount"),
        Some(&serde_json::json!(6))
    );
    assert_eq!(
        store
            .get_overlay(&session.id, &rid)
            .await
            .unwrap()
            .map(|o| o.base_version),
        Some(3)
    );

    store.clear_overlays(&session.id).await.unwrap();
    assert!(store.overlays(&session.id).await.unwrap().is_empty());
    assert!(store.get_overlay(&session.id, &rid).await.unwrap().is_none());
}

async fn session_notes_are_ordered<S: SessionStore>(store: &S) {
    let session = SessionRecord::new(WorkspaceId::from("ws-n"), actor(), None);
    store.create_session(&session).await.unwrap();
    for (sequence, content) in [(2u64, "second"), (1, "first")] {
        store
            .append_note(&SessionNote {
                session_id: session.id.clone(),
                sequence,
                role: NoteRole::System,
                content: content.to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    let notes = store.notes(&session.id).await.unwrap();
    assert_eq!(
        notes.iter().map(|n| n.content.as_str()).collect::<Vec<_>>(),
        vec!["first", "second"]
    );

    let err = store.notes(&SessionId::new()).await.unwrap_err();
    assert!(matches!(err, StorageError::SessionNotFound { .. }));
}

#[tokio::test]
async fn memory_session_store_contracts() {
    let store = MemoryBackend::new();
    session_lifecycle_and_logs(&store).await;
    session_overlays_upsert_and_clear(&store).await;
    session_notes_are_ordered(&store).await;
}

#[tokio::test]
async fn surreal_session_store_contracts() {
    let store = SurrealStore::in_memory().await.unwrap();
    session_lifecycle_and_logs(&store).await;
    session_overlays_upsert_and_clear(&store).await;
    session_notes_are_ordered(&store).await;
}

// ===========================================================================
// Local persistence
// ===========================================================================

#[tokio::test]
async fn local_store_persists_under_given_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let r = record("ws-disk", 42);

    let handle = SurrealHandle::setup_local(&path).await.unwrap();
    let store = SurrealStore::new(&handle);
    store.insert_record(&r).await.unwrap();

    let fetched = store.get_record(&r.id).await.unwrap();
    assert_eq!(fetched.fields.amount, 42);
    assert!(path.exists());
}
