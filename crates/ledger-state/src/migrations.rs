//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with their uniqueness constraints and lookup indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all ledger tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing ledger SurrealDB schema");

    init_records_table(db).await?;
    init_record_versions_table(db).await?;
    init_sessions_table(db).await?;
    init_session_operations_table(db).await?;
    init_session_drafts_table(db).await?;
    init_session_notes_table(db).await?;

    info!("Ledger schema initialization complete");
    Ok(())
}

/// Initialize `records` table
///
/// Schema:
/// ```text
/// TABLE records {
///   record_id:     STRING (unique)
///   workspace_id:  STRING (indexed)
///   fields:        OBJECT
///   version:       INT (0 until first commit)
///   deleted:       BOOL
///   deleted_at:    DATETIME?
///   ...
/// }
/// ```
///
/// Constraints:
/// - `record_id` is unique
/// - `version` only moves forward (enforced by compare-and-swap updates)
async fn init_records_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing records table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS records AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_record_id ON TABLE records COLUMNS record_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_workspace_id ON TABLE records COLUMNS workspace_id;
        DEFINE INDEX IF NOT EXISTS idx_workspace_deleted ON TABLE records COLUMNS workspace_id, deleted;
    "#;

    db.query(sql).await?;
    info!("✓ records table initialized");
    Ok(())
}

/// Initialize `record_versions` table
///
/// Schema:
/// ```text
/// TABLE record_versions {
///   entry_id:         STRING (unique)
///   record_id:        STRING
///   workspace_id:     STRING
///   version:          INT
///   snapshot:         OBJECT
///   snapshot_digest:  STRING
///   changed_at:       DATETIME
///   change_type:      STRING (create | update | delete | transfer | restore | rollback)
///   ...
/// }
/// ```
///
/// Constraints:
/// - `(record_id, version)` is unique
/// - Entries are never updated; only whole-record history clears delete them
async fn init_record_versions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing record_versions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS record_versions AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_entry_id ON TABLE record_versions COLUMNS entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_record_id_version ON TABLE record_versions COLUMNS record_id, version UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_workspace_changed_at ON TABLE record_versions COLUMNS workspace_id, changed_at;
    "#;

    db.query(sql).await?;
    info!("✓ record_versions table initialized");
    Ok(())
}

/// Initialize `sessions` table
///
/// Constraints:
/// - `session_id` is unique
/// - `status` transitions: active → committed | discarded (enforced via app logic)
async fn init_sessions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing sessions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS sessions AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_session_id ON TABLE sessions COLUMNS session_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_workspace_status ON TABLE sessions COLUMNS workspace_id, status;
        DEFINE INDEX IF NOT EXISTS idx_owner_id ON TABLE sessions COLUMNS owner_id;
    "#;

    db.query(sql).await?;
    info!("✓ sessions table initialized");
    Ok(())
}

/// Initialize `session_operations` table
///
/// Constraints:
/// - `(session_id, sequence)` is unique
/// - `sequence` is 1-indexed and dense within a session (app logic)
async fn init_session_operations_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing session_operations table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS session_operations AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_session_id_sequence ON TABLE session_operations COLUMNS session_id, sequence UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_op_record_id ON TABLE session_operations COLUMNS record_id;
    "#;

    db.query(sql).await?;
    info!("✓ session_operations table initialized");
    Ok(())
}

/// Initialize `session_drafts` table
///
/// Constraints:
/// - `(session_id, record_id)` is unique (one overlay per record per session)
async fn init_session_drafts_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing session_drafts table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS session_drafts AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_session_id_record_id ON TABLE session_drafts COLUMNS session_id, record_id UNIQUE;
    "#;

    db.query(sql).await?;
    info!("✓ session_drafts table initialized");
    Ok(())
}

/// Initialize `session_notes` table
async fn init_session_notes_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing session_notes table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS session_notes AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_note_session_sequence ON TABLE session_notes COLUMNS session_id, sequence UNIQUE;
    "#;

    db.query(sql).await?;
    info!("✓ session_notes table initialized");
    Ok(())
}
