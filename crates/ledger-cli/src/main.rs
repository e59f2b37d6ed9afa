//! Cashflow Ledger CLI
//!
//! The `ledger` command drives working sessions against the shared ledger.
//!
//! ## Commands
//!
//! - `session`: open, inspect, undo/redo, commit, resolve or discard sessions
//! - `record`: draft edits inside a session, inspect records and history
//! - `rollback`: return a workspace to a point in its version history

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, Level};

use ledger_core::{
    Actor, Area, CommitResult, Conflict, ConflictResolution, EngineError, Record, RecordFields,
    RecordId, SessionEngine, SessionId, SessionRecord, SessionSpan, SessionStatus, Snapshot,
    VersionEntryId, WorkspaceId, METRICS,
};
use ledger_state::SurrealStore;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author = "Cashflow Ledger Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Session-scoped editing for shared cashflow records", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Workspace (tenant) to operate on
    #[arg(long, global = true, env = "LEDGER_WORKSPACE", default_value = "default")]
    workspace: String,

    /// Identity recorded on sessions and versions
    #[arg(long, global = true, env = "LEDGER_ACTOR_ID", default_value = "cli")]
    actor_id: String,

    #[arg(long, global = true, env = "LEDGER_ACTOR_NAME", default_value = "CLI User")]
    actor_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage working sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Draft edits and inspect records
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Roll every record of the workspace back to a version-history marker
    Rollback {
        /// Version entry ID acting as the point-in-time marker
        entry_id: String,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Open a new session
    Open {
        #[arg(short, long)]
        title: Option<String>,
    },

    /// List sessions of the workspace, newest first
    List {
        #[arg(long)]
        status: Option<SessionStatus>,

        #[arg(long)]
        owner: Option<String>,
    },

    /// Show a session with its operations and notes
    Show { session_id: String },

    /// Append a note to an active session
    Note { session_id: String, content: String },

    /// Revert the most recent operation
    Undo { session_id: String },

    /// Reapply the most recently undone operation
    Redo { session_id: String },

    /// List records whose committed version moved past this session's draft
    Conflicts { session_id: String },

    /// Commit all pending drafts
    Commit {
        session_id: String,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// Resolve conflicts and commit
    Resolve {
        session_id: String,

        /// Keep this session's draft for the record (repeatable)
        #[arg(long = "keep-mine")]
        keep_mine: Vec<String>,

        /// Take the committed value for the record (repeatable)
        #[arg(long = "keep-theirs")]
        keep_theirs: Vec<String>,

        /// JSON file holding a list of resolutions
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// Discard the session and revert its drafts
    Discard { session_id: String },

    /// Discard active sessions idle for longer than the threshold
    Reap {
        #[arg(long, default_value = "120")]
        idle_minutes: i64,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Seed a committed record outside any session
    Import {
        /// Record fields as JSON
        file: PathBuf,
    },

    /// Draft a new record
    Create {
        session_id: String,

        /// Record fields as JSON
        file: PathBuf,
    },

    /// Draft field changes (`--set amount=1200 --set note='"late"'`)
    Update {
        session_id: String,
        record_id: String,

        #[arg(short, long = "set", required = true)]
        set: Vec<String>,
    },

    /// Draft a soft delete
    Delete {
        session_id: String,
        record_id: String,
    },

    /// Draft a move to another area
    Transfer {
        session_id: String,
        record_id: String,

        #[arg(long)]
        to: Area,

        #[arg(long)]
        note: Option<String>,
    },

    /// Show a record, as a session sees it when `--session` is given
    Show {
        record_id: String,

        #[arg(long)]
        session: Option<String>,
    },

    /// List records of the workspace
    List {
        #[arg(long)]
        include_deleted: bool,
    },

    /// Show a record's version history
    History { record_id: String },

    /// Restore a record to one of its versions
    Restore {
        record_id: String,
        version: u64,

        #[arg(long)]
        note: Option<String>,
    },

    /// Remove a record's version history
    ClearHistory { record_id: String },
}

/// Who is calling and on which workspace.
struct Ctx {
    engine: SessionEngine,
    workspace: WorkspaceId,
    actor: Actor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ledger_core::init_tracing(cli.json, level);

    let store = SurrealStore::from_env()
        .await
        .context("Failed to connect to ledger database")?;
    let ctx = Ctx {
        engine: SessionEngine::from_backend(Arc::new(store)),
        workspace: WorkspaceId::from(cli.workspace.as_str()),
        actor: Actor::new(cli.actor_id, cli.actor_name),
    };

    let result = run(&ctx, cli.command).await;
    METRICS.flush();
    result
}

async fn run(ctx: &Ctx, command: Commands) -> Result<()> {
    match command {
        Commands::Session { action } => match action {
            SessionAction::Open { title } => cmd_session_open(ctx, title).await.map(|_| ()),
            SessionAction::List { status, owner } => {
                cmd_session_list(ctx, status, owner.as_deref()).await
            }
            SessionAction::Show { session_id } => cmd_session_show(ctx, &session_id).await,
            SessionAction::Note {
                session_id,
                content,
            } => cmd_session_note(ctx, &session_id, &content).await,
            SessionAction::Undo { session_id } => cmd_undo(ctx, &session_id).await,
            SessionAction::Redo { session_id } => cmd_redo(ctx, &session_id).await,
            SessionAction::Conflicts { session_id } => cmd_conflicts(ctx, &session_id).await,
            SessionAction::Commit {
                session_id,
                message,
            } => cmd_commit(ctx, &session_id, message).await.map(|_| ()),
            SessionAction::Resolve {
                session_id,
                keep_mine,
                keep_theirs,
                file,
                message,
            } => {
                let resolutions = collect_resolutions(&keep_mine, &keep_theirs, file.as_deref())?;
                cmd_resolve(ctx, &session_id, resolutions, message)
                    .await
                    .map(|_| ())
            }
            SessionAction::Discard { session_id } => cmd_discard(ctx, &session_id).await,
            SessionAction::Reap { idle_minutes } => cmd_reap(ctx, idle_minutes).await.map(|_| ()),
        },
        Commands::Record { action } => match action {
            RecordAction::Import { file } => cmd_import(ctx, &file).await.map(|_| ()),
            RecordAction::Create { session_id, file } => {
                cmd_record_create(ctx, &session_id, &file).await.map(|_| ())
            }
            RecordAction::Update {
                session_id,
                record_id,
                set,
            } => cmd_record_update(ctx, &session_id, &record_id, &set).await,
            RecordAction::Delete {
                session_id,
                record_id,
            } => cmd_record_delete(ctx, &session_id, &record_id).await,
            RecordAction::Transfer {
                session_id,
                record_id,
                to,
                note,
            } => cmd_record_transfer(ctx, &session_id, &record_id, to, note).await,
            RecordAction::Show { record_id, session } => {
                cmd_record_show(ctx, &record_id, session.as_deref()).await
            }
            RecordAction::List { include_deleted } => cmd_record_list(ctx, include_deleted).await,
            RecordAction::History { record_id } => cmd_history(ctx, &record_id).await,
            RecordAction::Restore {
                record_id,
                version,
                note,
            } => cmd_restore(ctx, &record_id, version, note).await,
            RecordAction::ClearHistory { record_id } => cmd_clear_history(ctx, &record_id).await,
        },
        Commands::Rollback { entry_id } => cmd_rollback(ctx, &entry_id).await.map(|_| ()),
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

async fn cmd_session_open(ctx: &Ctx, title: Option<String>) -> Result<SessionRecord> {
    let session = ctx
        .engine
        .open_session(&ctx.workspace, ctx.actor.clone(), title)
        .await
        .context("Failed to open session")?;
    println!("Opened session {} ({})", session.id, session.display_title());
    Ok(session)
}

async fn cmd_session_list(
    ctx: &Ctx,
    status: Option<SessionStatus>,
    owner: Option<&str>,
) -> Result<()> {
    let sessions = ctx
        .engine
        .list_sessions(&ctx.workspace, status, owner)
        .await?;
    if sessions.is_empty() {
        println!("No sessions in workspace '{}'", ctx.workspace);
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {:<9}  {:>3} change(s)  {}  {}",
            s.id,
            s.status,
            s.changes_count,
            s.owner.name,
            s.display_title()
        );
    }
    Ok(())
}

async fn cmd_session_show(ctx: &Ctx, session_id: &str) -> Result<()> {
    let id = SessionId::from(session_id);
    let session = ctx
        .engine
        .get_session(&id)
        .await
        .context(format!("Session not found: {}", session_id))?;

    println!("session {}", session.id);
    println!("Title:  {}", session.display_title());
    println!("Owner:  {} <{}>", session.owner.name, session.owner.id);
    println!("Status: {}", session.status);
    println!(
        "Opened: {}",
        session.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let summary = session.changes_summary;
    println!(
        "Changes: {} (created {}, updated {}, deleted {}, transferred {})",
        session.changes_count,
        summary.created,
        summary.updated,
        summary.deleted,
        summary.transferred
    );

    let operations = ctx.engine.operations(&id).await?;
    if !operations.is_empty() {
        println!();
        println!("Operations:");
        for op in operations {
            let marker = if op.is_undone { " (undone)" } else { "" };
            println!(
                "  #{:<3} {:<8} {}{}",
                op.sequence, op.operation_type, op.record_id, marker
            );
        }
    }

    let notes = ctx.engine.notes(&id).await?;
    if !notes.is_empty() {
        println!();
        println!("Notes:");
        for note in notes {
            println!("  [{}] {}", note.role, note.content);
        }
    }
    Ok(())
}

async fn cmd_session_note(ctx: &Ctx, session_id: &str, content: &str) -> Result<()> {
    let note = ctx
        .engine
        .add_note(&SessionId::from(session_id), content)
        .await?;
    println!("Note #{} added", note.sequence);
    Ok(())
}

async fn cmd_undo(ctx: &Ctx, session_id: &str) -> Result<()> {
    let _span = SessionSpan::enter(session_id);
    let op = ctx.engine.undo(&SessionId::from(session_id)).await?;
    println!(
        "Undid #{} {} on {}",
        op.sequence, op.operation_type, op.record_id
    );
    Ok(())
}

async fn cmd_redo(ctx: &Ctx, session_id: &str) -> Result<()> {
    let _span = SessionSpan::enter(session_id);
    let op = ctx.engine.redo(&SessionId::from(session_id)).await?;
    println!(
        "Redid #{} {} on {}",
        op.sequence, op.operation_type, op.record_id
    );
    Ok(())
}

async fn cmd_conflicts(ctx: &Ctx, session_id: &str) -> Result<()> {
    let conflicts = ctx
        .engine
        .check_conflicts(&SessionId::from(session_id))
        .await?;
    if conflicts.is_empty() {
        println!("No conflicts");
    } else {
        print_conflicts(&conflicts);
    }
    Ok(())
}

async fn cmd_commit(ctx: &Ctx, session_id: &str, message: Option<String>) -> Result<CommitResult> {
    let _span = SessionSpan::enter(session_id);
    let result = ctx
        .engine
        .commit(&SessionId::from(session_id), message)
        .await;
    report_commit(session_id, result)
}

async fn cmd_resolve(
    ctx: &Ctx,
    session_id: &str,
    resolutions: Vec<ConflictResolution>,
    message: Option<String>,
) -> Result<CommitResult> {
    let _span = SessionSpan::enter(session_id);
    let result = ctx
        .engine
        .resolve_conflicts(&SessionId::from(session_id), resolutions, message)
        .await;
    report_commit(session_id, result)
}

fn report_commit(
    session_id: &str,
    result: std::result::Result<CommitResult, EngineError>,
) -> Result<CommitResult> {
    match result {
        Ok(result) => {
            println!(
                "Committed session {}: {} record(s), {} operation(s)",
                session_id, result.changes_committed, result.operations_committed
            );
            for entry in &result.versions {
                println!(
                    "  {} v{} {}",
                    entry.record_id, entry.version, entry.change_type
                );
            }
            Ok(result)
        }
        Err(EngineError::Conflict { conflicts }) => {
            print_conflicts(&conflicts);
            anyhow::bail!(
                "Commit blocked by {} conflict(s); use `ledger session resolve`",
                conflicts.len()
            )
        }
        Err(e) => Err(e).context(format!("Failed to commit session {}", session_id)),
    }
}

fn print_conflicts(conflicts: &[Conflict]) {
    for c in conflicts {
        println!(
            "CONFLICT {} (base v{}, now v{} by {} at {})",
            c.record_id,
            c.base_version,
            c.current_version_number,
            c.modified_by.name,
            c.modified_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let diff = c.current_version.diff(&c.your_version);
        for (field, change) in diff {
            println!(
                "    {}: theirs={} mine={}",
                field,
                change.old.unwrap_or(Value::Null),
                change.new.unwrap_or(Value::Null)
            );
        }
    }
}

fn collect_resolutions(
    keep_mine: &[String],
    keep_theirs: &[String],
    file: Option<&Path>,
) -> Result<Vec<ConflictResolution>> {
    let mut resolutions: Vec<ConflictResolution> = keep_mine
        .iter()
        .map(|id| ConflictResolution::keep_mine(RecordId::from(id.as_str())))
        .chain(
            keep_theirs
                .iter()
                .map(|id| ConflictResolution::keep_theirs(RecordId::from(id.as_str()))),
        )
        .collect();
    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .context(format!("Failed to read resolutions from {:?}", path))?;
        let from_file: Vec<ConflictResolution> =
            serde_json::from_str(&text).context("Invalid resolutions file")?;
        resolutions.extend(from_file);
    }
    Ok(resolutions)
}

async fn cmd_discard(ctx: &Ctx, session_id: &str) -> Result<()> {
    let _span = SessionSpan::enter(session_id);
    let result = ctx.engine.discard(&SessionId::from(session_id)).await?;
    println!(
        "Discarded session {}: {} change(s) reverted",
        session_id, result.changes_discarded
    );
    Ok(())
}

/// Idle-session policy: discard whatever has been inactive too long.
async fn cmd_reap(ctx: &Ctx, idle_minutes: i64) -> Result<Vec<SessionId>> {
    let idle = ctx
        .engine
        .idle_sessions(&ctx.workspace, chrono::Duration::minutes(idle_minutes))
        .await?;
    let mut reaped = Vec::new();
    for session in idle {
        match ctx.engine.discard(&session.id).await {
            Ok(_) => {
                info!(session_id = %session.id, "idle session discarded");
                reaped.push(session.id);
            }
            // Committed or discarded by someone else in the meantime.
            Err(EngineError::SessionNotActive { .. }) => {}
            Err(e) => return Err(e).context(format!("Failed to discard {}", session.id)),
        }
    }
    println!("Reaped {} idle session(s)", reaped.len());
    Ok(reaped)
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn read_fields(path: &Path) -> Result<RecordFields> {
    let text =
        std::fs::read_to_string(path).context(format!("Failed to read record from {:?}", path))?;
    serde_json::from_str(&text).context(format!("Invalid record fields in {:?}", path))
}

/// Parse `key=value`; the value is JSON when it parses as JSON, a string
/// otherwise.
fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .context(format!("Expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Empty field name in '{}'", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

fn print_record(record: &Record) {
    let deleted = if record.is_deleted() { "  [deleted]" } else { "" };
    println!(
        "{}  v{:<3} {:<8} {:<20} {:<16} {:>12}{}",
        record.id,
        record.version,
        record.area(),
        record.fields.account,
        record.fields.reference,
        format_amount(record.fields.total),
        deleted
    );
}

async fn cmd_import(ctx: &Ctx, file: &Path) -> Result<Record> {
    let fields = read_fields(file)?;
    let record = ctx
        .engine
        .import_record(&ctx.workspace, fields, &ctx.actor)
        .await?;
    println!("Imported record {} (v{})", record.id, record.version);
    Ok(record)
}

async fn cmd_record_create(ctx: &Ctx, session_id: &str, file: &Path) -> Result<Record> {
    let fields = read_fields(file)?;
    let view = ctx
        .engine
        .create_record(&SessionId::from(session_id), fields)
        .await?;
    println!("Drafted new record {}", view.record.id);
    Ok(view.record)
}

async fn cmd_record_update(
    ctx: &Ctx,
    session_id: &str,
    record_id: &str,
    assignments: &[String],
) -> Result<()> {
    let changes = assignments
        .iter()
        .map(|raw| parse_assignment(raw))
        .collect::<Result<Snapshot>>()?;
    let view = ctx
        .engine
        .update_record(
            &SessionId::from(session_id),
            &RecordId::from(record_id),
            changes,
        )
        .await?;
    print_record(&view.record);
    Ok(())
}

async fn cmd_record_delete(ctx: &Ctx, session_id: &str, record_id: &str) -> Result<()> {
    ctx.engine
        .delete_record(&SessionId::from(session_id), &RecordId::from(record_id))
        .await?;
    println!("Drafted delete of {}", record_id);
    Ok(())
}

async fn cmd_record_transfer(
    ctx: &Ctx,
    session_id: &str,
    record_id: &str,
    to: Area,
    note: Option<String>,
) -> Result<()> {
    let view = ctx
        .engine
        .transfer_record(
            &SessionId::from(session_id),
            &RecordId::from(record_id),
            to,
            note,
        )
        .await?;
    println!("Drafted transfer of {} to {}", view.record.id, to);
    Ok(())
}

async fn cmd_record_show(ctx: &Ctx, record_id: &str, session: Option<&str>) -> Result<()> {
    let record_id = RecordId::from(record_id);
    let record = match session {
        Some(session_id) => {
            let view = ctx
                .engine
                .record_view(&SessionId::from(session_id), &record_id)
                .await?;
            if view.is_draft {
                println!("(draft in session {})", session_id);
            }
            view.record
        }
        None => ctx
            .engine
            .list_records(&ctx.workspace, true)
            .await?
            .into_iter()
            .find(|r| r.id == record_id)
            .context(format!("Record not found: {}", record_id))?,
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_record_list(ctx: &Ctx, include_deleted: bool) -> Result<()> {
    let records = ctx
        .engine
        .list_records(&ctx.workspace, include_deleted)
        .await?;
    if records.is_empty() {
        println!("No records in workspace '{}'", ctx.workspace);
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

async fn cmd_history(ctx: &Ctx, record_id: &str) -> Result<()> {
    let history = ctx
        .engine
        .record_history(&RecordId::from(record_id))
        .await?;
    if history.is_empty() {
        println!("No history for '{}'", record_id);
        return Ok(());
    }

    for item in history {
        let entry = &item.entry;
        let by = entry
            .changed_by
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or("unknown");
        println!("version {} ({})", entry.version, entry.change_type);
        println!("Entry:  {}", entry.id);
        println!("Author: {}", by);
        println!(
            "Date:   {}",
            entry.changed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if !item.intact {
            println!("WARNING: snapshot digest mismatch");
        }
        if let Some(note) = &entry.note {
            println!();
            println!("    {}", note);
        }
        if let Some(t) = item.transfer {
            println!("    transfer {} -> {}", t.from_area, t.to_area);
        }
        for (field, change) in &item.diff {
            println!(
                "    {}: {} -> {}",
                field,
                change.old.clone().unwrap_or(Value::Null),
                change.new.clone().unwrap_or(Value::Null)
            );
        }
        println!();
    }
    Ok(())
}

async fn cmd_restore(ctx: &Ctx, record_id: &str, version: u64, note: Option<String>) -> Result<()> {
    let record = ctx
        .engine
        .restore_version(&RecordId::from(record_id), version, &ctx.actor, note)
        .await
        .context(format!("Failed to restore {} to v{}", record_id, version))?;
    println!(
        "Restored {} from v{} as v{}",
        record.id, version, record.version
    );
    Ok(())
}

async fn cmd_clear_history(ctx: &Ctx, record_id: &str) -> Result<()> {
    let removed = ctx
        .engine
        .clear_history(&RecordId::from(record_id), &ctx.actor)
        .await?;
    println!("Removed {} version entr(ies) of {}", removed, record_id);
    Ok(())
}

async fn cmd_rollback(ctx: &Ctx, entry_id: &str) -> Result<Vec<Record>> {
    let changed = ctx
        .engine
        .rollback_to_version(&ctx.workspace, &VersionEntryId::from(entry_id), &ctx.actor)
        .await
        .context(format!("Failed to roll back to {}", entry_id))?;
    println!("Rolled back {} record(s)", changed.len());
    for record in &changed {
        print_record(record);
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    fn ctx() -> Ctx {
        Ctx {
            engine: SessionEngine::in_memory(),
            workspace: WorkspaceId::from("ws-cli"),
            actor: Actor::new("u-cli", "Tester"),
        }
    }

    fn write_fields(dir: &Path, amount: i64) -> PathBuf {
        let path = dir.join(format!("record-{amount}.json"));
        let body = json!({
            "area": "budget",
            "type": "0",
            "account": "ACME",
            "reference": "INV-42",
            "date_cashflow": "2026-06-30",
            "date_offer": "2026-06-01",
            "amount": amount,
            "total": amount,
            "stage": "0"
        });
        std::fs::write(&path, body.to_string()).unwrap();
        path
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_and_subcommands() {
        let cli = Cli::try_parse_from([
            "ledger",
            "--workspace",
            "acme",
            "record",
            "transfer",
            "s-1",
            "r-1",
            "--to",
            "orders",
        ])
        .unwrap();
        assert_eq!(cli.workspace, "acme");
        match cli.command {
            Commands::Record {
                action: RecordAction::Transfer { to, .. },
            } => assert_eq!(to, Area::Orders),
            _ => panic!("expected record transfer"),
        }

        assert!(Cli::try_parse_from(["ledger", "record", "transfer", "s", "r", "--to", "moon"])
            .is_err());
    }

    #[test]
    fn assignment_values_are_json_or_strings() {
        assert_eq!(
            parse_assignment("amount=1200").unwrap(),
            ("amount".to_string(), json!(1200))
        );
        assert_eq!(
            parse_assignment("note=paid late").unwrap(),
            ("note".to_string(), json!("paid late"))
        );
        assert_eq!(
            parse_assignment("owner=null").unwrap(),
            ("owner".to_string(), Value::Null)
        );
        assert!(parse_assignment("amount").is_err());
        assert!(parse_assignment("=5").is_err());
    }

    #[test]
    fn amounts_render_in_major_units() {
        assert_eq!(format_amount(122_000), "1220.00");
        assert_eq!(format_amount(-5), "-0.05");
        assert_eq!(format_amount(0), "0.00");
    }

    #[test]
    fn resolutions_merge_flags_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolutions.json");
        std::fs::write(
            &path,
            json!([{"record_id": "r-3", "strategy": {"strategy": "manual", "values": {"amount": 7}}}])
                .to_string(),
        )
        .unwrap();

        let resolutions =
            collect_resolutions(&["r-1".into()], &["r-2".into()], Some(&path)).unwrap();
        assert_eq!(resolutions.len(), 3);
        assert_eq!(resolutions[0], ConflictResolution::keep_mine(RecordId::from("r-1")));
        assert_eq!(
            resolutions[2],
            ConflictResolution::manual(RecordId::from("r-3"), Snapshot::new().with("amount", 7))
        );
    }

    #[tokio::test]
    async fn session_commands_round_trip() {
        let ctx = ctx();
        let dir = tempfile::tempdir().unwrap();

        let imported = cmd_import(&ctx, &write_fields(dir.path(), 1000))
            .await
            .unwrap();
        let session = cmd_session_open(&ctx, Some("June".into())).await.unwrap();
        let sid = session.id.as_str();

        let created = cmd_record_create(&ctx, sid, &write_fields(dir.path(), 50))
            .await
            .unwrap();
        cmd_record_update(&ctx, sid, imported.id.as_str(), &["amount=1500".into()])
            .await
            .unwrap();
        cmd_undo(&ctx, sid).await.unwrap();
        cmd_redo(&ctx, sid).await.unwrap();
        cmd_session_show(&ctx, sid).await.unwrap();

        let result = cmd_commit(&ctx, sid, Some("june close".into()))
            .await
            .unwrap();
        assert_eq!(result.changes_committed, 2);
        assert_eq!(result.operations_committed, 2);
        assert!(result.versions.iter().any(|v| v.record_id == created.id));

        cmd_history(&ctx, imported.id.as_str()).await.unwrap();
        cmd_restore(&ctx, imported.id.as_str(), 1, None).await.unwrap();
        cmd_record_list(&ctx, true).await.unwrap();
    }

    #[tokio::test]
    async fn commit_conflict_surfaces_as_error() {
        let ctx = ctx();
        let dir = tempfile::tempdir().unwrap();
        let record = cmd_import(&ctx, &write_fields(dir.path(), 10)).await.unwrap();

        let a = cmd_session_open(&ctx, None).await.unwrap();
        let b = cmd_session_open(&ctx, None).await.unwrap();
        cmd_record_update(&ctx, a.id.as_str(), record.id.as_str(), &["amount=11".into()])
            .await
            .unwrap();
        cmd_record_update(&ctx, b.id.as_str(), record.id.as_str(), &["amount=12".into()])
            .await
            .unwrap();
        cmd_commit(&ctx, b.id.as_str(), None).await.unwrap();

        let err = cmd_commit(&ctx, a.id.as_str(), None).await.unwrap_err();
        assert!(err.to_string().contains("conflict"));

        let resolved = cmd_resolve(
            &ctx,
            a.id.as_str(),
            vec![ConflictResolution::keep_theirs(record.id.clone())],
            None,
        )
        .await
        .unwrap();
        assert_eq!(resolved.changes_committed, 1);
    }

    #[tokio::test]
    async fn reap_discards_only_idle_sessions() {
        let ctx = ctx();
        let session = cmd_session_open(&ctx, None).await.unwrap();

        let reaped = cmd_reap(&ctx, 60).await.unwrap();
        assert!(reaped.is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let reaped = cmd_reap(&ctx, 0).await.unwrap();
        assert_eq!(reaped, vec![session.id.clone()]);
        let status = ctx.engine.get_session(&session.id).await.unwrap().status;
        assert_eq!(status, SessionStatus::Discarded);
    }

    #[tokio::test]
    async fn rollback_command_reports_changed_records() {
        let ctx = ctx();
        let dir = tempfile::tempdir().unwrap();
        let first = cmd_import(&ctx, &write_fields(dir.path(), 1)).await.unwrap();
        let marker = ctx.engine.record_history(&first.id).await.unwrap()[0]
            .entry
            .id
            .clone();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let later = cmd_import(&ctx, &write_fields(dir.path(), 2)).await.unwrap();

        let changed = cmd_rollback(&ctx, marker.as_str()).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, later.id);
        assert!(changed[0].is_deleted());
    }
}
