//! Session lifecycle: open, lookup, notes and idle detection.

use chrono::{Duration, Utc};
use tracing::instrument;

use ledger_state::{
    Actor, NoteRole, Operation, SessionId, SessionNote, SessionRecord, SessionStatus,
    StorageError, WorkspaceId,
};

use super::SessionEngine;
use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::obs;

impl SessionEngine {
    /// Open a new active session for `owner`.
    #[instrument(skip(self, owner), fields(owner_id = %owner.id))]
    pub async fn open_session(
        &self,
        workspace_id: &WorkspaceId,
        owner: Actor,
        title: Option<String>,
    ) -> Result<SessionRecord> {
        let session = SessionRecord::new(workspace_id.clone(), owner, title);
        self.sessions.create_session(&session).await?;
        self.append_note(
            &session.id,
            NoteRole::System,
            format!("Session '{}' created", session.display_title()),
        )
        .await?;

        obs::emit_session_opened(
            session.id.as_str(),
            workspace_id.as_str(),
            &session.owner.id,
        );
        METRICS.inc_sessions_opened();
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &SessionId) -> Result<SessionRecord> {
        Ok(self.sessions.get_session(session_id).await?)
    }

    /// Sessions of a workspace, newest first.
    pub async fn list_sessions(
        &self,
        workspace_id: &WorkspaceId,
        status: Option<SessionStatus>,
        owner_id: Option<&str>,
    ) -> Result<Vec<SessionRecord>> {
        Ok(self
            .sessions
            .list_sessions(workspace_id, status, owner_id)
            .await?)
    }

    /// The session's operation log, ascending by sequence.
    pub async fn operations(&self, session_id: &SessionId) -> Result<Vec<Operation>> {
        Ok(self.sessions.operations(session_id).await?)
    }

    pub async fn notes(&self, session_id: &SessionId) -> Result<Vec<SessionNote>> {
        Ok(self.sessions.notes(session_id).await?)
    }

    /// Append a user note to an active session.
    pub async fn add_note(
        &self,
        session_id: &SessionId,
        content: impl Into<String>,
    ) -> Result<SessionNote> {
        let mut session = self.active_session(session_id).await?;
        let note = self
            .append_note(session_id, NoteRole::User, content.into())
            .await?;
        self.touch(&mut session).await?;
        Ok(note)
    }

    /// Active sessions whose last activity is older than `idle_for`.
    pub async fn idle_sessions(
        &self,
        workspace_id: &WorkspaceId,
        idle_for: Duration,
    ) -> Result<Vec<SessionRecord>> {
        let cutoff = Utc::now() - idle_for;
        let active = self
            .sessions
            .list_sessions(workspace_id, Some(SessionStatus::Active), None)
            .await?;
        Ok(active
            .into_iter()
            .filter(|s| s.last_activity < cutoff)
            .collect())
    }

    // -- helpers -------------------------------------------------------------

    /// Fetch a session that may still be mutated.
    pub(super) async fn active_session(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let session = match self.sessions.get_session(session_id).await {
            Ok(session) => session,
            Err(StorageError::SessionNotFound { .. }) => {
                return Err(EngineError::SessionNotActive {
                    session_id: session_id.0.clone(),
                    status: "not found".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if !session.is_active() {
            return Err(EngineError::SessionNotActive {
                session_id: session_id.0.clone(),
                status: session.status.to_string(),
            });
        }
        Ok(session)
    }

    pub(super) async fn append_note(
        &self,
        session_id: &SessionId,
        role: NoteRole,
        content: String,
    ) -> Result<SessionNote> {
        let sequence = self.sessions.notes(session_id).await?.len() as u64 + 1;
        let note = SessionNote {
            session_id: session_id.clone(),
            sequence,
            role,
            content,
            created_at: Utc::now(),
        };
        self.sessions.append_note(&note).await?;
        Ok(note)
    }

    pub(super) async fn touch(&self, session: &mut SessionRecord) -> Result<()> {
        session.last_activity = Utc::now();
        self.sessions.save_session(session).await?;
        Ok(())
    }
}
