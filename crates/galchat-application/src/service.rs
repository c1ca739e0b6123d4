//! Multi-session coordination.
//!
//! `AdvisorService` owns the in-memory advisor cache, loads and stores
//! sessions through the repository, and tracks which session is active.
//! Sessions are fully isolated from one another: each advisor guards its
//! own state, and nothing mutable is shared across them.

use crate::advisor::DialogueAdvisor;
use galchat_core::config::AdvisorConfig;
use galchat_core::error::{GalError, Result};
use galchat_core::gateway::ChatBackend;
use galchat_core::selection::SelectionLog;
use galchat_core::session::{
    Session, SessionRepository, SessionSummary, StateRepository,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct AdvisorService {
    /// In-memory advisor cache
    advisors: RwLock<HashMap<String, Arc<DialogueAdvisor>>>,
    session_repository: Arc<dyn SessionRepository>,
    state_repository: Arc<dyn StateRepository>,
    backend: Arc<dyn ChatBackend>,
    config: AdvisorConfig,
    selection_log: Option<Arc<dyn SelectionLog>>,
}

impl AdvisorService {
    pub fn new(
        session_repository: Arc<dyn SessionRepository>,
        state_repository: Arc<dyn StateRepository>,
        backend: Arc<dyn ChatBackend>,
        config: AdvisorConfig,
    ) -> Self {
        Self {
            advisors: RwLock::new(HashMap::new()),
            session_repository,
            state_repository,
            backend,
            config,
            selection_log: None,
        }
    }

    /// Attaches a selection/feedback log passed on to every advisor.
    pub fn with_selection_log(mut self, log: Arc<dyn SelectionLog>) -> Self {
        self.selection_log = Some(log);
        self
    }

    fn build_advisor(&self, session: Session) -> Result<Arc<DialogueAdvisor>> {
        let mut advisor = DialogueAdvisor::new(
            session,
            self.backend.clone(),
            self.config.clone(),
            self.session_repository.clone(),
        )?;
        if let Some(log) = &self.selection_log {
            advisor = advisor.with_selection_log(log.clone());
        }
        Ok(Arc::new(advisor))
    }

    /// Creates a new empty session, caches its advisor, and makes it active.
    pub async fn create_session(&self) -> Result<Arc<DialogueAdvisor>> {
        let session = Session::new();
        let session_id = session.id.clone();
        self.session_repository.save(&session).await?;

        let advisor = self.build_advisor(session)?;
        self.advisors
            .write()
            .await
            .insert(session_id.clone(), advisor.clone());

        self.state_repository.set_active_session(session_id).await?;
        Ok(advisor)
    }

    /// Opens a session: from the cache when loaded, from storage otherwise.
    /// The opened session becomes active.
    pub async fn open_session(&self, session_id: &str) -> Result<Arc<DialogueAdvisor>> {
        if let Some(advisor) = self.advisors.read().await.get(session_id).cloned() {
            self.state_repository
                .set_active_session(session_id.to_string())
                .await?;
            return Ok(advisor);
        }

        let session = self
            .session_repository
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| GalError::not_found("session", session_id))?;

        let advisor = self.build_advisor(session)?;
        self.advisors
            .write()
            .await
            .insert(session_id.to_string(), advisor.clone());

        self.state_repository
            .set_active_session(session_id.to_string())
            .await?;
        Ok(advisor)
    }

    /// Restores the last active session on startup, if one is recorded.
    pub async fn restore_last_session(&self) -> Result<Option<Arc<DialogueAdvisor>>> {
        let Some(session_id) = self.state_repository.get_active_session().await else {
            return Ok(None);
        };
        match self.open_session(&session_id).await {
            Ok(advisor) => Ok(Some(advisor)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns the currently active advisor, if any is loaded.
    pub async fn active_session(&self) -> Option<Arc<DialogueAdvisor>> {
        let session_id = self.state_repository.get_active_session().await?;
        self.advisors.read().await.get(&session_id).cloned()
    }

    pub async fn active_session_id(&self) -> Option<String> {
        self.state_repository.get_active_session().await
    }

    /// Lists stored sessions as sidebar summaries, most recent first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.session_repository.list_all().await?;
        Ok(sessions.iter().map(Session::summary).collect())
    }

    /// Deletes a session from memory and storage, clearing the active
    /// marker when it pointed at the removed session.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.advisors.write().await.remove(session_id);
        self.session_repository.delete(session_id).await?;

        if self.state_repository.get_active_session().await.as_deref() == Some(session_id) {
            self.state_repository.clear_active_session().await?;
        }
        Ok(())
    }

    /// Renames a session, in memory when loaded and always in storage.
    pub async fn rename_session(&self, session_id: &str, new_title: String) -> Result<()> {
        if let Some(advisor) = self.advisors.read().await.get(session_id).cloned() {
            advisor.rename(new_title).await;
            return Ok(());
        }

        let mut session = self
            .session_repository
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| GalError::not_found("session", session_id))?;
        session.title = new_title;
        session.updated_at = chrono::Utc::now().to_rfc3339();
        self.session_repository.save(&session).await
    }
}
