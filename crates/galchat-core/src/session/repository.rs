//! Session persistence traits.
//!
//! These traits decouple the application's core logic from the specific
//! storage mechanism (flat JSON files, database, remote API). Persistence is
//! best-effort sync for the UI: the in-memory session list is the source of
//! truth, so callers may swallow remote failures.

use super::model::Session;
use crate::error::Result;
use async_trait::async_trait;

/// An abstract repository for managing session persistence.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Finds a session by its ID.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Session))`: Session found
    /// - `Ok(None)`: Session not found
    /// - `Err(_)`: Error occurred during retrieval
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>>;

    /// Saves a session to storage, overwriting any previous version.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Deletes a session from storage. Deleting a missing session is not an
    /// error.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Lists all stored sessions, most recently updated first.
    async fn list_all(&self) -> Result<Vec<Session>>;

    /// Removes a single message from a stored session.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the message existed and was removed, `Ok(false)` if
    /// either the session or the message was absent.
    async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<bool>;
}

/// Application-level state shared across sessions (active session tracking).
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Returns the ID of the currently active session, if any.
    async fn get_active_session(&self) -> Option<String>;

    /// Sets the active session ID.
    async fn set_active_session(&self, session_id: String) -> Result<()>;

    /// Clears the active session ID.
    async fn clear_active_session(&self) -> Result<()>;
}
