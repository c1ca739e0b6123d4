//! JSON-based SessionRepository implementation.

use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use galchat_core::error::{GalError, Result};
use galchat_core::session::{Session, SessionRepository};
use std::fs;
use std::path::{Path, PathBuf};

/// A repository implementation storing each session as its own JSON file.
///
/// ```text
/// base_dir/
/// └── sessions/
///     ├── <session-id-1>.json
///     └── <session-id-2>.json
/// ```
pub struct JsonSessionRepository {
    base_dir: PathBuf,
}

impl JsonSessionRepository {
    /// Creates a new repository rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory structure cannot be created.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        let sessions_dir = base_dir.join("sessions");
        fs::create_dir_all(&sessions_dir)?;

        Ok(Self { base_dir })
    }

    /// Creates a repository at the default location (~/.galchat).
    pub fn default_location() -> Result<Self> {
        let home_dir =
            dirs::home_dir().ok_or_else(|| GalError::config("Failed to get home directory"))?;
        Self::new(home_dir.join(".galchat"))
    }

    fn session_file(&self, session_id: &str) -> AtomicJsonFile<Session> {
        AtomicJsonFile::new(
            self.base_dir
                .join("sessions")
                .join(format!("{}.json", session_id)),
        )
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.base_dir
            .join("sessions")
            .join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl SessionRepository for JsonSessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        self.session_file(session_id).load()
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.session_file(&session.id).save(session)
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        let sessions_dir = self.base_dir.join("sessions");
        let mut sessions = Vec::new();

        for entry in fs::read_dir(&sessions_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                match AtomicJsonFile::<Session>::new(path.clone()).load() {
                    Ok(Some(session)) => sessions.push(session),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Skipping unreadable session file {:?}: {}", path, e);
                    }
                }
            }
        }

        // Most recently updated first
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(sessions)
    }

    async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<bool> {
        let file = self.session_file(session_id);
        let Some(mut session) = file.load()? else {
            return Ok(false);
        };

        let removed = session.remove_message(message_id);
        if removed {
            file.save(&session)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galchat_core::session::ChatMessage;
    use tempfile::TempDir;

    fn create_test_session(title_seed: &str) -> Session {
        let mut session = Session::new();
        session.push_message(ChatMessage::user_text(title_seed));
        session
    }

    #[tokio::test]
    async fn test_save_and_find_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let repository = JsonSessionRepository::new(temp_dir.path()).unwrap();

        let session = create_test_session("对方说：在吗");
        repository.save(&session).await.unwrap();

        let loaded = repository.find_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.title, session.title);
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let repository = JsonSessionRepository::new(temp_dir.path()).unwrap();
        assert!(repository.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_all_sorted_by_update() {
        let temp_dir = TempDir::new().unwrap();
        let repository = JsonSessionRepository::new(temp_dir.path()).unwrap();

        let mut first = create_test_session("第一个");
        let mut second = create_test_session("第二个");
        first.updated_at = "2024-01-01T00:00:00Z".to_string();
        second.updated_at = "2024-06-01T00:00:00Z".to_string();

        repository.save(&first).await.unwrap();
        repository.save(&second).await.unwrap();

        let sessions = repository.list_all().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, second.id);
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let repository = JsonSessionRepository::new(temp_dir.path()).unwrap();

        let session = create_test_session("要删除的");
        repository.save(&session).await.unwrap();
        assert!(repository.find_by_id(&session.id).await.unwrap().is_some());

        repository.delete(&session.id).await.unwrap();
        assert!(repository.find_by_id(&session.id).await.unwrap().is_none());

        // Deleting again is not an error
        repository.delete(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_message() {
        let temp_dir = TempDir::new().unwrap();
        let repository = JsonSessionRepository::new(temp_dir.path()).unwrap();

        let mut session = Session::new();
        let message = ChatMessage::user_text("hello");
        let message_id = message.id.clone();
        session.push_message(message);
        repository.save(&session).await.unwrap();

        assert!(
            repository
                .delete_message(&session.id, &message_id)
                .await
                .unwrap()
        );
        assert!(
            !repository
                .delete_message(&session.id, &message_id)
                .await
                .unwrap()
        );

        let loaded = repository.find_by_id(&session.id).await.unwrap().unwrap();
        assert!(loaded.messages.is_empty());
    }
}
