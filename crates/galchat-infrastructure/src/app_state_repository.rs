//! File-backed application state (active session tracking).

use async_trait::async_trait;
use galchat_core::error::Result;
use galchat_core::session::StateRepository;
use std::fs;
use std::path::{Path, PathBuf};

/// Stores the active session ID in a plain text file next to the sessions
/// directory.
pub struct FileStateRepository {
    base_dir: PathBuf,
}

impl FileStateRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn active_file(&self) -> PathBuf {
        self.base_dir.join("active_session.txt")
    }
}

#[async_trait]
impl StateRepository for FileStateRepository {
    async fn get_active_session(&self) -> Option<String> {
        let path = self.active_file();
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read active session file: {}", e);
                None
            }
        }
    }

    async fn set_active_session(&self, session_id: String) -> Result<()> {
        fs::write(self.active_file(), session_id)?;
        Ok(())
    }

    async fn clear_active_session(&self) -> Result<()> {
        let path = self.active_file();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}
