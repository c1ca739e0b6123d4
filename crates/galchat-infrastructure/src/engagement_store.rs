//! Flat-file store for the learning collections: user selections, feedback,
//! user profiles, and prompt templates.
//!
//! Each collection lives in its own JSON file under the base directory,
//! mirroring the lowdb layout of the original desktop companion
//! (`users`, `dialog_sessions`, `user_selections`, `templates`).

use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use galchat_core::error::Result;
use galchat_core::selection::{FeedbackRecord, SelectionLog, SelectionRecord};
use galchat_core::template::{PromptTemplate, TemplateRepository};
use galchat_core::user::{UserProfile, UserRepository};
use std::path::{Path, PathBuf};

/// One store handling all learning collections.
pub struct JsonEngagementStore {
    base_dir: PathBuf,
}

impl JsonEngagementStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn selections_file(&self) -> AtomicJsonFile<Vec<SelectionRecord>> {
        AtomicJsonFile::new(self.base_dir.join("user_selections.json"))
    }

    fn feedback_file(&self) -> AtomicJsonFile<Vec<FeedbackRecord>> {
        AtomicJsonFile::new(self.base_dir.join("feedback.json"))
    }

    fn users_file(&self) -> AtomicJsonFile<Vec<UserProfile>> {
        AtomicJsonFile::new(self.base_dir.join("users.json"))
    }

    fn templates_file(&self) -> AtomicJsonFile<Vec<PromptTemplate>> {
        AtomicJsonFile::new(self.base_dir.join("templates.json"))
    }
}

#[async_trait]
impl SelectionLog for JsonEngagementStore {
    async fn record_selection(&self, record: SelectionRecord) -> Result<()> {
        self.selections_file().update(Vec::new(), |records| {
            records.push(record);
            Ok(())
        })
    }

    async fn record_feedback(&self, record: FeedbackRecord) -> Result<()> {
        self.feedback_file().update(Vec::new(), |records| {
            records.push(record);
            Ok(())
        })
    }

    async fn selection_count(&self, user_id: &str) -> Result<usize> {
        let records = self.selections_file().load()?.unwrap_or_default();
        Ok(records.iter().filter(|r| r.user_id == user_id).count())
    }
}

#[async_trait]
impl UserRepository for JsonEngagementStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let users = self.users_file().load()?.unwrap_or_default();
        Ok(users.into_iter().find(|u| u.id == user_id))
    }

    async fn save(&self, user: &UserProfile) -> Result<()> {
        let mut user = user.clone();
        user.updated_at = chrono::Utc::now().to_rfc3339();
        self.users_file().update(Vec::new(), move |users| {
            if let Some(existing) = users.iter_mut().find(|u| u.id == user.id) {
                *existing = user;
            } else {
                users.push(user);
            }
            Ok(())
        })
    }
}

#[async_trait]
impl TemplateRepository for JsonEngagementStore {
    async fn best_for_style(&self, style: &str) -> Result<Option<PromptTemplate>> {
        let templates = self.templates_file().load()?.unwrap_or_default();
        Ok(templates
            .into_iter()
            .filter(|t| t.is_active && t.style == style)
            .max_by(|a, b| {
                a.success_rate
                    .partial_cmp(&b.success_rate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }))
    }

    async fn save(&self, template: &PromptTemplate) -> Result<()> {
        let template = template.clone();
        self.templates_file().update(Vec::new(), move |templates| {
            if let Some(existing) = templates.iter_mut().find(|t| t.id == template.id) {
                *existing = template;
            } else {
                templates.push(template);
            }
            Ok(())
        })
    }
}
