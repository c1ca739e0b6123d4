//! Selection-driven template optimization.
//!
//! Every recorded option choice (a) lands in the selection log, (b) nudges
//! the user's style preference weights, and (c) folds a success observation
//! into the matching template's moving-average score. All of this is
//! best-effort learning: callers log failures and move on.

use galchat_core::dialog::option::DialogOption;
use galchat_core::error::Result;
use galchat_core::selection::{SelectionLog, SelectionRecord};
use galchat_core::template::TemplateRepository;
use galchat_core::user::{PREFERENCE_MAX, UserProfile, UserRepository};
use std::sync::Arc;

/// Increment applied to a preference weight per matching selection.
const PREFERENCE_STEP: f32 = 0.1;

pub struct TemplateOptimizer {
    users: Arc<dyn UserRepository>,
    templates: Arc<dyn TemplateRepository>,
    log: Arc<dyn SelectionLog>,
}

impl TemplateOptimizer {
    pub fn new(
        users: Arc<dyn UserRepository>,
        templates: Arc<dyn TemplateRepository>,
        log: Arc<dyn SelectionLog>,
    ) -> Self {
        Self {
            users,
            templates,
            log,
        }
    }

    /// Records one option selection and updates the derived statistics.
    pub async fn record_selection(
        &self,
        session_id: &str,
        user_id: &str,
        option: &DialogOption,
    ) -> Result<()> {
        self.log
            .record_selection(SelectionRecord::new(
                session_id,
                option.id,
                &option.text,
                user_id,
            ))
            .await?;

        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .unwrap_or_else(|| UserProfile::new(user_id));
        nudge_preferences(&mut user, &option.style);
        self.users.save(&user).await?;

        // Picking an option counts as a success for the template behind its
        // style; templates that produced nothing picked decay over time.
        if let Some(mut template) = self.templates.best_for_style(&option.style).await? {
            template.observe(true);
            self.templates.save(&template).await?;
        }

        Ok(())
    }
}

fn nudge_preferences(user: &mut UserProfile, style: &str) {
    if style.contains("幽默") || style.contains("氛围") {
        user.preferences.humor_level =
            (user.preferences.humor_level + PREFERENCE_STEP).min(PREFERENCE_MAX);
    }
    if style.contains("冷") || style.contains("疏离") {
        user.preferences.cold_level =
            (user.preferences.cold_level + PREFERENCE_STEP).min(PREFERENCE_MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use galchat_core::dialog::option::OptionLabel;
    use galchat_core::selection::FeedbackRecord;
    use galchat_core::template::PromptTemplate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        selections: Mutex<Vec<SelectionRecord>>,
        users: Mutex<HashMap<String, UserProfile>>,
        templates: Mutex<Vec<PromptTemplate>>,
    }

    #[async_trait]
    impl SelectionLog for InMemoryStore {
        async fn record_selection(&self, record: SelectionRecord) -> Result<()> {
            self.selections.lock().unwrap().push(record);
            Ok(())
        }

        async fn record_feedback(&self, _record: FeedbackRecord) -> Result<()> {
            Ok(())
        }

        async fn selection_count(&self, user_id: &str) -> Result<usize> {
            Ok(self
                .selections
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .count())
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryStore {
        async fn find_by_id(&self, user_id: &str) -> Result<Option<UserProfile>> {
            Ok(self.users.lock().unwrap().get(user_id).cloned())
        }

        async fn save(&self, user: &UserProfile) -> Result<()> {
            self.users
                .lock()
                .unwrap()
                .insert(user.id.clone(), user.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl TemplateRepository for InMemoryStore {
        async fn best_for_style(&self, style: &str) -> Result<Option<PromptTemplate>> {
            Ok(self
                .templates
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.is_active && t.style == style)
                .cloned()
                .max_by(|a, b| {
                    a.success_rate
                        .partial_cmp(&b.success_rate)
                        .unwrap_or(std::cmp::Ordering::Equal)
                }))
        }

        async fn save(&self, template: &PromptTemplate) -> Result<()> {
            let mut templates = self.templates.lock().unwrap();
            if let Some(existing) = templates.iter_mut().find(|t| t.id == template.id) {
                *existing = template.clone();
            } else {
                templates.push(template.clone());
            }
            Ok(())
        }
    }

    fn humorous_option() -> DialogOption {
        let mut option = DialogOption::new(OptionLabel::B, "不在，在的是我的替身");
        option.style = "氛围调节者".to_string();
        option
    }

    #[tokio::test]
    async fn test_selection_recorded_and_preferences_nudged() {
        let store = Arc::new(InMemoryStore::default());
        let optimizer =
            TemplateOptimizer::new(store.clone(), store.clone(), store.clone());

        optimizer
            .record_selection("s1", "u1", &humorous_option())
            .await
            .unwrap();

        assert_eq!(store.selection_count("u1").await.unwrap(), 1);
        let user = store.find_by_id("u1").await.unwrap().unwrap();
        assert!((user.preferences.humor_level - 5.1).abs() < 1e-6);
        assert_eq!(user.preferences.cold_level, 5.0);
    }

    #[tokio::test]
    async fn test_preference_weight_is_capped() {
        let store = Arc::new(InMemoryStore::default());
        let optimizer =
            TemplateOptimizer::new(store.clone(), store.clone(), store.clone());

        let mut user = UserProfile::new("u1");
        user.preferences.humor_level = PREFERENCE_MAX;
        UserRepository::save(store.as_ref(), &user).await.unwrap();

        optimizer
            .record_selection("s1", "u1", &humorous_option())
            .await
            .unwrap();

        let user = store.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.preferences.humor_level, PREFERENCE_MAX);
    }

    #[tokio::test]
    async fn test_template_success_rate_updated() {
        let store = Arc::new(InMemoryStore::default());
        let optimizer =
            TemplateOptimizer::new(store.clone(), store.clone(), store.clone());

        let mut template = PromptTemplate::new("氛围调节者", "template body");
        template.success_rate = 0.5;
        let template_id = template.id.clone();
        TemplateRepository::save(store.as_ref(), &template).await.unwrap();

        optimizer
            .record_selection("s1", "u1", &humorous_option())
            .await
            .unwrap();

        let templates = store.templates.lock().unwrap();
        let updated = templates.iter().find(|t| t.id == template_id).unwrap();
        assert!((updated.success_rate - 0.55).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_cold_style_nudges_cold_level() {
        let store = Arc::new(InMemoryStore::default());
        let optimizer =
            TemplateOptimizer::new(store.clone(), store.clone(), store.clone());

        let mut option = DialogOption::new(OptionLabel::D, "嗯。");
        option.style = "疏离观察家".to_string();
        optimizer
            .record_selection("s1", "u1", &option)
            .await
            .unwrap();

        let user = store.find_by_id("u1").await.unwrap().unwrap();
        assert!((user.preferences.cold_level - 5.1).abs() < 1e-6);
        assert_eq!(user.preferences.humor_level, 5.0);
    }
}
