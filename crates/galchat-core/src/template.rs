//! Prompt template records and their success tracking.
//!
//! Templates are scored by an exponential moving average of whether the
//! user actually picked one of the options they produced; the best-scoring
//! active template for a style wins.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// EMA learning rate for success-rate updates.
pub const SUCCESS_RATE_ALPHA: f32 = 0.1;

/// One stored prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    /// Style this template targets (e.g. "gentle", "humorous")
    pub style: String,
    /// The prompt body with `{{scene}}`-style placeholders
    pub body: String,
    /// Moving-average success rate in 0.0..=1.0
    pub success_rate: f32,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl PromptTemplate {
    pub fn new(style: impl Into<String>, body: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            style: style.into(),
            body: body.into(),
            success_rate: 0.5,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Folds one observation into the moving-average success rate.
    pub fn observe(&mut self, success: bool) {
        let score = if success { 1.0 } else { 0.0 };
        self.success_rate = (1.0 - SUCCESS_RATE_ALPHA) * self.success_rate + SUCCESS_RATE_ALPHA * score;
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Persistence for prompt templates.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Returns the active template with the highest success rate for the
    /// given style, if any exists.
    async fn best_for_style(&self, style: &str) -> Result<Option<PromptTemplate>>;

    async fn save(&self, template: &PromptTemplate) -> Result<()>;
}
