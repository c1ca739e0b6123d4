//! Selection and feedback records.
//!
//! Every time the user picks an option or rates an assistant message, a
//! record is appended to the flat-file store so the template optimizer can
//! learn from it. Recording is best-effort: the session history remains the
//! source of truth for the UI.

use crate::dialog::option::OptionLabel;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One recorded option choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub id: String,
    pub session_id: String,
    pub option_id: OptionLabel,
    /// Text of the chosen option at selection time
    pub option_text: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl SelectionRecord {
    pub fn new(
        session_id: impl Into<String>,
        option_id: OptionLabel,
        option_text: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            option_id,
            option_text: option_text.into(),
            user_id: user_id.into(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One recorded like/dislike/reset on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub message_id: String,
    /// "like", "dislike" or "reset"
    pub feedback: String,
    /// Weight applied when the pair is exported as training data
    pub training_weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl FeedbackRecord {
    pub fn new(
        message_id: impl Into<String>,
        feedback: impl Into<String>,
        training_weight: f32,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.into(),
            feedback: feedback.into(),
            training_weight,
            scene: None,
            response: None,
            user_id: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Append-only log of user selections and feedback.
#[async_trait]
pub trait SelectionLog: Send + Sync {
    async fn record_selection(&self, record: SelectionRecord) -> Result<()>;

    async fn record_feedback(&self, record: FeedbackRecord) -> Result<()>;

    /// Number of selections recorded for the given user.
    async fn selection_count(&self, user_id: &str) -> Result<usize>;
}
