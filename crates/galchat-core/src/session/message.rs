//! Chat message types.
//!
//! A session's history is an ordered list of `ChatMessage` values. Messages
//! are immutable once appended except for the selection and feedback patches
//! applied by the dialogue advisor.

use crate::dialog::option::{DialogOption, OptionLabel};
use serde::{Deserialize, Serialize};

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user (including option selections).
    User,
    /// Message from the AI assistant.
    Assistant,
    /// System-generated message (scene notes, warnings).
    System,
}

/// Kind of a chat message, driving how the UI renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text content.
    Text,
    /// An assistant message carrying generated dialogue options.
    Options,
    /// The user's choice among a previous options message.
    Selection,
    /// Transient "thinking" placeholder while a generation is in flight.
    Thinking,
    /// Rapid-fire multi-line user input rendered as separate bubbles.
    Burst,
}

/// User feedback attached to an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
}

/// Maps a feedback state to the training weight recorded with it.
///
/// `None` means feedback was cleared and restores the neutral weight.
pub fn training_weight(feedback: Option<Feedback>) -> f32 {
    match feedback {
        Some(Feedback::Like) => 2.0,
        Some(Feedback::Dislike) => 0.0,
        None => 1.0,
    }
}

/// A single message in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier (UUID format)
    pub id: String,
    pub role: MessageRole,
    pub kind: MessageKind,
    /// Text content; for `Options` messages this holds the scene summary.
    pub content: String,
    /// Timestamp when the message was created (ISO 8601 format)
    pub timestamp: String,
    /// Generated options, present only on `Options` messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<DialogOption>,
    /// Label of the chosen option once the user picks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<OptionLabel>,
    /// Text of the chosen option, denormalized for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    /// Individual lines of a `Burst` message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub burst_lines: Vec<String>,
}

impl ChatMessage {
    fn new(role: MessageRole, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            kind,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            options: Vec::new(),
            selected_option_id: None,
            selected_text: None,
            feedback: None,
            burst_lines: Vec::new(),
        }
    }

    /// Plain user input.
    pub fn user_text(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, MessageKind::Text, content)
    }

    /// System note (scene summaries, degradation warnings).
    pub fn system_text(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, MessageKind::Text, content)
    }

    /// Assistant message carrying generated options; `content` is the scene
    /// summary recovered by the parser.
    pub fn assistant_options(scene_summary: impl Into<String>, options: Vec<DialogOption>) -> Self {
        let mut message = Self::new(MessageRole::Assistant, MessageKind::Options, scene_summary);
        message.options = options;
        message
    }

    /// The user's recorded choice, with the chosen option text as content.
    pub fn selection(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, MessageKind::Selection, content)
    }

    /// Multi-line rapid input; content joins the lines for the AI request.
    pub fn burst(lines: Vec<String>) -> Self {
        let mut message = Self::new(MessageRole::User, MessageKind::Burst, lines.join("\n"));
        message.burst_lines = lines;
        message
    }

    /// True for an `Options` message whose choice has not been made yet.
    pub fn is_pending_options(&self) -> bool {
        self.kind == MessageKind::Options && self.selected_option_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_weight_mapping() {
        assert_eq!(training_weight(Some(Feedback::Like)), 2.0);
        assert_eq!(training_weight(Some(Feedback::Dislike)), 0.0);
        assert_eq!(training_weight(None), 1.0);
    }

    #[test]
    fn test_burst_joins_lines() {
        let message = ChatMessage::burst(vec!["在吗".to_string(), "在忙什么".to_string()]);
        assert_eq!(message.content, "在吗\n在忙什么");
        assert_eq!(message.burst_lines.len(), 2);
        assert_eq!(message.kind, MessageKind::Burst);
        assert_eq!(message.role, MessageRole::User);
    }

    #[test]
    fn test_pending_options_detection() {
        let mut message = ChatMessage::assistant_options("summary", Vec::new());
        assert!(message.is_pending_options());

        message.selected_option_id = Some(OptionLabel::A);
        assert!(!message.is_pending_options());
    }
}
