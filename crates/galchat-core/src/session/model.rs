//! Session domain model.
//!
//! This module contains the core Session entity that represents one ongoing
//! conversation thread with its own message history.

use super::message::{ChatMessage, MessageKind, MessageRole};
use serde::{Deserialize, Serialize};

/// Maximum number of characters of the first user message used as a title.
const TITLE_MAX_CHARS: usize = 18;

/// Default title before any user message exists.
pub const DEFAULT_SESSION_TITLE: &str = "新对话";

/// One conversation thread.
///
/// The message list is append-only except for targeted deletion of a single
/// message. Sessions are never merged with one another; each is owned by
/// exactly one advisor at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Human-readable session title, derived from the first user message
    pub title: String,
    /// Timestamp when the session was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format)
    pub updated_at: String,
    /// Ordered conversation history
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Lightweight listing entry for the session sidebar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub last_message: String,
    pub timestamp: String,
}

impl Session {
    /// Creates an empty session with a fresh UUID and the default title.
    pub fn new() -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            created_at: now.clone(),
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Appends a message, refreshing `updated_at` and the derived title.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = chrono::Utc::now().to_rfc3339();
        self.refresh_title();
    }

    /// Removes the message with the given id. Returns whether it existed.
    ///
    /// Downstream messages referencing the removed one may become orphaned;
    /// that is acceptable.
    pub fn remove_message(&mut self, message_id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != message_id);
        let removed = self.messages.len() < before;
        if removed {
            self.updated_at = chrono::Utc::now().to_rfc3339();
        }
        removed
    }

    /// Returns the most recent `Options` message if it still awaits a
    /// selection.
    ///
    /// Only the newest options message is ever selectable: once a fresh
    /// round is generated, an earlier unanswered one stops being pending,
    /// which keeps at most one pending options message per session.
    pub fn pending_options(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Options)
            .filter(|m| m.is_pending_options())
    }

    /// Mutable variant of [`Session::pending_options`].
    pub fn pending_options_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.kind == MessageKind::Options)
            .filter(|m| m.is_pending_options())
    }

    /// Finds a message by id.
    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Builds the sidebar summary for this session.
    pub fn summary(&self) -> SessionSummary {
        let last_message = self
            .messages
            .iter()
            .rev()
            .find(|m| !m.content.is_empty())
            .map(|m| m.content.clone())
            .unwrap_or_default();
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            last_message,
            timestamp: self.updated_at.clone(),
        }
    }

    /// Derives the title from the first user-role message, truncated to a
    /// display-friendly length on a character boundary.
    fn refresh_title(&mut self) {
        if let Some(first_user) = self
            .messages
            .iter()
            .find(|m| m.role == MessageRole::User && !m.content.is_empty())
        {
            self.title = first_user.content.chars().take(TITLE_MAX_CHARS).collect();
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
