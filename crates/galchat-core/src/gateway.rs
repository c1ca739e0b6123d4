//! Chat backend seam for the AI gateway layer.
//!
//! The concrete HTTP agents live in `galchat-interaction`; this module holds
//! the trait and wire types so the application layer can depend on the seam
//! without a circular crate dependency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Role of a single turn sent to the chat-completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl TurnRole {
    /// Wire form used by the chat-completions request body.
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::System => "system",
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One turn of the bounded context window sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Typed failures from the AI gateway.
///
/// Only `Cancelled` is treated as a silent no-op by callers; every other
/// variant surfaces as a user-visible error without touching session state.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No response from the upstream service (connect/DNS/transport failure)
    #[error("Network error: {0}")]
    Network(String),

    /// The configured request timeout was exceeded
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Upstream answered with a non-2xx status
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// The caller aborted the request
    #[error("Request cancelled")]
    Cancelled,

    /// Upstream answered 2xx but the body was not in the expected shape
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// An abstract chat-completion backend.
///
/// Implementations wrap one upstream LLM HTTP API. A call either returns the
/// raw text of the first completion choice or a typed `GatewayError`; parsing
/// that text into dialogue options is the caller's concern.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends the given turns upstream and returns the raw completion text.
    ///
    /// The `cancel` token is advisory for the transport: implementations
    /// must return `GatewayError::Cancelled` promptly once it fires, even
    /// if the underlying request has not finished.
    async fn complete(
        &self,
        turns: Vec<ChatTurn>,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, GatewayError>;
}
