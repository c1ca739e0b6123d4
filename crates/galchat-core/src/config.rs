//! Advisor configuration knobs.
//!
//! Everything here can be supplied via environment variables; secrets
//! (API keys) are handled separately by the interaction layer.

use serde::{Deserialize, Serialize};
use std::env;

/// Smallest accepted history window.
pub const MEMORY_WINDOW_MIN: usize = 8;
/// Largest accepted history window.
pub const MEMORY_WINDOW_MAX: usize = 32;

/// Tunable parameters for dialogue generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Upstream model identifier
    pub model: String,
    /// Base URL of the chat-completions endpoint
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of history messages sent with a request (clamped to 8..=32)
    pub memory_max: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-ai/DeepSeek-V3".to_string(),
            base_url: "https://api.siliconflow.cn/v1".to_string(),
            timeout_secs: 120,
            memory_max: 12,
            temperature: 0.8,
            max_tokens: 800,
            top_p: 0.9,
        }
    }
}

impl AdvisorConfig {
    /// Builds a configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// Recognized variables: `GALCHAT_MODEL`, `GALCHAT_BASE_URL`,
    /// `GALCHAT_TIMEOUT_SECS`, `GALCHAT_MEMORY_MAX`, `GALCHAT_TEMPERATURE`,
    /// `GALCHAT_MAX_TOKENS`, `GALCHAT_TOP_P`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model: env::var("GALCHAT_MODEL").unwrap_or(defaults.model),
            base_url: env::var("GALCHAT_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: parse_env("GALCHAT_TIMEOUT_SECS", defaults.timeout_secs),
            memory_max: clamp_memory_window(parse_env("GALCHAT_MEMORY_MAX", defaults.memory_max)),
            temperature: parse_env("GALCHAT_TEMPERATURE", defaults.temperature),
            max_tokens: parse_env("GALCHAT_MAX_TOKENS", defaults.max_tokens),
            top_p: parse_env("GALCHAT_TOP_P", defaults.top_p),
        }
    }

    /// Returns the effective history window, clamped to the supported range.
    pub fn memory_window(&self) -> usize {
        clamp_memory_window(self.memory_max)
    }
}

/// Clamps a requested history window into the supported 8..=32 range.
pub fn clamp_memory_window(requested: usize) -> usize {
    requested.clamp(MEMORY_WINDOW_MIN, MEMORY_WINDOW_MAX)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
