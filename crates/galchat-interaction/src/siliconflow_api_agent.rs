//! SiliconFlowApiAgent - Direct REST implementation for the SiliconFlow
//! chat-completions API (OpenAI-compatible).
//!
//! Configuration priority: ~/.config/galchat/secret.json > environment variables

use crate::config::load_secret_config;
use async_trait::async_trait;
use galchat_core::config::AdvisorConfig;
use galchat_core::gateway::{ChatBackend, ChatTurn, GatewayError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_SILICONFLOW_MODEL: &str = "deepseek-ai/DeepSeek-V3";
const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";

/// Agent implementation that talks to the SiliconFlow HTTP API.
#[derive(Clone)]
pub struct SiliconFlowApiAgent {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

impl SiliconFlowApiAgent {
    /// Creates a new agent with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            temperature: 0.8,
            max_tokens: 800,
            top_p: 0.9,
        }
    }

    /// Loads configuration from ~/.config/galchat/secret.json or environment
    /// variables.
    ///
    /// Priority:
    /// 1. ~/.config/galchat/secret.json
    /// 2. Environment variables (SILICONFLOW_API_KEY, GALCHAT_MODEL)
    ///
    /// Model name defaults to `deepseek-ai/DeepSeek-V3` if not specified.
    pub fn try_from_env() -> Result<Self, GatewayError> {
        if let Ok(secret_config) = load_secret_config() {
            if let Some(sf_config) = secret_config.siliconflow {
                let model = sf_config
                    .model_name
                    .unwrap_or_else(|| DEFAULT_SILICONFLOW_MODEL.into());
                return Ok(Self::new(sf_config.api_key, model));
            }
        }

        let api_key = env::var("SILICONFLOW_API_KEY").map_err(|_| {
            GatewayError::Network(
                "SILICONFLOW_API_KEY not found in ~/.config/galchat/secret.json or environment variables"
                    .into(),
            )
        })?;

        let model = env::var("GALCHAT_MODEL").unwrap_or_else(|_| DEFAULT_SILICONFLOW_MODEL.into());
        Ok(Self::new(api_key, model))
    }

    /// Applies the advisor configuration (model, base URL, timeout, sampling).
    pub fn with_config(mut self, config: &AdvisorConfig) -> Self {
        self.model = config.model.clone();
        self.base_url = config.base_url.clone();
        self.timeout = Duration::from_secs(config.timeout_secs);
        self.temperature = config.temperature;
        self.max_tokens = config.max_tokens;
        self.top_p = config.top_p;
        self
    }

    /// Overrides the model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(&self, turns: &[ChatTurn]) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: turns
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role.as_str(),
                    content: turn.content.clone(),
                })
                .collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        }
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|err| map_transport_error(err, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read upstream error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl ChatBackend for SiliconFlowApiAgent {
    async fn complete(
        &self,
        turns: Vec<ChatTurn>,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let request = self.build_request(&turns);

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("SiliconFlow request cancelled before completion");
                Err(GatewayError::Cancelled)
            }
            result = self.send_request(&request) => result,
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String, GatewayError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            GatewayError::InvalidResponse("upstream returned no content in the response".into())
        })
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(timeout.as_secs())
    } else {
        GatewayError::Network(err.to_string())
    }
}

fn map_http_error(status: StatusCode, body: String) -> GatewayError {
    // Upstream wraps messages in {"error": {"message": ...}}; fall back to
    // the raw body when it doesn't.
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    GatewayError::Upstream {
        status: status.as_u16(),
        body: message,
    }
}
