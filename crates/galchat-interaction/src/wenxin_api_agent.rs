//! WenxinApiAgent - REST implementation for the Baidu Wenxin (ERNIE)
//! chat API.
//!
//! Unlike the OpenAI-compatible endpoints, Wenxin authenticates with an IAM
//! access token obtained via OAuth client_credentials and returns the
//! completion in a `result` field. Tokens are cached and refreshed five
//! minutes before expiry.
//!
//! Configuration priority: ~/.config/galchat/secret.json > environment variables

use crate::config::load_secret_config;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use galchat_core::gateway::{ChatBackend, ChatTurn, GatewayError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const TOKEN_URL: &str = "https://aip.baidubce.com/oauth/2.0/token";
const CHAT_URL: &str =
    "https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions";

/// Refresh this long before the reported expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// A cached IAM access token.
#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Agent implementation that talks to the Baidu Wenxin HTTP API.
pub struct WenxinApiAgent {
    client: Client,
    /// Application identity ID, used as OAuth client_id
    api_key: String,
    timeout: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl WenxinApiAgent {
    /// Creates a new agent with the provided application identity ID.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
            token: Mutex::new(None),
        }
    }

    /// Loads configuration from ~/.config/galchat/secret.json or the
    /// WENXIN_API_KEY environment variable.
    pub fn try_from_env() -> Result<Self, GatewayError> {
        if let Ok(secret_config) = load_secret_config() {
            if let Some(wenxin_config) = secret_config.wenxin {
                return Ok(Self::new(wenxin_config.api_key));
            }
        }

        let api_key = env::var("WENXIN_API_KEY").map_err(|_| {
            GatewayError::Network(
                "WENXIN_API_KEY not found in ~/.config/galchat/secret.json or environment variables"
                    .into(),
            )
        })?;
        Ok(Self::new(api_key))
    }

    /// Overrides the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a fresh access token, reusing the cached one when possible.
    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.token.clone());
            }
        }

        tracing::debug!("fetching Wenxin IAM access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(10))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|err| map_transport_error(err, 10))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_token_error(status, body));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        let Some(token) = parsed.access_token else {
            return Err(GatewayError::InvalidResponse(
                "token response contained no access_token".into(),
            ));
        };

        let expires_at = Utc::now()
            + ChronoDuration::seconds((parsed.expires_in - TOKEN_REFRESH_MARGIN_SECS).max(0));
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });

        Ok(token)
    }

    async fn send_request(&self, turns: &[ChatTurn]) -> Result<String, GatewayError> {
        let token = self.access_token().await?;
        let url = format!("{CHAT_URL}?access_token={token}");

        let body = WenxinChatRequest {
            messages: turns
                .iter()
                .map(|turn| WenxinMessage {
                    role: turn.role.as_str(),
                    content: turn.content.clone(),
                })
                .collect(),
            temperature: 0.8,
            top_p: 0.8,
            penalty_score: 1.0,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| map_transport_error(err, self.timeout.as_secs()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: WenxinChatResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        parsed.result.ok_or_else(|| {
            GatewayError::InvalidResponse("upstream returned no result field".into())
        })
    }

    #[cfg(test)]
    async fn seed_token(&self, token: &str, expires_at: DateTime<Utc>) {
        *self.token.lock().await = Some(CachedToken {
            token: token.to_string(),
            expires_at,
        });
    }
}

#[async_trait]
impl ChatBackend for WenxinApiAgent {
    async fn complete(
        &self,
        turns: Vec<ChatTurn>,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Wenxin request cancelled before completion");
                Err(GatewayError::Cancelled)
            }
            result = self.send_request(&turns) => result,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Serialize)]
struct WenxinChatRequest {
    messages: Vec<WenxinMessage>,
    temperature: f32,
    top_p: f32,
    penalty_score: f32,
    stream: bool,
}

#[derive(Serialize)]
struct WenxinMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct WenxinChatResponse {
    result: Option<String>,
}

fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(timeout_secs)
    } else {
        GatewayError::Network(err.to_string())
    }
}

fn map_token_error(status: StatusCode, body: String) -> GatewayError {
    let body = match status.as_u16() {
        401 => "认证失败：应用身份ID无效或已禁用".to_string(),
        429 => "请求频率超限，请稍后重试".to_string(),
        _ => body,
    };
    GatewayError::Upstream {
        status: status.as_u16(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness() {
        let now = Utc::now();
        let fresh = CachedToken {
            token: "t".to_string(),
            expires_at: now + ChronoDuration::seconds(60),
        };
        let stale = CachedToken {
            token: "t".to_string(),
            expires_at: now - ChronoDuration::seconds(1),
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    #[tokio::test]
    async fn test_cached_token_is_reused_without_network() {
        let agent = WenxinApiAgent::new("app-id");
        agent
            .seed_token("cached-token", Utc::now() + ChronoDuration::seconds(600))
            .await;

        // No HTTP request is made for a fresh cached token, so this resolves
        // even without network access.
        let token = agent.access_token().await.unwrap();
        assert_eq!(token, "cached-token");
    }

    #[test]
    fn test_token_error_mapping() {
        let err = map_token_error(StatusCode::UNAUTHORIZED, "raw".to_string());
        match err {
            GatewayError::Upstream { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("认证失败"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_chat_request_shape() {
        let request = WenxinChatRequest {
            messages: vec![WenxinMessage {
                role: "user",
                content: "在吗".to_string(),
            }],
            temperature: 0.8,
            top_p: 0.8,
            penalty_score: 1.0,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stream"], false);
        assert_eq!(json["penalty_score"], 1.0);
    }
}
