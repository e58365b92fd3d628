//! HTTP posting client
//!
//! POSTs `{text, in_reply_to, target, user_id}` as JSON with a bearer token
//! and reads `{"id": ...}` back. Status codes are classified into transient
//! and permanent failures for the executor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use super::client::{PostError, PostReceipt, PostingClient, ReplyTarget};
use crate::error::{ReplyError, Result};

/// Default posting endpoint
const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/v1/replies";

/// Default environment variable holding the bearer token
const DEFAULT_TOKEN_ENV: &str = "REPLYPILOT_POSTING_TOKEN";

/// Configuration for the HTTP posting client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPostingConfig {
    pub endpoint: String,
    /// Name of the environment variable holding the bearer token
    pub token_env: String,
    pub timeout: Duration,
}

impl Default for HttpPostingConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Posting client over a JSON HTTP endpoint
pub struct HttpPostingClient {
    client: Client,
    token: String,
    config: HttpPostingConfig,
}

impl HttpPostingClient {
    /// Create a client, reading the token from `config.token_env`.
    pub fn new(config: HttpPostingConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| ReplyError::External(format!("{} not set", config.token_env)))?;
        Self::with_token(token, config)
    }

    /// Create a client with an explicit token
    pub fn with_token(token: String, config: HttpPostingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReplyError::External(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, token, config })
    }

    fn build_body(text: &str, target: &ReplyTarget) -> Value {
        json!({
            "text": text,
            "in_reply_to": target.in_reply_to,
            "target": target.target_account_ref,
            "user_id": target.owner_user_id,
        })
    }
}

#[async_trait]
impl PostingClient for HttpPostingClient {
    async fn send(&self, text: &str, target: &ReplyTarget) -> std::result::Result<PostReceipt, PostError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.token)
            .json(&Self::build_body(text, target))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let body = match retry_after {
                Some(secs) => format!("{} (retry after {}s)", body, secs),
                None => body,
            };
            return Err(classify_status(status, &body));
        }

        // The reply exists once we see 2xx; a body we can't read must not trigger a resend.
        let external_id = match response.json::<Value>().await {
            Ok(body) => body["id"]
                .as_str()
                .map(str::to_string)
                .or_else(|| body["id"].as_u64().map(|id| id.to_string())),
            Err(e) => {
                tracing::warn!(error = %e, "Posted reply but could not parse response body");
                None
            }
        };

        Ok(PostReceipt { external_id })
    }
}

impl std::fmt::Debug for HttpPostingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPostingClient")
            .field("endpoint", &self.config.endpoint)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

/// Map a non-success HTTP status to a posting error.
pub fn classify_status(status: StatusCode, body: &str) -> PostError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status.as_u16() {
        401 | 408 | 429 => PostError::Transient(message),
        400 | 403 | 404 | 409 | 410 | 422 => PostError::Permanent(message),
        code if code >= 500 => PostError::Transient(message),
        _ => PostError::Permanent(message),
    }
}

fn classify_request_error(e: reqwest::Error) -> PostError {
    if e.is_timeout() {
        PostError::Transient(format!("request timed out: {}", e))
    } else if e.is_connect() || e.is_request() {
        PostError::Transient(format!("network error: {}", e))
    } else {
        PostError::Permanent(format!("request failed: {}", e))
    }
}
