//! HTTP content generator
//!
//! Sends the post and constraints to a generation service and expects
//! `{"text": ..., "confidence": ...}` back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::generator::{ContentGenerator, GeneratedReply, GenerationContext, GenerationError};
use crate::domain::CandidatePost;
use crate::error::{ReplyError, Result};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8081/v1/generate";
const DEFAULT_TOKEN_ENV: &str = "REPLYPILOT_GENERATION_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpGeneratorConfig {
    pub endpoint: String,
    pub token_env: String,
    pub timeout: Duration,
}

impl Default for HttpGeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

pub struct HttpContentGenerator {
    client: Client,
    token: Option<String>,
    config: HttpGeneratorConfig,
}

impl HttpContentGenerator {
    /// Create a generator; the token is optional for local services.
    pub fn new(config: HttpGeneratorConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).ok();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReplyError::External(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, token, config })
    }

    fn build_body(post: &CandidatePost, context: &GenerationContext) -> Value {
        json!({
            "post_ref": post.post_ref,
            "post_text": post.text,
            "author": post.author_account_ref,
            "user_id": context.owner_user_id,
            "max_chars": context.max_chars,
        })
    }

    fn parse_response(body: Value) -> std::result::Result<GeneratedReply, GenerationError> {
        let text = body["text"]
            .as_str()
            .ok_or_else(|| GenerationError::InvalidResponse("missing text".to_string()))?;
        let confidence = body["confidence"].as_f64().unwrap_or(0.0) as f32;
        Ok(GeneratedReply {
            text: text.to_string(),
            confidence,
        })
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(
        &self,
        post: &CandidatePost,
        context: &GenerationContext,
    ) -> std::result::Result<GeneratedReply, GenerationError> {
        let mut request = self.client.post(&self.config.endpoint).json(&Self::build_body(post, context));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.config.timeout)
            } else {
                GenerationError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Unavailable(format!("HTTP {}: {}", status.as_u16(), body.trim())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        Self::parse_response(body)
    }
}

impl std::fmt::Debug for HttpContentGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContentGenerator")
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_build_body() {
        let post = CandidatePost {
            post_ref: "p1".to_string(),
            author_account_ref: "@alice".to_string(),
            text: "launch day".to_string(),
            published_at: Utc::now(),
            is_repost: false,
        };
        let context = GenerationContext {
            owner_user_id: "u1".to_string(),
            max_chars: 280,
        };
        let body = HttpContentGenerator::build_body(&post, &context);
        assert_eq!(body["post_text"], "launch day");
        assert_eq!(body["author"], "@alice");
        assert_eq!(body["max_chars"], 280);
    }

    #[test]
    fn test_parse_response() {
        let reply = HttpContentGenerator::parse_response(json!({"text": "Congrats", "confidence": 0.75})).unwrap();
        assert_eq!(reply.text, "Congrats");
        assert!((reply.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_missing_confidence() {
        let reply = HttpContentGenerator::parse_response(json!({"text": "Congrats"})).unwrap();
        assert_eq!(reply.confidence, 0.0);
    }

    #[test]
    fn test_parse_response_missing_text() {
        assert!(matches!(
            HttpContentGenerator::parse_response(json!({"confidence": 1.0})),
            Err(GenerationError::InvalidResponse(_))
        ));
    }
}
