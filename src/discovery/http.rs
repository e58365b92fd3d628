//! HTTP post source
//!
//! `GET {endpoint}?user_id=..&max_age_minutes=..` returning a JSON array of
//! candidate posts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::source::{PostSource, SourceError};
use crate::domain::{AutopilotSettings, CandidatePost};
use crate::error::{ReplyError, Result};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8082/v1/candidates";
const DEFAULT_TOKEN_ENV: &str = "REPLYPILOT_SOURCE_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSourceConfig {
    pub endpoint: String,
    pub token_env: String,
    pub timeout: Duration,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct HttpPostSource {
    client: Client,
    token: Option<String>,
    config: HttpSourceConfig,
}

impl HttpPostSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).ok();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReplyError::External(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, token, config })
    }
}

#[async_trait]
impl PostSource for HttpPostSource {
    async fn fetch_candidates(
        &self,
        settings: &AutopilotSettings,
    ) -> std::result::Result<Vec<CandidatePost>, SourceError> {
        let max_age = settings.max_tweet_age_minutes.to_string();
        let mut request = self.client.get(&self.config.endpoint).query(&[
            ("user_id", settings.owner_user_id.as_str()),
            ("max_age_minutes", max_age.as_str()),
        ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(self.config.timeout)
            } else {
                SourceError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Unavailable(format!("HTTP {}: {}", status.as_u16(), body.trim())));
        }

        response
            .json::<Vec<CandidatePost>>()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }
}

impl std::fmt::Debug for HttpPostSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPostSource")
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}
