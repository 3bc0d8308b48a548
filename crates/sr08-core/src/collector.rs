//! Collector backend client.
//!
//! The engine talks to the collector through the [`CollectorApi`] trait;
//! [`HttpCollector`] is the production implementation over HTTPS with
//! bearer authentication. Tests substitute a scripted implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use sr08_types::{HealthPayload, TokenPair};

/// Errors from the collector backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollectorError {
    /// The request never produced an HTTP status (DNS, TLS, connect, timeout).
    #[error("collector unreachable: {0}")]
    Unreachable(String),

    /// The response arrived but could not be interpreted.
    #[error("invalid collector response: {0}")]
    InvalidResponse(String),

    /// The token refresh endpoint rejected the refresh token.
    #[error("token refresh rejected with status {0}")]
    RefreshRejected(u16),
}

/// Upload and token-refresh operations against the collector.
#[async_trait]
pub trait CollectorApi: Send + Sync + 'static {
    /// Upload one payload. Returns the HTTP status code; the caller owns
    /// the retry policy, so a non-2xx status is not an `Err` here.
    async fn upload(&self, payload: &HealthPayload, access_token: &str)
        -> Result<u16, CollectorError>;

    /// Exchange the refresh token for a fresh token pair.
    async fn refresh(&self, user_id: &str, refresh_token: &str)
        -> Result<TokenPair, CollectorError>;
}

/// HTTPS client for the collector backend.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: reqwest::Client,
    upload_url: String,
    auth_url: String,
}

impl HttpCollector {
    /// Create a client for the given endpoints.
    ///
    /// Endpoints must be absolute `http://` or `https://` URLs; trailing
    /// slashes are trimmed.
    pub fn new(upload_url: &str, auth_url: &str) -> Result<Self, CollectorError> {
        for url in [upload_url, auth_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CollectorError::InvalidResponse(format!(
                    "endpoint must start with http:// or https://: {url}"
                )));
            }
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CollectorError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            upload_url: upload_url.trim_end_matches('/').to_string(),
            auth_url: auth_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CollectorApi for HttpCollector {
    async fn upload(
        &self,
        payload: &HealthPayload,
        access_token: &str,
    ) -> Result<u16, CollectorError> {
        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| CollectorError::Unreachable(e.to_string()))?;
        let status = response.status().as_u16();
        debug!(status, "upload response");
        Ok(status)
    }

    async fn refresh(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, CollectorError> {
        let response = self
            .client
            .post(&self.auth_url)
            .json(&json!({
                "user_id": user_id,
                "refreshToken": refresh_token,
            }))
            .send()
            .await
            .map_err(|e| CollectorError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::RefreshRejected(status.as_u16()));
        }
        response
            .json::<TokenPair>()
            .await
            .map_err(|e| CollectorError::InvalidResponse(e.to_string()))
    }
}
