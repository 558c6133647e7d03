use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use warden_config::UpstreamConfig;
use warden_core::{Result, WardenError};

use crate::provider::*;

/// Planner and verifier reached over HTTP/JSON.
///
/// - `POST {base}/v1/plans/refine` with a [`PlanningRequest`]
/// - `POST {base}/v1/plans/verify` with a [`VerificationRequest`]
/// - `GET {base}/health`
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    name: String,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            name: "http".into(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        let upstream = Self::new(&config.base_url);
        match config.api_key {
            Some(ref key) => upstream.with_api_key(key),
            None => upstream,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(upstream = %self.name, %url, "upstream request");

        let mut req = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| WardenError::Upstream(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(1);
            return Err(WardenError::UpstreamRateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(WardenError::Upstream(format!("HTTP {status}: {text}")));
            }
            return Err(WardenError::UpstreamRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| WardenError::Upstream(e.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|e| WardenError::MalformedUpstream(format!("{path}: {e}")))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn refine(&self, request: &PlanningRequest) -> Result<PlanRefinement> {
        self.post_json("/v1/plans/refine", request).await
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationReport> {
        self.post_json("/v1/plans/verify", request).await
    }

    async fn health_check(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| WardenError::Upstream(e.to_string()))?;
        if resp.status().is_success() {
            info!(upstream = %self.name, "upstream healthy");
            Ok(())
        } else {
            Err(WardenError::Upstream(format!("HTTP {}", resp.status())))
        }
    }
}
