//! Mux Video HTTP client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{MuxError, MuxResult};
use crate::types::{Asset, CreateUploadRequest, DirectUpload, Envelope, NewAssetSettings};

/// Configuration for the Mux client.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    pub token_id: String,
    pub secret_key: String,
    /// API base URL
    pub base_url: String,
    /// Origin allowed to PUT to direct upload URLs
    pub cors_origin: String,
    /// Request timeout
    pub timeout: Duration,
    /// Interval between readiness checks
    pub poll_interval: Duration,
    /// Total time allowed for an asset to become ready
    pub poll_budget: Duration,
}

impl MuxConfig {
    pub fn new(token_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            secret_key: secret_key.into(),
            base_url: "https://api.mux.com".to_string(),
            cors_origin: "*".to_string(),
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            poll_budget: Duration::from_secs(600),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> MuxResult<Self> {
        let token_id = std::env::var("MUX_TOKEN_ID")
            .map_err(|_| MuxError::config_error("MUX_TOKEN_ID not set"))?;
        let secret_key = std::env::var("MUX_SECRET_KEY")
            .map_err(|_| MuxError::config_error("MUX_SECRET_KEY not set"))?;

        let mut config = Self::new(token_id, secret_key);
        if let Ok(base_url) = std::env::var("MUX_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(origin) = std::env::var("NEXT_UPLOAD_URL") {
            config.cors_origin = origin;
        }
        if let Some(secs) = std::env::var("MUX_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = std::env::var("MUX_POLL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.poll_budget = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// Client for the Mux Video API.
pub struct MuxClient {
    http: Client,
    config: MuxConfig,
}

impl MuxClient {
    pub fn new(config: MuxConfig) -> MuxResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MuxError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MuxResult<Self> {
        Self::new(MuxConfig::from_env()?)
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.config.token_id, Some(&self.config.secret_key))
    }

    /// Open a direct upload slot for a new public asset.
    pub async fn create_direct_upload(&self) -> MuxResult<DirectUpload> {
        let url = format!("{}/video/v1/uploads", self.config.base_url);
        let request = CreateUploadRequest {
            cors_origin: &self.config.cors_origin,
            new_asset_settings: NewAssetSettings {
                playback_policy: vec!["public".to_string()],
            },
        };

        let response = self.authed(self.http.post(&url)).json(&request).send().await?;
        let upload: DirectUpload = Self::parse(response).await?;
        if upload.url.is_none() {
            return Err(MuxError::invalid_response("direct upload has no url"));
        }

        info!(upload_id = %upload.id, "Created Mux direct upload");
        Ok(upload)
    }

    /// PUT the file body to a direct upload URL.
    pub async fn upload_bytes(&self, upload_url: &str, data: Vec<u8>, content_type: &str) -> MuxResult<()> {
        let size = data.len();
        let response = self
            .http
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        debug!(bytes = size, "Uploaded file to Mux");
        Ok(())
    }

    pub async fn get_upload(&self, upload_id: &str) -> MuxResult<DirectUpload> {
        let url = format!("{}/video/v1/uploads/{}", self.config.base_url, upload_id);
        let response = self.authed(self.http.get(&url)).send().await?;
        Self::parse(response).await
    }

    pub async fn get_asset(&self, asset_id: &str) -> MuxResult<Asset> {
        let url = format!("{}/video/v1/assets/{}", self.config.base_url, asset_id);
        let response = self.authed(self.http.get(&url)).send().await?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> MuxResult<T> {
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.data)
    }

    async fn status_error(response: Response) -> MuxError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = format!("Mux returned {}: {}", status, body);
        if status.is_server_error() || status.as_u16() == 429 {
            MuxError::ServiceUnavailable(message)
        } else {
            MuxError::RequestFailed(message)
        }
    }
}
