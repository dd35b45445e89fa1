//! HTTP recognition proxy backend
//!
//! Posts the normalized page as `{"image": "<base64>"}` to a recognition
//! service and reads back a [`RecognitionResult`]. Missing `words` or
//! `confidence` fields in the reply take their defaults.

use crate::recognizer::Recognizer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use core_pipeline::{NormalizedImage, RecognitionResult};
use serde::Serialize;
use tracing::{debug, instrument};

const ENDPOINT_VAR: &str = "BOMSCAN_OCR_ENDPOINT";
const API_KEY_VAR: &str = "BOMSCAN_OCR_API_KEY";

/// Configuration for the recognition proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Full URL of the recognition endpoint
    pub endpoint: String,
    /// Bearer token, sent only when present
    pub api_key: Option<String>,
    /// Timeout in seconds
    pub timeout_secs: u64,
}

impl ProxyConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout_secs: 60,
        }
    }

    /// Create config from `BOMSCAN_OCR_ENDPOINT` and `BOMSCAN_OCR_API_KEY`
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var(ENDPOINT_VAR)
            .with_context(|| format!("{} environment variable not set", ENDPOINT_VAR))?;
        Ok(Self::new(endpoint).with_api_key(Self::api_key_from_env()))
    }

    /// `BOMSCAN_OCR_API_KEY`, unless unset or blank
    pub fn api_key_from_env() -> Option<String> {
        clean_api_key(std::env::var(API_KEY_VAR).ok())
    }

    /// Set the bearer token; a blank key sends no `Authorization` header
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = clean_api_key(api_key);
        self
    }
}

fn clean_api_key(api_key: Option<String>) -> Option<String> {
    api_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    image: &'a str,
}

/// Recognition backend that forwards pages to an HTTP service
pub struct ProxyRecognizer {
    config: ProxyConfig,
    client: reqwest::Client,
}

impl ProxyRecognizer {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ProxyConfig::from_env()?)
    }
}

#[async_trait]
impl Recognizer for ProxyRecognizer {
    fn name(&self) -> &str {
        "proxy"
    }

    #[instrument(skip_all)]
    async fn recognize(&self, page: &NormalizedImage) -> Result<RecognitionResult> {
        let body = ProxyRequest {
            image: page.base64_payload()?,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send page to recognition proxy")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Recognition proxy error ({}): {}", status, error_text);
        }

        let result: RecognitionResult = response
            .json()
            .await
            .context("Failed to parse recognition proxy response")?;
        debug!(words = result.words.len(), "Proxy recognized page");
        Ok(result)
    }
}
