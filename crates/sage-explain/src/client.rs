//! Explanation Endpoint Client
//!
//! Posts a prompt to the AI explanation endpoint and exposes the response
//! body as an [`ExplanationStream`].

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::decoder::{ExplanationStream, parse_event_stream};
use crate::error::{ExplainError, Result};

/// Endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/ai";

/// Anything that can stream an explanation for a prompt
#[async_trait]
pub trait ExplanationSource: Send + Sync {
    /// Open a stream of explanation chunks for `prompt`
    async fn explain(&self, prompt: &str) -> Result<ExplanationStream>;
}

/// Client configuration
#[derive(Clone, Debug)]
pub struct ExplainConfig {
    /// Full URL of the explanation endpoint
    pub endpoint: String,

    /// Connection timeout in seconds. The body itself has no deadline.
    pub connect_timeout_secs: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Serialize)]
struct ExplainRequest<'a> {
    prompt: &'a str,
}

/// HTTP client for the explanation endpoint
pub struct ExplanationClient {
    http: reqwest::Client,
    config: ExplainConfig,
}

impl ExplanationClient {
    /// Create a client for a specific endpoint
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::from_config(ExplainConfig {
            endpoint: endpoint.into(),
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: ExplainConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ExplainError::Config(e.to_string()))?;

        Ok(Self { http, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl ExplanationSource for ExplanationClient {
    async fn explain(&self, prompt: &str) -> Result<ExplanationStream> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&ExplainRequest { prompt })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint = %self.config.endpoint, status = %status, "Explanation request failed");
            return Err(ExplainError::Status(status.as_u16()));
        }

        tracing::debug!(endpoint = %self.config.endpoint, "Explanation stream opened");
        Ok(parse_event_stream(response.bytes_stream()))
    }
}
