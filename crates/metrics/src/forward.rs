//! Best-effort relay of metrics events to the external collector.
//!
//! [`HttpCollector`] POSTs the normalized JSON payload to the collector's
//! log-ingestion endpoint. There is exactly one attempt per event: no retry,
//! no backoff. Configuration comes from the environment; when no ingest key
//! is set, [`CollectorConfig::from_env`] returns `None` and forwarding is
//! skipped entirely.

use std::time::Duration;

use async_trait::async_trait;

/// Header carrying the collector credential.
pub const INGEST_KEY_HEADER: &str = "x-instana-key";

/// Collector endpoint used when `COLLECTOR_URL` is not set.
pub const DEFAULT_COLLECTOR_URL: &str = "https://ingress-red-saas.instana.io/api/logs?immediate";

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for collector forwarding failures.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The collector returned a non-2xx status code.
    #[error("Collector returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// Forwarder
// ---------------------------------------------------------------------------

/// Somewhere accepted metrics payloads are relayed to.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, payload: &serde_json::Value) -> Result<(), ForwardError>;
}

// ---------------------------------------------------------------------------
// CollectorConfig
// ---------------------------------------------------------------------------

/// Connection settings for the external collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Full ingestion URL.
    pub url: String,
    /// Credential sent in [`INGEST_KEY_HEADER`].
    pub ingest_key: String,
    /// Timeout for one forward attempt.
    pub timeout: Duration,
}

impl CollectorConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `COLLECTOR_INGEST_KEY` is unset or empty, which
    /// disables forwarding.
    ///
    /// | Variable                 | Required | Default                                   |
    /// |--------------------------|----------|-------------------------------------------|
    /// | `COLLECTOR_INGEST_KEY`   | yes      | --                                        |
    /// | `COLLECTOR_URL`          | no       | [`DEFAULT_COLLECTOR_URL`]                 |
    /// | `COLLECTOR_TIMEOUT_SECS` | no       | `10`                                      |
    pub fn from_env() -> Option<Self> {
        let ingest_key = std::env::var("COLLECTOR_INGEST_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        Some(Self {
            url: std::env::var("COLLECTOR_URL")
                .unwrap_or_else(|_| DEFAULT_COLLECTOR_URL.to_string()),
            ingest_key,
            timeout: Duration::from_secs(
                std::env::var("COLLECTOR_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// HttpCollector
// ---------------------------------------------------------------------------

/// Forwards payloads to the collector over HTTP(S).
pub struct HttpCollector {
    client: reqwest::Client,
    config: CollectorConfig,
}

impl HttpCollector {
    /// Build a collector client with the configured timeout.
    pub fn new(config: CollectorConfig) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl Forwarder for HttpCollector {
    /// Execute a single POST request and check the response status.
    async fn forward(&self, payload: &serde_json::Value) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(&self.config.url)
            .header(INGEST_KEY_HEADER, &self.config.ingest_key)
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ForwardError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
