//! HTTP Chunk Fetcher
//!
//! Implements the `ChunkFetcher` port against a JSON endpoint that serves one
//! year per request (`GET {base_url}?year=N`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use crate::chunk::{calendar, ChunkPayload, Period};
use crate::domain::ports::ChunkFetcher;
use crate::error::{Error, Result};

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Endpoint serving yearly payloads
    pub base_url: String,
    /// Client-level request timeout
    pub request_timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/dataset".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Fetches yearly payloads over HTTP.
pub struct HttpChunkFetcher {
    config: HttpFetcherConfig,
    client: Client,
}

impl HttpChunkFetcher {
    /// Create a new HTTP fetcher
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// URL for a single period
    pub fn url_for(&self, period: Period) -> String {
        let separator = if self.config.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}year={}", self.config.base_url, separator, period)
    }
}

impl std::fmt::Debug for HttpChunkFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChunkFetcher")
            .field("base_url", &self.config.base_url)
            .field("request_timeout", &self.config.request_timeout)
            .finish()
    }
}

#[async_trait]
impl ChunkFetcher for HttpChunkFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, period: Period) -> Result<ChunkPayload> {
        let key = format!("year={}", period);
        let url = self.url_for(period);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound { key });
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                code: status.as_u16(),
                key,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let payload: ChunkPayload = serde_json::from_slice(&bytes)
            .map_err(|e| Error::MalformedPayload(format!("{}: {}", key, e)))?;

        debug!(
            period,
            series = payload.series.len(),
            expected_days = calendar::days_in_period(period),
            "Fetched payload"
        );
        Ok(payload)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_period() {
        let fetcher = HttpChunkFetcher::new(HttpFetcherConfig {
            base_url: "https://data.example.org/series".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(fetcher.url_for(2023), "https://data.example.org/series?year=2023");
    }

    #[test]
    fn test_url_keeps_existing_query() {
        let fetcher = HttpChunkFetcher::new(HttpFetcherConfig {
            base_url: "https://data.example.org/series?format=json".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            fetcher.url_for(2019),
            "https://data.example.org/series?format=json&year=2019"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let fetcher = HttpChunkFetcher::new(HttpFetcherConfig {
            base_url: "http://127.0.0.1:1/none".to_string(),
            request_timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = fetcher.fetch(2023).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }
}
