//! Settings
//!
//! YAML-loadable configuration. Every field has a default, so an empty file
//! (or no file) is valid. Durations are given in milliseconds.
//!
//! ```yaml
//! source:
//!   base_url: https://data.example.org/series
//!   request_timeout_ms: 20000
//! cache:
//!   max_cached_periods: 8
//!   preload_enabled: true
//!   earliest_period: 2010
//! queue:
//!   max_concurrent: 2
//!   min_interval_ms: 250
//!   max_retries: 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::HttpFetcherConfig;
use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::chunk::Period;
use crate::error::{Error, Result};
use crate::orchestrator::{OrchestratorConfig, DEFAULT_EARLIEST_PERIOD};
use crate::queue::QueueConfig;

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub source: SourceSettings,
    pub cache: CacheSettings,
    pub queue: QueueSettings,
}

/// Remote dataset source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSettings {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        let http = HttpFetcherConfig::default();
        Self {
            base_url: http.base_url,
            request_timeout_ms: http.request_timeout.as_millis() as u64,
        }
    }
}

/// Chunk store and preloading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub max_cached_periods: usize,
    pub preload_enabled: bool,
    pub earliest_period: Period,
    pub latest_period: Option<Period>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_cached_periods: DEFAULT_MAX_ENTRIES,
            preload_enabled: true,
            earliest_period: DEFAULT_EARLIEST_PERIOD,
            latest_period: None,
        }
    }
}

/// Request queue policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub task_timeout_ms: u64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        let q = QueueConfig::default();
        Self {
            max_concurrent: q.max_concurrent,
            min_interval_ms: q.min_interval.as_millis() as u64,
            max_retries: q.max_retries,
            backoff_base_ms: q.backoff_base.as_millis() as u64,
            backoff_max_ms: q.backoff_max.as_millis() as u64,
            task_timeout_ms: q.task_timeout.as_millis() as u64,
            breaker_threshold: q.breaker_threshold,
            breaker_cooldown_ms: q.breaker_cooldown.as_millis() as u64,
        }
    }
}

impl Settings {
    /// Load and validate settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate settings from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let settings: Settings = if text.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(text)?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the components cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.source.base_url.trim().is_empty() {
            return Err(Error::Config("source.base_url must not be empty".into()));
        }
        let url = &self.source.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Config(format!(
                "source.base_url must be an http(s) URL, got {}",
                url
            )));
        }
        if self.source.request_timeout_ms == 0 {
            return Err(Error::Config("source.request_timeout_ms must be positive".into()));
        }
        if self.cache.max_cached_periods == 0 {
            return Err(Error::Config("cache.max_cached_periods must be at least 1".into()));
        }
        if let Some(latest) = self.cache.latest_period {
            if latest < self.cache.earliest_period {
                return Err(Error::Config(format!(
                    "cache.latest_period {} is before cache.earliest_period {}",
                    latest, self.cache.earliest_period
                )));
            }
        }
        if self.queue.max_concurrent == 0 {
            return Err(Error::Config("queue.max_concurrent must be at least 1".into()));
        }
        if self.queue.backoff_base_ms > self.queue.backoff_max_ms {
            return Err(Error::Config(
                "queue.backoff_base_ms must not exceed queue.backoff_max_ms".into(),
            ));
        }
        if self.queue.task_timeout_ms == 0 {
            return Err(Error::Config("queue.task_timeout_ms must be positive".into()));
        }
        if self.queue.breaker_threshold == 0 {
            return Err(Error::Config("queue.breaker_threshold must be at least 1".into()));
        }
        Ok(())
    }

    pub fn queue_config(&self) -> QueueConfig {
        let q = &self.queue;
        QueueConfig {
            max_concurrent: q.max_concurrent,
            min_interval: Duration::from_millis(q.min_interval_ms),
            max_retries: q.max_retries,
            backoff_base: Duration::from_millis(q.backoff_base_ms),
            backoff_max: Duration::from_millis(q.backoff_max_ms),
            task_timeout: Duration::from_millis(q.task_timeout_ms),
            breaker_threshold: q.breaker_threshold,
            breaker_cooldown: Duration::from_millis(q.breaker_cooldown_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_cached_periods: self.cache.max_cached_periods,
            preload_enabled: self.cache.preload_enabled,
            earliest_period: self.cache.earliest_period,
            latest_period: self.cache.latest_period,
            queue: self.queue_config(),
        }
    }

    pub fn http_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            base_url: self.source.base_url.clone(),
            request_timeout: Duration::from_millis(self.source.request_timeout_ms),
        }
    }
}
