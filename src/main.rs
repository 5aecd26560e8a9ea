//! periodcache CLI
//!
//! Loads a date range through the cache and prints the stitched result with
//! cache and queue statistics as JSON.
//!
//! ```text
//! periodcache --base-url https://data.example.org/series \
//!             --start 2022-11-01 --end 2023-02-28 --preload
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use periodcache::adapters::{HttpChunkFetcher, TracingObserver};
use periodcache::chunk::calendar;
use periodcache::error::{Error, Result};
use periodcache::{CacheOrchestrator, OrchestratorStats, RangeResult, Settings};

// =============================================================================
// CLI Arguments
// =============================================================================

/// periodcache - bounded cache for yearly multi-series datasets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML settings file
    #[arg(long, env = "PERIODCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Dataset endpoint (overrides source.base_url)
    #[arg(long, env = "PERIODCACHE_BASE_URL")]
    base_url: Option<String>,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the range, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Also fetch the periods adjacent to the range
    #[arg(long)]
    preload: bool,

    /// Maximum resident periods (overrides cache.max_cached_periods)
    #[arg(long, env = "PERIODCACHE_MAX_CACHED_PERIODS")]
    max_cached_periods: Option<usize>,

    /// Maximum concurrent fetches (overrides queue.max_concurrent)
    #[arg(long, env = "PERIODCACHE_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// Minimum spacing between fetches in milliseconds
    #[arg(long, env = "PERIODCACHE_MIN_INTERVAL_MS")]
    min_interval_ms: Option<u64>,

    /// Retries after the first attempt
    #[arg(long, env = "PERIODCACHE_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Per-attempt timeout in milliseconds
    #[arg(long, env = "PERIODCACHE_TASK_TIMEOUT_MS")]
    task_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_yaml_file(path)?,
            None => Settings::default(),
        };

        if let Some(url) = &self.base_url {
            settings.source.base_url = url.clone();
        }
        if let Some(v) = self.max_cached_periods {
            settings.cache.max_cached_periods = v;
        }
        if let Some(v) = self.max_concurrent {
            settings.queue.max_concurrent = v;
        }
        if let Some(v) = self.min_interval_ms {
            settings.queue.min_interval_ms = v;
        }
        if let Some(v) = self.max_retries {
            settings.queue.max_retries = v;
        }
        if let Some(v) = self.task_timeout_ms {
            settings.queue.task_timeout_ms = v;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Serialize)]
struct Report {
    result: RangeResult,
    stats: OrchestratorStats,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let settings = args.settings()?;
    info!("Starting periodcache");
    info!("  Source: {}", settings.source.base_url);
    info!("  Max cached periods: {}", settings.cache.max_cached_periods);
    info!("  Max concurrent fetches: {}", settings.queue.max_concurrent);

    let fetcher = HttpChunkFetcher::new(settings.http_config())?;
    let orchestrator = CacheOrchestrator::new(
        settings.orchestrator_config(),
        Arc::new(fetcher),
        Arc::new(TracingObserver::info_level()),
    );

    let result = orchestrator
        .request_range(args.start, args.end)
        .await
        .map_err(|e| {
            error!("Range request failed: {}", e);
            e
        })?;

    if args.preload {
        let touched = calendar::periods_touching(args.start, args.end);
        let mut handles = Vec::new();
        if let Some(first) = touched.first() {
            handles.extend(orchestrator.preload_adjacent(*first));
        }
        if let Some(last) = touched.last().filter(|l| Some(*l) != touched.first()) {
            handles.extend(orchestrator.preload_adjacent(*last));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Preload task failed: {}", e);
            }
        }
    }

    let report = Report {
        result,
        stats: orchestrator.stats(),
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| Error::Internal(format!("Failed to encode report: {}", e)))?;
    println!("{}", json);

    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = ["hyper=warn", "reqwest=info", "rustls=warn"]
        .iter()
        .filter_map(|d| d.parse().ok())
        .fold(
            EnvFilter::from_default_env().add_directive(level.into()),
            |filter, directive| filter.add_directive(directive),
        );

    // Logs go to stderr so stdout carries only the JSON report.
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
