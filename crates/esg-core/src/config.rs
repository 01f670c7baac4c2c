use crate::tables::ReferenceTables;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    // Upstream pacing
    pub min_request_interval_ms: u64,     // 1000 (~1 req/s)
    pub max_requests_per_minute: usize,   // 60
    pub fetch_timeout_secs: u64,          // 8

    // Source fetcher window
    pub history_days: i64,                // 30
    pub min_trading_days: usize,          // 5

    // Batch
    pub batch_concurrency: usize,         // 1 = sequential

    // Cache
    pub cache_ttl_hours: i64,             // 24
    pub cache_url: Option<String>,        // sqlite:esg_cache.db

    // Manipulation signal thresholds
    pub volume_spike_threshold: f64,      // 2.0x average
    pub volatility_threshold: f64,        // 5% daily move

    // Reference tables override
    pub tables_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: 1000,
            max_requests_per_minute: 60,
            fetch_timeout_secs: 8,
            history_days: 30,
            min_trading_days: 5,
            batch_concurrency: 1,
            cache_ttl_hours: 24,
            cache_url: None,
            volume_spike_threshold: 2.0,
            volatility_threshold: 0.05,
            tables_path: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            min_request_interval_ms: parse_var("ESG_MIN_REQUEST_INTERVAL_MS", defaults.min_request_interval_ms)?,
            max_requests_per_minute: parse_var("ESG_RATE_LIMIT_PER_MIN", defaults.max_requests_per_minute)?,
            fetch_timeout_secs: parse_var("ESG_FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs)?,
            history_days: parse_var("ESG_HISTORY_DAYS", defaults.history_days)?,
            min_trading_days: parse_var("ESG_MIN_TRADING_DAYS", defaults.min_trading_days)?,
            batch_concurrency: parse_var("ESG_BATCH_CONCURRENCY", defaults.batch_concurrency)?,
            cache_ttl_hours: parse_var("CACHE_EXPIRE_HOURS", defaults.cache_ttl_hours)?,
            cache_url: env::var("ESG_CACHE_URL").ok().filter(|v| !v.trim().is_empty()),
            volume_spike_threshold: parse_var("VOLUME_SPIKE_THRESHOLD", defaults.volume_spike_threshold)?,
            volatility_threshold: parse_var("VOLATILITY_THRESHOLD", defaults.volatility_threshold)?,
            tables_path: env::var("ESG_TABLES_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests_per_minute == 0 {
            anyhow::bail!("ESG_RATE_LIMIT_PER_MIN must be at least 1");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("ESG_FETCH_TIMEOUT_SECS must be at least 1");
        }
        if self.history_days <= 0 {
            anyhow::bail!("ESG_HISTORY_DAYS must be positive");
        }
        if self.batch_concurrency == 0 {
            anyhow::bail!("ESG_BATCH_CONCURRENCY must be at least 1");
        }
        if self.volume_spike_threshold <= 0.0 || self.volatility_threshold <= 0.0 {
            anyhow::bail!("manipulation thresholds must be positive");
        }
        Ok(())
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Built-in tables, or the validated file named by `tables_path`.
    pub fn load_tables(&self) -> Result<Arc<ReferenceTables>> {
        let tables = match &self.tables_path {
            Some(path) => {
                tracing::info!("Loading reference tables from {}", path.display());
                ReferenceTables::from_json_file(path)
                    .with_context(|| format!("loading reference tables from {}", path.display()))?
            }
            None => ReferenceTables::default(),
        };
        Ok(Arc::new(tables))
    }
}
