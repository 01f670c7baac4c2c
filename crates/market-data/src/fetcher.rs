use chrono::{Duration as ChronoDuration, Utc};
use esg_core::{MarketDataProvider, PipelineConfig, ProviderError, ProviderSnapshot};
use std::sync::Arc;
use std::time::Duration;

use crate::rate_limiter::RateLimiter;

/// Outcome of one fetch attempt for one concrete identifier
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(ProviderSnapshot),
    /// Identifier resolved upstream but carried no usable data
    Empty { reason: String },
    /// Network, timeout or provider error
    Failure { reason: String },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Empty { reason } | FetchOutcome::Failure { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetcherSettings {
    pub timeout: Duration,
    pub history_days: i64,
    pub min_trading_days: usize,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            history_days: 30,
            min_trading_days: 5,
        }
    }
}

impl From<&PipelineConfig> for FetcherSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            timeout: config.fetch_timeout(),
            history_days: config.history_days,
            min_trading_days: config.min_trading_days,
        }
    }
}

/// Fetches a fixed-window snapshot for one identifier.
///
/// Every call claims a slot from the shared `RateLimiter` first and is
/// bounded by `settings.timeout`. Provider errors never escape: they come
/// back as `FetchOutcome::Failure`. No retries happen here.
#[derive(Clone)]
pub struct SourceFetcher {
    provider: Arc<dyn MarketDataProvider>,
    limiter: RateLimiter,
    settings: FetcherSettings,
}

impl SourceFetcher {
    pub fn new(provider: Arc<dyn MarketDataProvider>, limiter: RateLimiter, settings: FetcherSettings) -> Self {
        Self {
            provider,
            limiter,
            settings,
        }
    }

    pub fn from_config(provider: Arc<dyn MarketDataProvider>, config: &PipelineConfig) -> Self {
        let limiter = RateLimiter::per_minute(config.max_requests_per_minute, config.min_request_interval());
        Self::new(provider, limiter, FetcherSettings::from(config))
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    pub async fn fetch(&self, identifier: &str) -> FetchOutcome {
        self.limiter.acquire().await;

        let to = Utc::now();
        let from = to - ChronoDuration::days(self.settings.history_days);

        let result = tokio::time::timeout(
            self.settings.timeout,
            self.provider.fetch_snapshot(identifier, from, to),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout(self.settings.timeout)));

        match result {
            Ok(snapshot) if snapshot.bars.len() < self.settings.min_trading_days => {
                let reason = format!(
                    "only {} trading days in window (need {})",
                    snapshot.bars.len(),
                    self.settings.min_trading_days
                );
                tracing::debug!("{}: empty ({})", identifier, reason);
                FetchOutcome::Empty { reason }
            }
            Ok(snapshot) => {
                tracing::debug!("{}: fetched {} bars", identifier, snapshot.bars.len());
                FetchOutcome::Success(snapshot)
            }
            Err(e) => {
                tracing::warn!("{} fetch failed for {}: {}", self.provider.provider_name(), identifier, e);
                FetchOutcome::Failure { reason: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use esg_core::PriceBar;

    struct FixedProvider {
        bars: usize,
        delay: Duration,
        error: Option<ProviderError>,
    }

    #[async_trait]
    impl MarketDataProvider for FixedProvider {
        async fn fetch_snapshot(
            &self,
            identifier: &str,
            from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<ProviderSnapshot, ProviderError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(err) = &self.error {
                return Err(err.clone());
            }
            let bars = (0..self.bars)
                .map(|i| PriceBar {
                    timestamp: from + ChronoDuration::days(i as i64),
                    open: 100.0,
                    high: 101.0,
                    low: 99.0,
                    close: 100.0,
                    volume: 1000.0,
                })
                .collect();
            Ok(ProviderSnapshot {
                identifier: identifier.to_string(),
                bars,
                market_cap: Some(1e10),
                ..ProviderSnapshot::default()
            })
        }

        fn provider_name(&self) -> &'static str {
            "fixed"
        }
    }

    fn fetcher(provider: FixedProvider, timeout: Duration) -> SourceFetcher {
        SourceFetcher::new(
            Arc::new(provider),
            RateLimiter::unlimited(),
            FetcherSettings {
                timeout,
                history_days: 30,
                min_trading_days: 5,
            },
        )
    }

    #[tokio::test]
    async fn test_success_with_enough_days() {
        let f = fetcher(FixedProvider { bars: 20, delay: Duration::ZERO, error: None }, Duration::from_secs(1));
        match f.fetch("TCS.NS").await {
            FetchOutcome::Success(snapshot) => {
                assert_eq!(snapshot.identifier, "TCS.NS");
                assert_eq!(snapshot.bars.len(), 20);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_too_few_days_is_empty() {
        let f = fetcher(FixedProvider { bars: 2, delay: Duration::ZERO, error: None }, Duration::from_secs(1));
        let outcome = f.fetch("IDLE.NS").await;
        assert!(matches!(outcome, FetchOutcome::Empty { .. }));
        assert!(outcome.reason().unwrap().contains("only 2 trading days"));
    }

    #[tokio::test]
    async fn test_provider_error_becomes_failure() {
        let f = fetcher(
            FixedProvider {
                bars: 0,
                delay: Duration::ZERO,
                error: Some(ProviderError::NotFound("DHFL.NS".to_string())),
            },
            Duration::from_secs(1),
        );
        let outcome = f.fetch("DHFL.NS").await;
        assert!(matches!(outcome, FetchOutcome::Failure { .. }));
        assert!(outcome.reason().unwrap().contains("DHFL.NS"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let f = fetcher(
            FixedProvider { bars: 20, delay: Duration::from_millis(500), error: None },
            Duration::from_millis(30),
        );
        let outcome = f.fetch("SLOW.NS").await;
        assert!(matches!(outcome, FetchOutcome::Failure { .. }));
        assert!(outcome.reason().unwrap().contains("timed out"));
    }
}
