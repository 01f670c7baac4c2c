use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use esg_core::{
    DataSource, EsgError, EsgScores, MarketDataProvider, PriceBar, ProviderError, ProviderSnapshot,
    RecordCache, ReferenceTables, Sector,
};
use market_data::{FetcherSettings, RateLimiter, SourceFetcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{BatchCoordinator, CancelToken, FallbackResolver, MemoryRecordCache};

/// Provider answering from a fixed script; anything unscripted is NotFound.
#[derive(Default)]
struct ScriptedProvider {
    snapshots: HashMap<String, ProviderSnapshot>,
    errors: HashMap<String, ProviderError>,
    calls: Mutex<Vec<String>>,
    cancel_on: Option<(String, CancelToken)>,
}

impl ScriptedProvider {
    fn with_live(mut self, identifier: &str, days: usize, market_cap: Option<f64>) -> Self {
        self.snapshots
            .insert(identifier.to_string(), snapshot(identifier, days, market_cap));
        self
    }

    fn with_snapshot(mut self, snapshot: ProviderSnapshot) -> Self {
        self.snapshots.insert(snapshot.identifier.clone(), snapshot);
        self
    }

    fn with_error(mut self, identifier: &str, error: ProviderError) -> Self {
        self.errors.insert(identifier.to_string(), error);
        self
    }

    fn cancelling_on(mut self, identifier: &str, token: CancelToken) -> Self {
        self.cancel_on = Some((identifier.to_string(), token));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn fetch_snapshot(
        &self,
        identifier: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<ProviderSnapshot, ProviderError> {
        self.calls.lock().unwrap().push(identifier.to_string());
        if let Some((trigger, token)) = &self.cancel_on {
            if trigger == identifier {
                token.cancel();
            }
        }
        if let Some(err) = self.errors.get(identifier) {
            return Err(err.clone());
        }
        self.snapshots
            .get(identifier)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(identifier.to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn snapshot(identifier: &str, days: usize, market_cap: Option<f64>) -> ProviderSnapshot {
    let start = Utc::now() - ChronoDuration::days(days as i64);
    let bars = (0..days)
        .map(|i| PriceBar {
            timestamp: start + ChronoDuration::days(i as i64),
            open: 100.0 + i as f64,
            high: 102.0 + i as f64,
            low: 99.0 + i as f64,
            close: 101.0 + i as f64,
            volume: 10_000.0,
        })
        .collect();
    ProviderSnapshot {
        identifier: identifier.to_string(),
        bars,
        market_cap,
        ..ProviderSnapshot::default()
    }
}

fn resolver_with(provider: Arc<ScriptedProvider>, tables: ReferenceTables) -> FallbackResolver {
    let fetcher = SourceFetcher::new(
        provider,
        RateLimiter::unlimited(),
        FetcherSettings {
            timeout: Duration::from_secs(1),
            history_days: 30,
            min_trading_days: 5,
        },
    );
    FallbackResolver::new(Arc::new(tables), fetcher)
}

fn resolver(provider: Arc<ScriptedProvider>) -> FallbackResolver {
    resolver_with(provider, ReferenceTables::default())
}

fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

fn scenario_provider() -> ScriptedProvider {
    ScriptedProvider::default()
        .with_live("RELIANCE.NS", 20, Some(1.9e13))
        .with_live("TCS.NS", 20, Some(1.4e13))
        .with_error("DHFL.NS", ProviderError::NotFound("DHFL.NS".to_string()))
        .with_live("HDFCBANK.NS", 20, Some(1.2e13))
}

#[tokio::test]
async fn test_delisted_ticker_resolves_through_substitute() {
    let provider = Arc::new(scenario_provider());
    let record = resolver(provider.clone()).resolve("DHFL.NS").await.unwrap();

    assert_eq!(record.ticker, "DHFL.NS");
    assert_eq!(record.resolved_identifier, "HDFCBANK.NS");
    assert!(record.is_delisted);
    assert_eq!(record.data_source.tag(), "live_replacement:DHFL.NS");
    assert_eq!(record.sector, Sector::Banking);
    assert_eq!(record.confidence, 0.8);
    assert!(record.error_message.as_deref().unwrap().contains("DHFL.NS"));
    assert_eq!(provider.calls(), vec!["DHFL.NS", "HDFCBANK.NS"]);
}

#[tokio::test]
async fn test_unknown_ticker_falls_to_sector_default() {
    let provider = Arc::new(ScriptedProvider::default());
    let record = resolver(provider.clone()).resolve("INVALID123.NS").await.unwrap();

    let tables = ReferenceTables::default();
    let unknown = tables.profile(Sector::Unknown).unwrap();

    assert_eq!(record.data_source, DataSource::SectorDefault);
    assert_eq!(record.sector, Sector::Unknown);
    assert!(!record.is_delisted);
    assert!(record.confidence < 1.0);
    assert_eq!(record.scores(), unknown.default_scores());
    assert_eq!(record.roic, unknown.default_roic());
    assert_eq!(record.market_cap, unknown.default_market_cap);
    assert!(record.error_message.is_some());
    // original, then both suffix variants
    assert_eq!(provider.calls(), vec!["INVALID123.NS", "INVALID123.BO", "INVALID123"]);
}

#[tokio::test]
async fn test_alternate_suffix_is_tagged() {
    let provider = Arc::new(ScriptedProvider::default().with_live("WIPRO.BO", 10, Some(2.5e12)));
    let record = resolver(provider).resolve("wipro.ns").await.unwrap();

    assert_eq!(record.ticker, "WIPRO.NS");
    assert_eq!(record.resolved_identifier, "WIPRO.BO");
    assert_eq!(record.data_source.tag(), "live_alternate:WIPRO.BO");
    assert_eq!(record.confidence, 0.9);
    assert!(!record.is_delisted);
    assert_eq!(record.sector, Sector::It);
}

#[tokio::test]
async fn test_too_few_trading_days_advances_tier() {
    let provider = Arc::new(
        ScriptedProvider::default()
            .with_live("ITC.NS", 2, Some(5e12))
            .with_live("ITC.BO", 15, Some(5e12)),
    );
    let record = resolver(provider).resolve("ITC.NS").await.unwrap();
    assert_eq!(record.data_source.tag(), "live_alternate:ITC.BO");
    assert!(record.error_message.as_deref().unwrap().contains("trading days"));
}

#[tokio::test]
async fn test_live_fields_derived_from_snapshot() {
    let mut snap = snapshot("INFY.NS", 20, None);
    snap.return_on_assets = Some(0.20);
    snap.return_on_equity = Some(0.30);
    let provider = Arc::new(ScriptedProvider::default().with_snapshot(snap));
    let record = resolver(provider).resolve("INFY.NS").await.unwrap();

    let tables = ReferenceTables::default();
    let it = tables.profile(Sector::It).unwrap();
    assert_eq!(record.data_source, DataSource::Live);
    assert!((record.roic - 0.25).abs() < 1e-9);
    // no market cap upstream: sector default (75B) gives the 1.1 size factor
    assert_eq!(record.market_cap, it.default_market_cap);
    assert!((record.environmental() - 77.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_provider_sector_used_when_ticker_unmatched() {
    let mut snap = snapshot("ZENSAR.NS", 40, Some(5e9));
    snap.sector = Some("Technology".to_string());
    let provider = Arc::new(ScriptedProvider::default().with_snapshot(snap));
    let record = resolver(provider).resolve("ZENSAR.NS").await.unwrap();

    let tables = ReferenceTables::default();
    let it = tables.profile(Sector::It).unwrap();
    assert_eq!(record.sector, Sector::It);
    assert_eq!(record.scores(), it.default_scores());
    // only the tail of the history is kept
    assert_eq!(record.recent_bars.len(), 30);
    assert_eq!(record.recent_bars.last().map(|b| b.close), Some(140.0));
}

#[tokio::test]
async fn test_unmapped_provider_sector_stays_unknown() {
    let mut snap = snapshot("ZENSAR.NS", 20, Some(5e9));
    snap.sector = Some("Real Estate".to_string());
    let provider = Arc::new(ScriptedProvider::default().with_snapshot(snap));
    let record = resolver(provider).resolve("ZENSAR.NS").await.unwrap();
    assert_eq!(record.sector, Sector::Unknown);
    assert_eq!(record.recent_bars.len(), 20);
}

#[tokio::test]
async fn test_provider_esg_scores_preferred() {
    let mut snap = snapshot("NESTLEIND.NS", 20, Some(2e12));
    snap.profit_margin = Some(0.16);
    snap.esg = Some(EsgScores::new(40.0, 50.0, 60.0));
    let provider = Arc::new(ScriptedProvider::default().with_snapshot(snap));
    let record = resolver(provider).resolve("NESTLEIND.NS").await.unwrap();

    assert_eq!(record.sector, Sector::Fmcg);
    assert!((record.esg_score() - 50.0).abs() < 1e-9);
    assert!((record.roic - 0.16).abs() < 1e-9);
}

#[tokio::test]
async fn test_timeout_counts_as_failure() {
    struct SlowProvider;

    #[async_trait]
    impl MarketDataProvider for SlowProvider {
        async fn fetch_snapshot(
            &self,
            identifier: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<ProviderSnapshot, ProviderError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(snapshot(identifier, 20, Some(1e12)))
        }

        fn provider_name(&self) -> &'static str {
            "slow"
        }
    }

    let fetcher = SourceFetcher::new(
        Arc::new(SlowProvider),
        RateLimiter::unlimited(),
        FetcherSettings {
            timeout: Duration::from_millis(20),
            history_days: 30,
            min_trading_days: 5,
        },
    );
    let resolver = FallbackResolver::new(Arc::new(ReferenceTables::default()), fetcher);
    let record = resolver.resolve("SBIN.NS").await.unwrap();

    assert_eq!(record.data_source, DataSource::SectorDefault);
    assert_eq!(record.sector, Sector::Banking);
    assert!(record.error_message.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_malformed_ticker_is_rejected() {
    let provider = Arc::new(ScriptedProvider::default());
    let err = resolver(provider.clone()).resolve("  ").await.unwrap_err();
    assert!(matches!(err, EsgError::InvalidIdentifier { .. }));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_error_tier_when_profile_missing() {
    let mut tables = ReferenceTables::default();
    tables.profiles.remove(&Sector::Unknown);
    let provider = Arc::new(ScriptedProvider::default());
    let record = resolver_with(provider, tables).resolve("ZZZ.NS").await.unwrap();

    assert_eq!(record.data_source, DataSource::Error);
    assert_eq!(record.confidence, 0.0);
    assert_eq!(record.esg_score(), 0.0);
    assert_eq!(record.market_cap, 0.0);
    assert!(record.error_message.is_some());
}

#[tokio::test]
async fn test_scenario_batch_report() {
    let provider = Arc::new(scenario_provider());
    let coordinator = BatchCoordinator::new(Arc::new(resolver(provider)));
    let outcome = coordinator
        .resolve_batch(&tickers(&["RELIANCE.NS", "TCS.NS", "DHFL.NS", "INVALID123.NS"]))
        .await
        .unwrap();
    let report = &outcome.report;

    assert!(!outcome.cancelled);
    assert_eq!(report.total_tickers, 4);
    assert_eq!(report.data_sources.values().sum::<usize>(), 4);
    assert_eq!(report.data_sources.get("live"), Some(&2));
    assert_eq!(report.data_sources.get("live_replacement:DHFL.NS"), Some(&1));
    assert_eq!(report.data_sources.get("sector_default"), Some(&1));
    assert_eq!(report.successful_fetches, 3);
    assert_eq!(report.delisted_count, 1);
    assert_eq!(report.error_count, 1);
    assert_eq!(
        report.problematic_tickers.iter().collect::<Vec<_>>(),
        vec!["INVALID123.NS"]
    );
    let expected = (report.total_tickers - report.error_count) as f64 / report.total_tickers as f64;
    assert!((report.success_rate - expected).abs() < 1e-12);
    assert!((report.success_rate - 0.75).abs() < 1e-12);

    let order: Vec<&str> = outcome.records.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(order, vec!["RELIANCE.NS", "TCS.NS", "DHFL.NS", "INVALID123.NS"]);
}

#[tokio::test]
async fn test_malformed_ticker_in_batch_becomes_error_record() {
    let provider = Arc::new(scenario_provider());
    let coordinator = BatchCoordinator::new(Arc::new(resolver(provider)));
    let outcome = coordinator
        .resolve_batch(&tickers(&["TCS.NS", "BAD TICKER"]))
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.records[1].data_source, DataSource::Error);
    assert!(outcome.report.problematic_tickers.contains("BAD TICKER"));
    assert_eq!(outcome.report.success_rate, 0.5);
}

#[tokio::test]
async fn test_systemic_table_error_aborts_batch() {
    let mut tables = ReferenceTables::default();
    tables.profiles.remove(&Sector::Energy);
    let provider = Arc::new(scenario_provider());
    let coordinator = BatchCoordinator::new(Arc::new(resolver_with(provider.clone(), tables)));

    let err = coordinator
        .resolve_batch(&tickers(&["RELIANCE.NS", "TCS.NS"]))
        .await
        .unwrap_err();
    assert!(err.is_systemic());
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_cancellation_keeps_partial_results() {
    let token = CancelToken::new();
    let provider = Arc::new(scenario_provider().cancelling_on("TCS.NS", token.clone()));
    let coordinator = BatchCoordinator::new(Arc::new(resolver(provider)));

    let outcome = coordinator
        .resolve_batch_with_cancel(
            &tickers(&["RELIANCE.NS", "TCS.NS", "DHFL.NS", "INVALID123.NS"]),
            &token,
        )
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.report.total_tickers, 2);
    assert_eq!(outcome.report.success_rate, 1.0);
}

#[tokio::test]
async fn test_cancelled_before_start_returns_empty_batch() {
    let token = CancelToken::new();
    token.cancel();
    let provider = Arc::new(scenario_provider());
    let coordinator = BatchCoordinator::new(Arc::new(resolver(provider.clone()))).with_concurrency(4);

    let outcome = coordinator
        .resolve_batch_with_cancel(&tickers(&["RELIANCE.NS", "TCS.NS"]), &token)
        .await
        .unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.success_rate, 0.0);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_batch_preserves_order() {
    let provider = Arc::new(scenario_provider());
    let coordinator = BatchCoordinator::new(Arc::new(resolver(provider))).with_concurrency(3);
    let requested = tickers(&["INVALID123.NS", "DHFL.NS", "TCS.NS", "RELIANCE.NS"]);
    let outcome = coordinator.resolve_batch(&requested).await.unwrap();

    let order: Vec<String> = outcome.records.iter().map(|r| r.ticker.clone()).collect();
    assert_eq!(order, requested);
    assert_eq!(outcome.report.data_sources.values().sum::<usize>(), 4);
}

#[tokio::test]
async fn test_live_records_are_cached() {
    let provider = Arc::new(scenario_provider());
    let cache = Arc::new(MemoryRecordCache::with_ttl_hours(24));
    let resolver = resolver(provider.clone()).with_cache(cache.clone());

    let first = resolver.resolve("TCS.NS").await.unwrap();
    let second = resolver.resolve("TCS.NS").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(provider.calls(), vec!["TCS.NS"]);
    assert_eq!(cache.len(), 1);

    // sector defaults are never cached
    resolver.resolve("INVALID123.NS").await.unwrap();
    resolver.resolve("INVALID123.NS").await.unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(provider.calls().len(), 1 + 3 + 3);
}

#[tokio::test]
async fn test_failing_cache_is_a_miss() {
    struct BrokenCache;

    #[async_trait]
    impl RecordCache for BrokenCache {
        async fn get(&self, _key: &esg_core::CacheKey) -> esg_core::EsgResult<Option<esg_core::SecurityRecord>> {
            Err(EsgError::Cache("disk full".to_string()))
        }

        async fn put(&self, _key: &esg_core::CacheKey, _record: &esg_core::SecurityRecord) -> esg_core::EsgResult<()> {
            Err(EsgError::Cache("disk full".to_string()))
        }
    }

    let provider = Arc::new(scenario_provider());
    let resolver = resolver(provider).with_cache(Arc::new(BrokenCache));
    let record = resolver.resolve("RELIANCE.NS").await.unwrap();
    assert_eq!(record.data_source, DataSource::Live);
    assert_eq!(record.sector, Sector::Energy);
}
