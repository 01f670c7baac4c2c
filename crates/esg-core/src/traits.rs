use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{EsgResult, EsgScores, PriceBar, ProviderError, SecurityRecord};

/// Raw per-identifier data as returned by an upstream provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub identifier: String,
    pub bars: Vec<PriceBar>,
    pub market_cap: Option<f64>,
    pub return_on_assets: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub profit_margin: Option<f64>,
    /// Provider's own sector label, if any
    pub sector: Option<String>,
    /// Rarely available upstream
    pub esg: Option<EsgScores>,
}

/// Upstream market-data provider (Yahoo Finance in production, scripted in tests)
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_snapshot(
        &self,
        identifier: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ProviderSnapshot, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

/// Cache key: one record per ticker per as-of date
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub ticker: String,
    pub as_of: NaiveDate,
}

impl CacheKey {
    pub fn new(ticker: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            as_of,
        }
    }
}

/// Optional persistent cache of resolved records (get/put contract)
#[async_trait]
pub trait RecordCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> EsgResult<Option<SecurityRecord>>;

    async fn put(&self, key: &CacheKey, record: &SecurityRecord) -> EsgResult<()>;
}
