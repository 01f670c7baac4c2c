use esg_core::{
    CacheKey, DataSource, EsgResult, EsgScores, ProviderSnapshot, RecordCache, ReferenceTables, Sector,
    SectorClassifier, SectorProfile, SecurityRecord,
};
use market_data::{FetchOutcome, SourceFetcher};
use std::sync::Arc;

use crate::identifiers::{Candidate, CandidateKind, IdentifierNormalizer};

/// Market cap above which the sector-default ESG proxy gets a size bonus
const LARGE_CAP: f64 = 100e9;
const MID_CAP: f64 = 10e9;
/// Bars kept on a live record for manipulation scoring
const RECENT_BARS: usize = 30;

/// Walks the fallback tiers for one ticker and returns exactly one record.
///
/// Tiers, first success wins:
/// 1. live fetch over every candidate (original, substitute, suffix variants)
/// 2. sector default synthesized from the classifier's profile table
/// 3. error sentinel, only when the ticker's sector has no profile
///
/// Only a malformed ticker makes `resolve` return `Err`.
pub struct FallbackResolver {
    normalizer: IdentifierNormalizer,
    classifier: SectorClassifier,
    fetcher: SourceFetcher,
    cache: Option<Arc<dyn RecordCache>>,
}

impl FallbackResolver {
    pub fn new(tables: Arc<ReferenceTables>, fetcher: SourceFetcher) -> Self {
        Self {
            normalizer: IdentifierNormalizer::new(Arc::clone(&tables)),
            classifier: SectorClassifier::new(tables),
            fetcher,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn RecordCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn classifier(&self) -> &SectorClassifier {
        &self.classifier
    }

    pub fn normalizer(&self) -> &IdentifierNormalizer {
        &self.normalizer
    }

    pub fn fetcher(&self) -> &SourceFetcher {
        &self.fetcher
    }

    pub async fn resolve(&self, ticker: &str) -> EsgResult<SecurityRecord> {
        let candidates = self.normalizer.candidates(ticker)?;
        let ticker = candidates[0].identifier.clone();

        let key = CacheKey::new(ticker.clone(), chrono::Utc::now().date_naive());
        if let Some(record) = self.cached(&key).await {
            tracing::debug!("{}: cache hit ({})", ticker, record.data_source);
            return Ok(record);
        }

        let mut failures = Vec::new();
        for candidate in &candidates {
            match self.fetcher.fetch(&candidate.identifier).await {
                FetchOutcome::Success(snapshot) => {
                    let mut record = self.live_record(&ticker, candidate, &snapshot);
                    if !failures.is_empty() {
                        record.error_message = Some(failures.join("; "));
                    }
                    if record.data_source.is_live() {
                        tracing::info!("{}: resolved via {}", ticker, record.data_source);
                        self.store(&key, &record).await;
                    }
                    return Ok(record);
                }
                FetchOutcome::Empty { reason } | FetchOutcome::Failure { reason } => {
                    tracing::debug!("{}: candidate {} unusable: {}", ticker, candidate.identifier, reason);
                    failures.push(format!("{}: {}", candidate.identifier, reason));
                }
            }
        }

        let detail = failures.join("; ");
        Ok(self.sector_default_record(&ticker, detail))
    }

    async fn cached(&self, key: &CacheKey) -> Option<SecurityRecord> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key.ticker, e);
                None
            }
        }
    }

    async fn store(&self, key: &CacheKey, record: &SecurityRecord) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(key, record).await {
                tracing::warn!("Cache write failed for {}: {}", key.ticker, e);
            }
        }
    }

    fn live_record(&self, ticker: &str, candidate: &Candidate, snapshot: &ProviderSnapshot) -> SecurityRecord {
        let source = match candidate.kind {
            CandidateKind::Original => DataSource::Live,
            CandidateKind::Substitute => DataSource::LiveReplacement {
                original: ticker.to_string(),
            },
            CandidateKind::Alternate => DataSource::LiveAlternate {
                identifier: candidate.identifier.clone(),
            },
        };

        // a substitute inherits the substitute's sector
        let mut sector = self.classifier.classify(ticker);
        if sector == Sector::Unknown {
            sector = self.classifier.classify(&candidate.identifier);
        }
        if sector == Sector::Unknown {
            if let Some(label) = &snapshot.sector {
                sector = self.classifier.classify_provider_sector(label);
                tracing::debug!("{}: provider sector '{}' mapped to {}", ticker, label, sector);
            }
        }

        let Some(profile) = self.classifier.profile(sector) else {
            return self.error_record(ticker, format!("no default profile for sector {}", sector));
        };

        let market_cap = snapshot
            .market_cap
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(profile.default_market_cap);

        let roic = match (snapshot.return_on_assets, snapshot.return_on_equity) {
            (Some(roa), Some(roe)) => (roa + roe) / 2.0,
            _ => snapshot.profit_margin.unwrap_or_else(|| profile.default_roic()),
        };

        let scores = snapshot
            .esg
            .unwrap_or_else(|| estimated_scores(profile, market_cap));

        let mut record = SecurityRecord::new(
            ticker,
            candidate.identifier.clone(),
            source,
            sector,
            scores,
            roic,
            market_cap,
        );
        let skip = snapshot.bars.len().saturating_sub(RECENT_BARS);
        record.recent_bars = snapshot.bars[skip..].to_vec();
        record
    }

    fn sector_default_record(&self, ticker: &str, detail: String) -> SecurityRecord {
        let sector = self.classifier.classify(ticker);
        let Some(profile) = self.classifier.profile(sector) else {
            return self.error_record(ticker, format!("no default profile for sector {}", sector));
        };

        tracing::warn!("{}: no live data, using {} sector defaults", ticker, sector);
        let mut record = SecurityRecord::new(
            ticker,
            ticker,
            DataSource::SectorDefault,
            sector,
            profile.default_scores(),
            profile.default_roic(),
            profile.default_market_cap,
        );
        if !detail.is_empty() {
            record.error_message = Some(detail);
        }
        record
    }

    fn error_record(&self, ticker: &str, message: String) -> SecurityRecord {
        tracing::error!("{}: {}", ticker, message);
        SecurityRecord::error(ticker, message)
    }
}

/// Sector-average sub-scores scaled up for large companies, capped at the band maximum.
fn estimated_scores(profile: &SectorProfile, market_cap: f64) -> EsgScores {
    let multiplier = if market_cap > LARGE_CAP {
        1.2
    } else if market_cap > MID_CAP {
        1.1
    } else {
        1.0
    };
    let scaled = profile.default_scores().scaled(multiplier);
    EsgScores::new(
        scaled.environmental.min(profile.environmental.max),
        scaled.social.min(profile.social.max),
        scaled.governance.min(profile.governance.max),
    )
}
