use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Industry sector inferred from a ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sector {
    Banking,
    #[serde(rename = "IT")]
    It,
    Energy,
    #[serde(rename = "FMCG")]
    Fmcg,
    Auto,
    Pharma,
    Telecom,
    Unknown,
}

impl Sector {
    pub const ALL: [Sector; 8] = [
        Sector::Banking,
        Sector::It,
        Sector::Energy,
        Sector::Fmcg,
        Sector::Auto,
        Sector::Pharma,
        Sector::Telecom,
        Sector::Unknown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Sector::Banking => "Banking",
            Sector::It => "IT",
            Sector::Energy => "Energy",
            Sector::Fmcg => "FMCG",
            Sector::Auto => "Auto",
            Sector::Pharma => "Pharma",
            Sector::Telecom => "Telecom",
            Sector::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Sector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sector::ALL
            .iter()
            .copied()
            .find(|sector| sector.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sector '{}'", s))
    }
}

/// Provenance tag recording which fallback tier produced a record.
///
/// Serialized as its tag string, e.g. `"live_replacement:DHFL.NS"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DataSource {
    Live,
    /// A curated substitute succeeded; carries the originally requested ticker.
    LiveReplacement { original: String },
    /// An alternate exchange-suffix form succeeded; carries that form.
    LiveAlternate { identifier: String },
    SectorDefault,
    Error,
}

impl DataSource {
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            DataSource::Live | DataSource::LiveReplacement { .. } | DataSource::LiveAlternate { .. }
        )
    }

    /// Records in these tiers are reported as problematic.
    pub fn is_fallback(&self) -> bool {
        matches!(self, DataSource::SectorDefault | DataSource::Error)
    }

    /// Confidence a record starts with before any validation penalty.
    pub fn base_confidence(&self) -> f64 {
        match self {
            DataSource::Live => 1.0,
            DataSource::LiveAlternate { .. } => 0.9,
            DataSource::LiveReplacement { .. } => 0.8,
            DataSource::SectorDefault => 0.5,
            DataSource::Error => 0.0,
        }
    }

    pub fn tag(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Live => f.write_str("live"),
            DataSource::LiveReplacement { original } => write!(f, "live_replacement:{}", original),
            DataSource::LiveAlternate { identifier } => write!(f, "live_alternate:{}", identifier),
            DataSource::SectorDefault => f.write_str("sector_default"),
            DataSource::Error => f.write_str("error"),
        }
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(DataSource::Live),
            "sector_default" => Ok(DataSource::SectorDefault),
            "error" => Ok(DataSource::Error),
            other => {
                if let Some(original) = other.strip_prefix("live_replacement:") {
                    if !original.is_empty() {
                        return Ok(DataSource::LiveReplacement {
                            original: original.to_string(),
                        });
                    }
                }
                if let Some(identifier) = other.strip_prefix("live_alternate:") {
                    if !identifier.is_empty() {
                        return Ok(DataSource::LiveAlternate {
                            identifier: identifier.to_string(),
                        });
                    }
                }
                Err(format!("unknown data source tag '{}'", other))
            }
        }
    }
}

impl From<DataSource> for String {
    fn from(source: DataSource) -> Self {
        source.to_string()
    }
}

impl TryFrom<String> for DataSource {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Environmental, social and governance sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EsgScores {
    pub environmental: f64,
    pub social: f64,
    pub governance: f64,
}

impl EsgScores {
    pub fn new(environmental: f64, social: f64, governance: f64) -> Self {
        Self {
            environmental,
            social,
            governance,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Arithmetic mean of the three sub-scores
    pub fn composite(&self) -> f64 {
        (self.environmental + self.social + self.governance) / 3.0
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.environmental * factor,
            self.social * factor,
            self.governance * factor,
        )
    }
}

/// One security's resolved data.
///
/// The composite ESG score is derived from the sub-scores on every
/// construction (including deserialization), so it can never go stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SecurityRecordWire")]
pub struct SecurityRecord {
    pub ticker: String,
    pub resolved_identifier: String,
    pub data_source: DataSource,
    pub is_delisted: bool,
    environmental: f64,
    social: f64,
    governance: f64,
    esg_score: f64,
    pub roic: f64,
    pub market_cap: f64,
    pub sector: Sector,
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
    pub as_of: NaiveDate,
    pub last_updated: DateTime<Utc>,
    /// Tail of the live price history, empty for fallback tiers
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_bars: Vec<PriceBar>,
}

impl SecurityRecord {
    pub fn new(
        ticker: impl Into<String>,
        resolved_identifier: impl Into<String>,
        data_source: DataSource,
        sector: Sector,
        scores: EsgScores,
        roic: f64,
        market_cap: f64,
    ) -> Self {
        let now = Utc::now();
        let confidence = data_source.base_confidence();
        Self {
            ticker: ticker.into(),
            resolved_identifier: resolved_identifier.into(),
            is_delisted: matches!(data_source, DataSource::LiveReplacement { .. }),
            data_source,
            environmental: scores.environmental,
            social: scores.social,
            governance: scores.governance,
            esg_score: scores.composite(),
            roic,
            market_cap,
            sector,
            confidence,
            warnings: Vec::new(),
            error_message: None,
            as_of: now.date_naive(),
            last_updated: now,
            recent_bars: Vec::new(),
        }
    }

    /// Sentinel record for the error tier: all numeric fields zero.
    pub fn error(ticker: impl Into<String>, message: impl Into<String>) -> Self {
        let ticker = ticker.into();
        let mut record = Self::new(
            ticker.clone(),
            ticker,
            DataSource::Error,
            Sector::Unknown,
            EsgScores::zero(),
            0.0,
            0.0,
        );
        record.error_message = Some(message.into());
        record
    }

    pub fn environmental(&self) -> f64 {
        self.environmental
    }

    pub fn social(&self) -> f64 {
        self.social
    }

    pub fn governance(&self) -> f64 {
        self.governance
    }

    pub fn esg_score(&self) -> f64 {
        self.esg_score
    }

    pub fn scores(&self) -> EsgScores {
        EsgScores::new(self.environmental, self.social, self.governance)
    }

    /// Copy of this record with replaced sub-scores; the composite is recomputed.
    pub fn with_scores(&self, scores: EsgScores) -> Self {
        let mut record = self.clone();
        record.environmental = scores.environmental;
        record.social = scores.social;
        record.governance = scores.governance;
        record.esg_score = scores.composite();
        record
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Deserialize)]
struct SecurityRecordWire {
    ticker: String,
    resolved_identifier: String,
    data_source: DataSource,
    is_delisted: bool,
    environmental: f64,
    social: f64,
    governance: f64,
    roic: f64,
    market_cap: f64,
    sector: Sector,
    confidence: f64,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    error_message: Option<String>,
    as_of: NaiveDate,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    recent_bars: Vec<PriceBar>,
}

impl From<SecurityRecordWire> for SecurityRecord {
    fn from(wire: SecurityRecordWire) -> Self {
        let scores = EsgScores::new(wire.environmental, wire.social, wire.governance);
        SecurityRecord {
            ticker: wire.ticker,
            resolved_identifier: wire.resolved_identifier,
            data_source: wire.data_source,
            is_delisted: wire.is_delisted,
            environmental: scores.environmental,
            social: scores.social,
            governance: scores.governance,
            esg_score: scores.composite(),
            roic: wire.roic,
            market_cap: wire.market_cap,
            sector: wire.sector,
            confidence: wire.confidence,
            warnings: wire.warnings,
            error_message: wire.error_message,
            as_of: wire.as_of,
            last_updated: wire.last_updated,
            recent_bars: wire.recent_bars,
        }
    }
}

/// Aggregate data-quality figures over one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub total_tickers: usize,
    /// Records resolved by any live tier (direct, replacement or alternate).
    pub successful_fetches: usize,
    pub success_rate: f64,
    pub delisted_count: usize,
    /// Records that ended in the sector-default or error tier.
    pub error_count: usize,
    /// Provenance tag -> number of records.
    pub data_sources: BTreeMap<String, usize>,
    pub problematic_tickers: BTreeSet<String>,
}

impl DataQualityReport {
    pub fn from_records(records: &[SecurityRecord]) -> Self {
        let total_tickers = records.len();
        let successful_fetches = records.iter().filter(|r| r.data_source.is_live()).count();
        let delisted_count = records.iter().filter(|r| r.is_delisted).count();

        let mut data_sources = BTreeMap::new();
        for record in records {
            *data_sources.entry(record.data_source.tag()).or_insert(0) += 1;
        }

        let problematic_tickers: BTreeSet<String> = records
            .iter()
            .filter(|r| r.data_source.is_fallback())
            .map(|r| r.ticker.clone())
            .collect();
        let error_count = records.iter().filter(|r| r.data_source.is_fallback()).count();

        let success_rate = if total_tickers > 0 {
            (total_tickers - error_count) as f64 / total_tickers as f64
        } else {
            0.0
        };

        Self {
            total_tickers,
            successful_fetches,
            success_rate,
            delisted_count,
            error_count,
            data_sources,
            problematic_tickers,
        }
    }
}

/// One holding's contribution to a portfolio summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingSummary {
    pub ticker: String,
    pub weight: f64,
    pub esg_score: f64,
    pub roic: f64,
    pub weighted_esg: f64,
    pub weighted_roic: f64,
    pub esg_zscore: f64,
    pub roic_zscore: f64,
    pub confidence: f64,
    pub data_source: DataSource,
}

/// Portfolio-level weighted metrics, derived from its source records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Sorted by ESG score, highest first
    pub holdings: Vec<HoldingSummary>,
    pub portfolio_weighted_esg: f64,
    pub portfolio_weighted_roic: f64,
    pub esg_mean: f64,
    pub esg_std_dev: f64,
    pub roic_mean: f64,
    pub roic_std_dev: f64,
    pub generated_at: DateTime<Utc>,
}
