use esg_core::{
    DataSource, EsgScores, ReferenceTables, ScoreBand, Sector, SectorClassifier, SectorProfile,
    SecurityRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::manipulation::{ManipulationAssessment, ManipulationSignals, ManipulationThresholds, RiskLevel};
use crate::prediction::{PredictionValidation, PricePrediction, MAX_PREDICTION_CONFIDENCE};

const RANGE_PENALTY: f64 = 0.05;
const DEVIATION_PENALTY: f64 = 0.2;
const SUSPICIOUS_PENALTY: f64 = 0.15;
/// Allowed relative distance of the composite from the sector average
const MAX_DEVIATION: f64 = 0.5;

/// Kind of a standalone score passed to `validate_score`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    Environmental,
    Social,
    Governance,
    /// Composite ESG score
    Esg,
    Roic,
    PredictionConfidence,
    ManipulationRisk,
}

impl ScoreKind {
    pub fn field_name(&self) -> &'static str {
        match self {
            ScoreKind::Environmental => "environmental",
            ScoreKind::Social => "social",
            ScoreKind::Governance => "governance",
            ScoreKind::Esg => "esg_score",
            ScoreKind::Roic => "roic",
            ScoreKind::PredictionConfidence => "prediction_confidence",
            ScoreKind::ManipulationRisk => "manipulation_risk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedScore {
    pub kind: ScoreKind,
    pub sector: Sector,
    pub original: f64,
    pub value: f64,
    pub confidence: f64,
    pub warnings: Vec<String>,
    /// Set for `ManipulationRisk` only
    pub risk_level: Option<RiskLevel>,
}

/// One sub-score placed within its sector band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub field: String,
    pub score: f64,
    pub sector_average: f64,
    pub sector_min: f64,
    pub sector_max: f64,
    pub percentile: u8,
}

/// Sector-aware plausibility checks.
///
/// `validate_record` never mutates its input. Confidence is recomputed from
/// the record's provenance on every call and warnings are rebuilt, so
/// validating an in-band record twice gives the same result.
#[derive(Debug, Clone)]
pub struct ScoreValidator {
    classifier: SectorClassifier,
    thresholds: ManipulationThresholds,
}

impl ScoreValidator {
    pub fn new(classifier: SectorClassifier) -> Self {
        Self {
            classifier,
            thresholds: ManipulationThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: ManipulationThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn thresholds(&self) -> &ManipulationThresholds {
        &self.thresholds
    }

    pub fn from_tables(tables: Arc<ReferenceTables>) -> Self {
        Self::new(SectorClassifier::new(tables))
    }

    pub fn classifier(&self) -> &SectorClassifier {
        &self.classifier
    }

    pub fn validate_record(&self, record: &SecurityRecord) -> SecurityRecord {
        let base = record.data_source.base_confidence();

        if record.data_source == DataSource::Error {
            let mut out = record.clone();
            out.confidence = 0.0;
            out.warnings = vec!["error record: no usable data".to_string()];
            return out;
        }

        let Some(profile) = self.classifier.profile(record.sector) else {
            let mut out = record.clone();
            out.confidence = (base - DEVIATION_PENALTY).max(0.0);
            out.warnings = vec![format!("no benchmark profile for sector {}", record.sector)];
            return out;
        };

        let mut warnings = Vec::new();
        let mut penalty = 0.0;

        let environmental = clamp_field("environmental", record.environmental(), &profile.environmental, &mut warnings);
        let social = clamp_field("social", record.social(), &profile.social, &mut warnings);
        let governance = clamp_field("governance", record.governance(), &profile.governance, &mut warnings);
        let roic = clamp_field("roic", record.roic, &profile.roic, &mut warnings);
        penalty += warnings.len() as f64 * RANGE_PENALTY;

        let scores = EsgScores::new(environmental, social, governance);

        if let Some(warning) = deviation_warning(scores.composite(), profile) {
            warnings.push(warning);
            penalty += DEVIATION_PENALTY;
        }

        if let Some(warning) = suspicious_pattern(&scores, profile) {
            warnings.push(warning);
            penalty += SUSPICIOUS_PENALTY;
        }

        if !warnings.is_empty() {
            tracing::debug!("{}: {} validation warnings", record.ticker, warnings.len());
        }

        let mut out = record.with_scores(scores);
        out.roic = roic;
        out.confidence = (base - penalty).clamp(0.0, 1.0);
        out.warnings = warnings;
        out
    }

    /// Validate a single score of the given kind against a sector's bands.
    pub fn validate_score(&self, value: f64, kind: ScoreKind, sector: Sector) -> ValidatedScore {
        let mut result = ValidatedScore {
            kind,
            sector,
            original: value,
            value,
            confidence: 1.0,
            warnings: Vec::new(),
            risk_level: None,
        };

        if !value.is_finite() {
            result.value = 0.0;
            result.confidence = 0.0;
            result.warnings.push(format!("{} is not a finite number", kind.field_name()));
            if kind == ScoreKind::ManipulationRisk {
                result.risk_level = Some(RiskLevel::from_score(0.0));
            }
            return result;
        }

        match kind {
            ScoreKind::PredictionConfidence => {
                let capped = value.clamp(0.0, MAX_PREDICTION_CONFIDENCE);
                if capped != value {
                    result
                        .warnings
                        .push(format!("prediction confidence {:.2} limited to {:.2}", value, capped));
                }
                result.value = capped;
                result.confidence = capped;
            }
            ScoreKind::ManipulationRisk => {
                let bounded = value.clamp(0.0, 100.0);
                if bounded != value {
                    result
                        .warnings
                        .push(format!("manipulation_risk out of range, clamped to {}", bounded));
                }
                result.value = bounded;
                result.risk_level = Some(RiskLevel::from_score(bounded));
            }
            _ => {
                let Some(profile) = self.classifier.profile(sector) else {
                    result.confidence = 1.0 - DEVIATION_PENALTY;
                    result.warnings.push(format!("no benchmark profile for sector {}", sector));
                    return result;
                };
                let band = band_for(kind, profile);
                result.value = clamp_field(kind.field_name(), value, &band, &mut result.warnings);
                let mut penalty = result.warnings.len() as f64 * RANGE_PENALTY;

                if kind == ScoreKind::Esg {
                    if let Some(warning) = deviation_warning(result.value, profile) {
                        result.warnings.push(warning);
                        penalty += DEVIATION_PENALTY;
                    }
                }
                result.confidence = (1.0 - penalty).max(0.0);
            }
        }

        result
    }

    pub fn validate_prediction(&self, prediction: &PricePrediction) -> PredictionValidation {
        prediction.validate()
    }

    /// Tier a 0-100 manipulation risk score.
    pub fn assess_manipulation(&self, score: f64, alerts: Vec<String>) -> ManipulationAssessment {
        let validated = self.validate_score(score, ScoreKind::ManipulationRisk, Sector::Unknown);
        ManipulationAssessment {
            score: validated.value,
            level: validated.risk_level.unwrap_or(RiskLevel::Minimal),
            alerts,
            warnings: validated.warnings,
        }
    }

    pub fn assess_signals(&self, signals: &ManipulationSignals) -> ManipulationAssessment {
        self.assess_manipulation(signals.score, signals.alerts.clone())
    }

    /// Score the record's recent bars; None when it carries no price history.
    pub fn assess_record(&self, record: &SecurityRecord) -> Option<ManipulationAssessment> {
        if record.recent_bars.is_empty() {
            return None;
        }
        let signals = ManipulationSignals::from_bars(&record.recent_bars, &self.thresholds, &[]);
        if signals.risk_level() >= RiskLevel::Medium {
            tracing::warn!("{}: {} (score {:.0})", record.ticker, signals.risk_level(), signals.score);
        }
        Some(self.assess_signals(&signals))
    }

    /// Position of each sub-score inside its sector band.
    pub fn benchmark(&self, record: &SecurityRecord) -> Vec<BenchmarkComparison> {
        let Some(profile) = self.classifier.profile(record.sector) else {
            return Vec::new();
        };
        [
            ("environmental", record.environmental(), &profile.environmental),
            ("social", record.social(), &profile.social),
            ("governance", record.governance(), &profile.governance),
        ]
        .into_iter()
        .map(|(field, score, band)| BenchmarkComparison {
            field: field.to_string(),
            score,
            sector_average: band.average,
            sector_min: band.min,
            sector_max: band.max,
            percentile: band.percentile(score),
        })
        .collect()
    }
}

fn band_for(kind: ScoreKind, profile: &SectorProfile) -> ScoreBand {
    match kind {
        ScoreKind::Environmental => profile.environmental,
        ScoreKind::Social => profile.social,
        ScoreKind::Governance => profile.governance,
        ScoreKind::Roic => profile.roic,
        // composite band spans the mean of the sub-score bands
        _ => ScoreBand::new(
            (profile.environmental.min + profile.social.min + profile.governance.min) / 3.0,
            (profile.environmental.max + profile.social.max + profile.governance.max) / 3.0,
            profile.composite_average(),
        ),
    }
}

fn clamp_field(name: &str, value: f64, band: &ScoreBand, warnings: &mut Vec<String>) -> f64 {
    if band.contains(value) {
        return value;
    }
    let clamped = band.clamp(value);
    warnings.push(format!("{} out of sector range, clamped to {}", name, clamped));
    clamped
}

fn deviation_warning(composite: f64, profile: &SectorProfile) -> Option<String> {
    let average = profile.composite_average();
    if average <= 0.0 {
        return None;
    }
    let deviation = (composite - average).abs() / average;
    (deviation > MAX_DEVIATION).then(|| {
        format!(
            "esg_score {:.1} deviates {:.0}% from sector average {:.1}",
            composite,
            deviation * 100.0,
            average
        )
    })
}

fn suspicious_pattern(scores: &EsgScores, profile: &SectorProfile) -> Option<String> {
    let identical = scores.environmental == scores.social && scores.social == scores.governance;
    let at_max = *scores == profile.max_scores();
    if identical {
        Some("suspicious pattern: identical sub-scores".to_string())
    } else if at_max {
        Some("suspicious pattern: all sub-scores at sector maximum".to_string())
    } else {
        None
    }
}
