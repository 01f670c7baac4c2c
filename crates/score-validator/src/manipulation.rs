use esg_core::{PipelineConfig, PriceBar};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

const VOLUME_SPIKE_POINTS: f64 = 30.0;
const VOLATILITY_POINTS: f64 = 25.0;
const FREQUENT_MOVES_POINTS: f64 = 20.0;
const NEWS_ALERT_POINTS: f64 = 15.0;
/// Large moves in the window before they count as frequent
const FREQUENT_MOVES_MIN: usize = 5;
const MAX_RISK_SCORE: f64 = 100.0;

/// Tiered manipulation risk, lower bound inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Minimal Risk")]
    Minimal,
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else if score >= 20.0 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::High => "High Risk",
            RiskLevel::Medium => "Medium Risk",
            RiskLevel::Low => "Low Risk",
            RiskLevel::Minimal => "Minimal Risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManipulationThresholds {
    /// Last volume over window mean
    pub volume_spike: f64,
    /// Absolute daily return
    pub volatility: f64,
}

impl Default for ManipulationThresholds {
    fn default() -> Self {
        Self {
            volume_spike: 2.0,
            volatility: 0.05,
        }
    }
}

impl From<&PipelineConfig> for ManipulationThresholds {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            volume_spike: config.volume_spike_threshold,
            volatility: config.volatility_threshold,
        }
    }
}

/// Raw manipulation indicators over a recent OHLCV window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulationSignals {
    pub volume_ratio: f64,
    /// Absolute return of the last bar
    pub recent_volatility: f64,
    pub large_moves: usize,
    pub alerts: Vec<String>,
    /// Capped at 100
    pub score: f64,
}

impl ManipulationSignals {
    /// Score a window of daily bars; `news_alerts` come from an external feed.
    pub fn from_bars(bars: &[PriceBar], thresholds: &ManipulationThresholds, news_alerts: &[String]) -> Self {
        let mut alerts = Vec::new();
        let mut score = 0.0;

        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let volume_ratio = match volumes.last() {
            Some(&last) => {
                let mean = volumes.as_slice().mean();
                if mean > 0.0 {
                    last / mean
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        if volume_ratio > thresholds.volume_spike {
            alerts.push(format!("Unusual volume spike: {:.1}x average", volume_ratio));
            score += VOLUME_SPIKE_POINTS;
        }

        let moves: Vec<f64> = bars
            .windows(2)
            .filter(|w| w[0].close > 0.0)
            .map(|w| ((w[1].close - w[0].close) / w[0].close).abs())
            .collect();

        let recent_volatility = moves.last().copied().unwrap_or(0.0);
        if recent_volatility > thresholds.volatility {
            alerts.push(format!(
                "High price volatility: {:.1}% daily change",
                recent_volatility * 100.0
            ));
            score += VOLATILITY_POINTS;
        }

        let large_moves = moves.iter().filter(|m| **m > thresholds.volatility).count();
        if large_moves > FREQUENT_MOVES_MIN {
            alerts.push(format!("Frequent large price movements: {} occurrences", large_moves));
            score += FREQUENT_MOVES_POINTS;
        }

        alerts.extend(news_alerts.iter().cloned());
        score += news_alerts.len() as f64 * NEWS_ALERT_POINTS;

        Self {
            volume_ratio,
            recent_volatility,
            large_moves,
            alerts,
            score: score.min(MAX_RISK_SCORE),
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.score)
    }
}

/// Validated risk score with its tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulationAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub alerts: Vec<String>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_core::PriceBar;

    fn bars(closes: &[f64], volumes: &[f64]) -> Vec<PriceBar> {
        let start = chrono::Utc::now() - chrono::Duration::days(closes.len() as i64);
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| PriceBar {
                timestamp: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect()
    }

    #[test]
    fn test_risk_tiers_inclusive_lower_bound() {
        assert_eq!(RiskLevel::from_score(72.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(70.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(69.9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(20.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(19.99), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Minimal);
        assert_eq!(RiskLevel::High.label(), "High Risk");
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"Medium Risk\"");
    }

    #[test]
    fn test_quiet_window_is_minimal() {
        let window = bars(&[100.0, 100.5, 101.0, 100.8, 101.2], &[1000.0; 5]);
        let signals = ManipulationSignals::from_bars(&window, &ManipulationThresholds::default(), &[]);
        assert_eq!(signals.score, 0.0);
        assert!(signals.alerts.is_empty());
        assert!((signals.volume_ratio - 1.0).abs() < 1e-9);
        assert_eq!(signals.risk_level(), RiskLevel::Minimal);
    }

    #[test]
    fn test_volume_spike_and_jump() {
        let window = bars(
            &[100.0, 100.0, 100.0, 100.0, 110.0],
            &[1000.0, 1000.0, 1000.0, 1000.0, 6000.0],
        );
        let signals = ManipulationSignals::from_bars(&window, &ManipulationThresholds::default(), &[]);
        // 6000 / 2000 = 3x, last move 10%
        assert!((signals.volume_ratio - 3.0).abs() < 1e-9);
        assert_eq!(signals.large_moves, 1);
        assert_eq!(signals.score, 55.0);
        assert_eq!(signals.risk_level(), RiskLevel::Medium);
    }

    #[test]
    fn test_score_is_capped() {
        // alternating 10% swings with a volume spike on the last day
        let closes = [100.0, 110.0, 99.0, 108.9, 98.0, 107.8, 97.0, 106.7];
        let mut volumes = vec![1000.0; 7];
        volumes.push(20_000.0);
        let window = bars(&closes, &volumes);
        let news = vec!["pump allegations".to_string(), "SEBI probe".to_string()];
        let signals = ManipulationSignals::from_bars(&window, &ManipulationThresholds::default(), &news);

        assert!(signals.large_moves > 5);
        // 30 + 25 + 20 + 2 * 15 = 105
        assert_eq!(signals.score, 100.0);
        assert_eq!(signals.risk_level(), RiskLevel::High);
        assert!(signals.alerts.iter().any(|a| a == "SEBI probe"));
    }

    #[test]
    fn test_thresholds_from_config() {
        let config = PipelineConfig {
            volume_spike_threshold: 3.5,
            volatility_threshold: 0.08,
            ..PipelineConfig::default()
        };
        let thresholds = ManipulationThresholds::from(&config);
        assert_eq!(thresholds.volume_spike, 3.5);
        assert_eq!(thresholds.volatility, 0.08);
        assert_eq!(ManipulationThresholds::from(&PipelineConfig::default()), ManipulationThresholds::default());
    }

    #[test]
    fn test_empty_window() {
        let signals = ManipulationSignals::from_bars(&[], &ManipulationThresholds::default(), &[]);
        assert_eq!(signals.volume_ratio, 0.0);
        assert_eq!(signals.score, 0.0);
    }
}
