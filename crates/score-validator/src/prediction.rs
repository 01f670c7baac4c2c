use serde::{Deserialize, Serialize};

/// Hard ceiling on any price-prediction confidence
pub const MAX_PREDICTION_CONFIDENCE: f64 = 0.70;
/// Predicted moves above this (percent) are flagged as high volatility
pub const HIGH_VOLATILITY_CHANGE_PCT: f64 = 10.0;
pub const MIN_DATA_POINTS: usize = 50;
pub const RECOMMENDED_DATA_POINTS: usize = 100;

const THIN_DATA_FACTOR: f64 = 0.5;
const LINEAR_MODEL_FACTOR: f64 = 0.6;
const LINEAR_MODEL_NAME: &str = "Linear Regression";

/// Output of an external price-prediction model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePrediction {
    pub current_price: f64,
    pub predicted_price: f64,
    /// Model-reported confidence in [0, 1]
    pub confidence: f64,
    pub data_points: usize,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Valid,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionValidation {
    /// Never altered by validation
    pub predicted_price: f64,
    pub change_pct: f64,
    /// At most `MAX_PREDICTION_CONFIDENCE`
    pub confidence: f64,
    pub status: PredictionStatus,
    pub warnings: Vec<String>,
    /// False once two or more warnings are raised
    pub is_reliable: bool,
}

impl PricePrediction {
    pub fn change_pct(&self) -> f64 {
        if self.current_price > 0.0 && self.current_price.is_finite() {
            (self.predicted_price - self.current_price) / self.current_price * 100.0
        } else {
            0.0
        }
    }

    pub fn validate(&self) -> PredictionValidation {
        let mut warnings = Vec::new();
        let change_pct = self.change_pct();

        if self.data_points < MIN_DATA_POINTS {
            warnings.push(format!(
                "insufficient data: {} points (need at least {})",
                self.data_points, MIN_DATA_POINTS
            ));
            return PredictionValidation {
                predicted_price: self.predicted_price,
                change_pct,
                confidence: 0.0,
                status: PredictionStatus::InsufficientData,
                warnings,
                is_reliable: false,
            };
        }

        let mut confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        if self.data_points < RECOMMENDED_DATA_POINTS {
            warnings.push(format!(
                "thin history: {} points (recommended {})",
                self.data_points, RECOMMENDED_DATA_POINTS
            ));
            confidence *= THIN_DATA_FACTOR;
        }

        if self.model.eq_ignore_ascii_case(LINEAR_MODEL_NAME) {
            warnings.push("simple linear regression: treat as a rough trend only".to_string());
            confidence *= LINEAR_MODEL_FACTOR;
        }

        if confidence > MAX_PREDICTION_CONFIDENCE {
            warnings.push(format!(
                "confidence {:.2} capped at {:.2}",
                confidence, MAX_PREDICTION_CONFIDENCE
            ));
            confidence = MAX_PREDICTION_CONFIDENCE;
        }

        if change_pct.abs() > HIGH_VOLATILITY_CHANGE_PCT {
            warnings.push(format!("high volatility: predicted change of {:.1}%", change_pct));
        }

        let is_reliable = warnings.len() < 2;
        PredictionValidation {
            predicted_price: self.predicted_price,
            change_pct,
            confidence,
            status: PredictionStatus::Valid,
            warnings,
            is_reliable,
        }
    }
}
