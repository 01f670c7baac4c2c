//! Sector-aware plausibility checks for ESG, ROIC, price-prediction and
//! manipulation-risk scores. Pure transformations, no I/O.

pub mod manipulation;
pub mod prediction;
pub mod validator;

pub use manipulation::{ManipulationAssessment, ManipulationSignals, ManipulationThresholds, RiskLevel};
pub use prediction::{PredictionStatus, PredictionValidation, PricePrediction};
pub use validator::{BenchmarkComparison, ScoreKind, ScoreValidator, ValidatedScore};
