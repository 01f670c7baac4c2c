//! Portfolio-level weighted ESG/ROIC metrics over validated records.

use chrono::Utc;
use esg_core::{EsgError, EsgResult, HoldingSummary, PortfolioSummary, SecurityRecord};
use statrs::statistics::Statistics;
use std::collections::{HashMap, HashSet};

pub mod report;

pub use report::{build_portfolio_report, HoldingAnalysis, PortfolioReport};

/// Allowed distance of the weight sum from 1.0
pub const WEIGHT_TOLERANCE: f64 = 0.01;

/// Weighted sums and in-portfolio z-scores.
///
/// Every record needs a weight keyed by its `ticker`, and the weights of the
/// given records must sum to 1.0 within `WEIGHT_TOLERANCE`.
pub fn aggregate(records: &[SecurityRecord], weights: &HashMap<String, f64>) -> EsgResult<PortfolioSummary> {
    let weights = resolve_weights(records, weights)?;

    let esg: Vec<f64> = records.iter().map(|r| r.esg_score()).collect();
    let roic: Vec<f64> = records.iter().map(|r| r.roic).collect();
    let (esg_mean, esg_std_dev) = mean_and_std(&esg);
    let (roic_mean, roic_std_dev) = mean_and_std(&roic);

    let mut holdings: Vec<HoldingSummary> = records
        .iter()
        .zip(&weights)
        .map(|(record, &weight)| HoldingSummary {
            ticker: record.ticker.clone(),
            weight,
            esg_score: record.esg_score(),
            roic: record.roic,
            weighted_esg: record.esg_score() * weight,
            weighted_roic: record.roic * weight,
            esg_zscore: z_score(record.esg_score(), esg_mean, esg_std_dev),
            roic_zscore: z_score(record.roic, roic_mean, roic_std_dev),
            confidence: record.confidence,
            data_source: record.data_source.clone(),
        })
        .collect();

    let portfolio_weighted_esg = holdings.iter().map(|h| h.weighted_esg).sum();
    let portfolio_weighted_roic = holdings.iter().map(|h| h.weighted_roic).sum();

    holdings.sort_by(|a, b| b.esg_score.total_cmp(&a.esg_score));

    Ok(PortfolioSummary {
        holdings,
        portfolio_weighted_esg,
        portfolio_weighted_roic,
        esg_mean,
        esg_std_dev,
        roic_mean,
        roic_std_dev,
        generated_at: Utc::now(),
    })
}

/// Weight per record, in record order, after checking the preconditions.
fn resolve_weights(records: &[SecurityRecord], weights: &HashMap<String, f64>) -> EsgResult<Vec<f64>> {
    if records.is_empty() {
        return Err(EsgError::InvalidWeights("portfolio has no holdings".to_string()));
    }

    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.ticker.as_str()) {
            return Err(EsgError::InvalidWeights(format!("duplicate holding {}", record.ticker)));
        }
        let weight = *weights
            .get(&record.ticker)
            .ok_or_else(|| EsgError::InvalidWeights(format!("missing weight for {}", record.ticker)))?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(EsgError::InvalidWeights(format!(
                "weight for {} must be a non-negative number, got {}",
                record.ticker, weight
            )));
        }
        resolved.push(weight);
    }

    let total: f64 = resolved.iter().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(EsgError::InvalidWeights(format!(
            "weights sum to {:.4}, expected 1.0 ± {}",
            total, WEIGHT_TOLERANCE
        )));
    }

    Ok(resolved)
}

/// Mean and sample standard deviation; the deviation is 0 below two values.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let mean = values.mean();
    let std_dev = if values.len() < 2 { 0.0 } else { values.std_dev() };
    (
        if mean.is_finite() { mean } else { 0.0 },
        if std_dev.is_finite() { std_dev } else { 0.0 },
    )
}

fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev > 0.0 && std_dev.is_finite() {
        (value - mean) / std_dev
    } else {
        0.0
    }
}
