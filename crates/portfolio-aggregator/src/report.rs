use esg_core::{DataQualityReport, DataSource, EsgResult, PortfolioSummary, SecurityRecord};
use ingestion::{BatchCoordinator, CancelToken};
use score_validator::{BenchmarkComparison, ManipulationAssessment, ScoreValidator};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::aggregate;

/// Sector benchmarking and manipulation risk for one holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingAnalysis {
    pub ticker: String,
    /// Empty for error records
    pub benchmark: Vec<BenchmarkComparison>,
    /// None when the record has no live price history
    pub manipulation: Option<ManipulationAssessment>,
}

/// Records, data quality and portfolio metrics for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    /// Validated records in request order
    pub records: Vec<SecurityRecord>,
    /// Same order as `records`
    pub analyses: Vec<HoldingAnalysis>,
    pub data_quality: DataQualityReport,
    /// None when the batch was cancelled before every holding resolved
    pub summary: Option<PortfolioSummary>,
    pub cancelled: bool,
}

/// Resolve, validate and aggregate a weighted list of tickers.
///
/// Records come back in request order, so each weight is paired with the
/// record at the same position regardless of how its ticker was spelled.
pub async fn build_portfolio_report(
    coordinator: &BatchCoordinator,
    validator: &ScoreValidator,
    holdings: &[(String, f64)],
    cancel: &CancelToken,
) -> EsgResult<PortfolioReport> {
    let tickers: Vec<String> = holdings.iter().map(|(t, _)| t.clone()).collect();
    let outcome = coordinator.resolve_batch_with_cancel(&tickers, cancel).await?;

    let records: Vec<SecurityRecord> = outcome
        .records
        .iter()
        .map(|r| validator.validate_record(r))
        .collect();

    let analyses = records.iter().map(|r| analyse(validator, r)).collect();

    let summary = if outcome.cancelled {
        tracing::warn!("Skipping portfolio summary for a cancelled batch");
        None
    } else {
        let weights: HashMap<String, f64> = records
            .iter()
            .zip(holdings)
            .map(|(record, (_, weight))| (record.ticker.clone(), *weight))
            .collect();
        Some(aggregate(&records, &weights)?)
    };

    Ok(PortfolioReport {
        records,
        analyses,
        data_quality: outcome.report,
        summary,
        cancelled: outcome.cancelled,
    })
}

fn analyse(validator: &ScoreValidator, record: &SecurityRecord) -> HoldingAnalysis {
    let benchmark = if record.data_source == DataSource::Error {
        Vec::new()
    } else {
        validator.benchmark(record)
    };
    HoldingAnalysis {
        ticker: record.ticker.clone(),
        benchmark,
        manipulation: validator.assess_record(record),
    }
}
