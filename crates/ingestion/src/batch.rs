use esg_core::{DataQualityReport, EsgError, EsgResult, SecurityRecord};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::resolver::FallbackResolver;

/// Cooperative cancellation flag, checked before each ticker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// In request order; shorter than the request only when cancelled
    pub records: Vec<SecurityRecord>,
    pub report: DataQualityReport,
    pub cancelled: bool,
}

/// Runs the fallback resolver over a list of tickers.
///
/// Per-ticker problems never abort the batch: a malformed ticker becomes an
/// `error` record. Only a broken reference table does.
pub struct BatchCoordinator {
    resolver: Arc<FallbackResolver>,
    concurrency: usize,
}

impl BatchCoordinator {
    pub fn new(resolver: Arc<FallbackResolver>) -> Self {
        Self {
            resolver,
            concurrency: 1,
        }
    }

    /// Resolve up to `concurrency` tickers at once. Every task still goes
    /// through the fetcher's shared rate limiter.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn resolver(&self) -> &Arc<FallbackResolver> {
        &self.resolver
    }

    pub async fn resolve_batch(&self, tickers: &[String]) -> EsgResult<BatchOutcome> {
        self.resolve_batch_with_cancel(tickers, &CancelToken::new()).await
    }

    pub async fn resolve_batch_with_cancel(
        &self,
        tickers: &[String],
        cancel: &CancelToken,
    ) -> EsgResult<BatchOutcome> {
        self.resolver.classifier().tables().validate()?;

        tracing::info!(
            "Resolving {} tickers (concurrency={})",
            tickers.len(),
            self.concurrency
        );

        let records = if self.concurrency <= 1 {
            self.run_sequential(tickers, cancel).await?
        } else {
            self.run_concurrent(tickers, cancel).await?
        };

        let cancelled = records.len() < tickers.len();
        let report = DataQualityReport::from_records(&records);

        if cancelled {
            tracing::warn!(
                "Batch cancelled after {}/{} tickers",
                records.len(),
                tickers.len()
            );
        }
        tracing::info!(
            "Batch done: {} records, success rate {:.1}%, {} problematic",
            report.total_tickers,
            report.success_rate * 100.0,
            report.problematic_tickers.len()
        );

        Ok(BatchOutcome {
            records,
            report,
            cancelled,
        })
    }

    async fn run_sequential(&self, tickers: &[String], cancel: &CancelToken) -> EsgResult<Vec<SecurityRecord>> {
        let mut records = Vec::with_capacity(tickers.len());
        for (i, ticker) in tickers.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let record = resolve_one(&self.resolver, ticker).await?;
            tracing::info!("[{}/{}] {} => {}", i + 1, tickers.len(), record.ticker, record.data_source);
            records.push(record);
        }
        Ok(records)
    }

    async fn run_concurrent(&self, tickers: &[String], cancel: &CancelToken) -> EsgResult<Vec<SecurityRecord>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let completed = Arc::new(AtomicU64::new(0));
        let total = tickers.len();
        let mut handles = Vec::with_capacity(total);

        for ticker in tickers {
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let cancel = cancel.clone();
            let ticker = ticker.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                let result = resolve_one(&resolver, &ticker).await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Ok(record) = &result {
                    tracing::info!("[{}/{}] {} => {}", done, total, record.ticker, record.data_source);
                }
                Some(result)
            }));
        }

        join_in_order(handles, tickers).await
    }
}

type ResolveTask = JoinHandle<Option<EsgResult<SecurityRecord>>>;

/// Await tasks in request order. A systemic error aborts every task not yet joined.
async fn join_in_order(mut handles: Vec<ResolveTask>, tickers: &[String]) -> EsgResult<Vec<SecurityRecord>> {
    let mut records = Vec::with_capacity(handles.len());
    for i in 0..handles.len() {
        match (&mut handles[i]).await {
            Ok(Some(Ok(record))) => records.push(record),
            Ok(Some(Err(e))) => {
                handles[i + 1..].iter().for_each(JoinHandle::abort);
                tracing::error!("Aborting batch, {} tasks cancelled: {}", handles.len() - i - 1, e);
                return Err(e);
            }
            Ok(None) => {}
            Err(e) => {
                let ticker = tickers.get(i).map(String::as_str).unwrap_or_default();
                tracing::error!("Resolver task for {} failed: {}", ticker, e);
                records.push(SecurityRecord::error(record_ticker(ticker), format!("resolver task failed: {}", e)));
            }
        }
    }
    Ok(records)
}

/// Same form the resolver keys live records by, so weights still match.
fn record_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

async fn resolve_one(resolver: &FallbackResolver, ticker: &str) -> EsgResult<SecurityRecord> {
    match resolver.resolve(ticker).await {
        Ok(record) => Ok(record),
        Err(e) if e.is_systemic() => Err(e),
        Err(e @ EsgError::InvalidIdentifier { .. }) => {
            tracing::warn!("Skipping malformed ticker: {}", e);
            Ok(SecurityRecord::error(record_ticker(ticker), e.to_string()))
        }
        Err(e) => Ok(SecurityRecord::error(record_ticker(ticker), e.to_string())),
    }
}
