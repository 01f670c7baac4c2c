//! esg-loader: resolve a list of tickers through the fallback chain, validate
//! the scores and print a weighted portfolio report as JSON.
//!
//! Usage:
//!   cargo run -p esg-loader -- --tickers RELIANCE.NS TCS.NS DHFL.NS
//!   cargo run -p esg-loader -- --tickers TCS.NS INFY.NS --weights 0.6 0.4
//!   cargo run -p esg-loader -- --tickers TCS.NS --cache sqlite:esg_cache.db --concurrency 2

use anyhow::{bail, Context, Result};
use esg_core::PipelineConfig;
use ingestion::{BatchCoordinator, CancelToken, FallbackResolver, MemoryRecordCache, SqliteRecordCache};
use market_data::{SourceFetcher, YahooFinanceClient};
use portfolio_aggregator::build_portfolio_report;
use score_validator::{ManipulationThresholds, ScoreValidator};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct CliArgs {
    tickers: Vec<String>,
    weights: Option<Vec<f64>>,
    cache_url: Option<String>,
    concurrency: Option<usize>,
    tables_path: Option<PathBuf>,
}

/// Values following `flag` up to the next `--option`.
fn list_after<'a>(args: &'a [String], flag: &str) -> Option<Vec<&'a String>> {
    let idx = args.iter().position(|a| a == flag)?;
    Some(args[idx + 1..].iter().take_while(|a| !a.starts_with("--")).collect())
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .filter(|v| !v.starts_with("--"))
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let tickers: Vec<String> = list_after(args, "--tickers")
        .unwrap_or_default()
        .into_iter()
        .cloned()
        .collect();
    if tickers.is_empty() {
        bail!("--tickers requires at least one ticker");
    }

    let weights = match list_after(args, "--weights") {
        Some(raw) => {
            let parsed = raw
                .iter()
                .map(|w| w.parse::<f64>().with_context(|| format!("invalid weight '{}'", w)))
                .collect::<Result<Vec<_>>>()?;
            if parsed.len() != tickers.len() {
                bail!("{} weights given for {} tickers", parsed.len(), tickers.len());
            }
            Some(parsed)
        }
        None => None,
    };

    let concurrency = value_after(args, "--concurrency")
        .map(|v| v.parse::<usize>().with_context(|| format!("invalid --concurrency '{}'", v)))
        .transpose()?;

    Ok(CliArgs {
        tickers,
        weights,
        cache_url: value_after(args, "--cache").cloned(),
        concurrency,
        tables_path: value_after(args, "--tables").map(PathBuf::from),
    })
}

fn holdings(args: &CliArgs) -> Vec<(String, f64)> {
    let equal = 1.0 / args.tickers.len() as f64;
    args.tickers
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let weight = args.weights.as_ref().and_then(|w| w.get(i).copied()).unwrap_or(equal);
            (t.clone(), weight)
        })
        .collect()
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  esg-loader --tickers T1 T2 ...           Resolve and report on tickers");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --weights W1 W2 ...   Portfolio weights, one per ticker (default: equal)");
    eprintln!("  --cache URL           SQLite record cache, e.g. sqlite:esg_cache.db");
    eprintln!("  --concurrency N       Tickers resolved in parallel (default: 1)");
    eprintln!("  --tables FILE         JSON reference tables overriding the built-in ones");
}

fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "esg_loader=info,ingestion=info,market_data=warn".into())
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout carries the report
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {:#}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    let mut config = PipelineConfig::from_env().context("loading configuration")?;
    if let Some(n) = args.concurrency {
        config.batch_concurrency = n.max(1);
    }
    if let Some(url) = &args.cache_url {
        config.cache_url = Some(url.clone());
    }
    if let Some(path) = &args.tables_path {
        config.tables_path = Some(path.clone());
    }

    let tables = config.load_tables()?;
    tables.validate().context("reference tables failed validation")?;

    let provider = Arc::new(YahooFinanceClient::new(config.fetch_timeout()));
    let fetcher = SourceFetcher::from_config(provider, &config);

    let ttl = chrono::Duration::hours(config.cache_ttl_hours);
    let resolver = match &config.cache_url {
        Some(url) => {
            let cache = SqliteRecordCache::new(url, ttl)
                .await
                .with_context(|| format!("opening record cache {}", url))?;
            FallbackResolver::new(Arc::clone(&tables), fetcher).with_cache(Arc::new(cache))
        }
        None => FallbackResolver::new(Arc::clone(&tables), fetcher)
            .with_cache(Arc::new(MemoryRecordCache::new(ttl))),
    };

    let coordinator = BatchCoordinator::new(Arc::new(resolver)).with_concurrency(config.batch_concurrency);
    let validator = ScoreValidator::from_tables(tables).with_thresholds(ManipulationThresholds::from(&config));

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl-C received, stopping after the current ticker");
                cancel.cancel();
            }
        });
    }

    tracing::info!(
        "esg-loader: {} tickers, concurrency={}, cache={}",
        args.tickers.len(),
        config.batch_concurrency,
        config.cache_url.as_deref().unwrap_or("memory")
    );

    let report = build_portfolio_report(&coordinator, &validator, &holdings(&args), &cancel).await?;

    tracing::info!(
        "Done: {}/{} live, {} problematic{}",
        report.data_quality.successful_fetches,
        report.data_quality.total_tickers,
        report.data_quality.problematic_tickers.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
