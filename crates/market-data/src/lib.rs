//! Upstream market-data access: the Yahoo Finance client, the shared
//! request pacing budget and the Source Fetcher that turns provider calls
//! into `Success` / `Empty` / `Failure` outcomes.

pub mod fetcher;
pub mod rate_limiter;
pub mod yahoo;

pub use fetcher::{FetchOutcome, FetcherSettings, SourceFetcher};
pub use rate_limiter::RateLimiter;
pub use yahoo::YahooFinanceClient;
