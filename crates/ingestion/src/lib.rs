//! Ticker ingestion: candidate generation, the tiered fallback resolver,
//! batch coordination with a data-quality report, and record caches.

pub mod batch;
pub mod cache;
pub mod identifiers;
pub mod resolver;

#[cfg(test)]
mod tests;

pub use batch::{BatchCoordinator, BatchOutcome, CancelToken};
pub use cache::{MemoryRecordCache, SqliteRecordCache};
pub use identifiers::{Candidate, CandidateKind, IdentifierNormalizer};
pub use resolver::FallbackResolver;
