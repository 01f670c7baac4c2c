use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use esg_core::{CacheKey, EsgError, EsgResult, RecordCache, SecurityRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS esg_records (
    ticker TEXT NOT NULL,
    as_of TEXT NOT NULL,
    record_json TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (ticker, as_of)
)";

struct CacheEntry {
    record: SecurityRecord,
    cached_at: DateTime<Utc>,
}

/// In-process record cache with a TTL
pub struct MemoryRecordCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl MemoryRecordCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn with_ttl_hours(hours: i64) -> Self {
        Self::new(Duration::hours(hours))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RecordCache for MemoryRecordCache {
    async fn get(&self, key: &CacheKey) -> EsgResult<Option<SecurityRecord>> {
        let expired = match self.entries.get(key) {
            Some(entry) if Utc::now() - entry.cached_at < self.ttl => {
                return Ok(Some(entry.record.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, record: &SecurityRecord) -> EsgResult<()> {
        let now = Utc::now();
        self.entries.retain(|_, entry| now - entry.cached_at < self.ttl);
        self.entries.insert(
            key.clone(),
            CacheEntry {
                record: record.clone(),
                cached_at: now,
            },
        );
        Ok(())
    }
}

/// SQLite-backed record cache, one row per (ticker, as_of); records stored as JSON.
#[derive(Clone)]
pub struct SqliteRecordCache {
    pool: SqlitePool,
    ttl: Duration,
}

fn cache_err(e: impl std::fmt::Display) -> EsgError {
    EsgError::Cache(e.to_string())
}

impl SqliteRecordCache {
    pub async fn new(database_url: &str, ttl: Duration) -> EsgResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(cache_err)?
            .create_if_missing(true);

        // every in-memory connection is its own database, so keep exactly one alive
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(cache_err)?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(cache_err)?;

        tracing::info!("Record cache ready at {}", database_url);
        Ok(Self { pool, ttl })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordCache for SqliteRecordCache {
    async fn get(&self, key: &CacheKey) -> EsgResult<Option<SecurityRecord>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT record_json, cached_at FROM esg_records WHERE ticker = ? AND as_of = ?",
        )
        .bind(&key.ticker)
        .bind(key.as_of.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(cache_err)?;

        let Some((json, cached_at)) = row else {
            return Ok(None);
        };

        let cached_at = DateTime::parse_from_rfc3339(&cached_at)
            .map_err(cache_err)?
            .with_timezone(&Utc);
        if Utc::now() - cached_at >= self.ttl {
            return Ok(None);
        }

        let record = serde_json::from_str(&json).map_err(cache_err)?;
        Ok(Some(record))
    }

    async fn put(&self, key: &CacheKey, record: &SecurityRecord) -> EsgResult<()> {
        let json = serde_json::to_string(record).map_err(cache_err)?;
        sqlx::query(
            "INSERT INTO esg_records (ticker, as_of, record_json, cached_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(ticker, as_of) DO UPDATE SET
                record_json = excluded.record_json,
                cached_at = excluded.cached_at",
        )
        .bind(&key.ticker)
        .bind(key.as_of.to_string())
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(cache_err)?;
        Ok(())
    }
}
