//! # Tickguard Warehouse
//!
//! DuckDB-backed persistent artifact store (the L3 cache tier).
//!
//! Artifacts kept here are expensive to recompute: AI-generated filing
//! summaries, aggregated company profiles, and append-only news sentiment
//! records. Every write computes an absolute expiry from the [`TtlPolicy`]
//! so reads never consult the policy.
//!
//! ## Tables
//!
//! | Table | Key | Expires |
//! |-------|-----|---------|
//! | `filing_summaries` | ticker, filing type, filing date | per tier |
//! | `company_profiles` | ticker | per tier |
//! | `news_sentiment` | ticker, news date, news url | never |
//!
//! ## Versioning
//!
//! `data_version` only moves forward per key. A write carrying an older
//! version than the stored row is rejected with
//! [`WarehouseError::VersionConflict`]; a read whose expected version differs
//! from the stored one is reported as a miss.
//!
//! All methods here are synchronous and fallible. The async, failure-absorbing
//! facade lives in `tickguard-core`.

pub mod duckdb;
pub mod migrations;
pub mod models;
pub mod policy;

use std::env;
use std::fs;
use std::path::PathBuf;

use ::duckdb::{Connection, ToSql};
use thiserror::Error;

pub use duckdb::{ConnectionPool, PooledConnection};
pub use models::{
    normalize_ticker, CompanyProfile, CompanyProfileDraft, FilingKey, FilingSummary,
    FilingSummaryDraft, IsoDate, NewsSentimentDraft, NewsSentimentRecord,
};
pub use policy::{AccountTier, ArtifactKind, TtlPolicy};

use models::{validate_news, validate_version};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (creating the data directory).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON column could not be encoded or decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A write tried to move `data_version` backwards.
    #[error("{kind} for '{key}' is at version {stored}; refusing to write version {attempted}")]
    VersionConflict {
        kind: ArtifactKind,
        key: String,
        stored: i64,
        attempted: i64,
    },

    /// Input failed validation or a stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept around.
    pub max_pool_size: usize,
    pub ttl_policy: TtlPolicy,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: resolve_tickguard_home().join("artifacts.duckdb"),
            max_pool_size: 4,
            ttl_policy: TtlPolicy::default(),
        }
    }
}

/// Persistent artifact store.
#[derive(Clone)]
pub struct Warehouse {
    pool: ConnectionPool,
    ttl_policy: TtlPolicy,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let pool = ConnectionPool::open(config.db_path, config.max_pool_size)?;
        Self::initialize(pool, config.ttl_policy)
    }

    /// Open a throwaway in-memory warehouse.
    pub fn open_in_memory(ttl_policy: TtlPolicy) -> Result<Self, WarehouseError> {
        let pool = ConnectionPool::open_in_memory(2)?;
        Self::initialize(pool, ttl_policy)
    }

    fn initialize(pool: ConnectionPool, ttl_policy: TtlPolicy) -> Result<Self, WarehouseError> {
        let connection = pool.acquire()?;
        migrations::apply_migrations(&connection)?;
        drop(connection);
        Ok(Self { pool, ttl_policy })
    }

    pub fn db_path(&self) -> &std::path::Path {
        self.pool.db_path()
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl_policy
    }

    /// Insert or refresh a filing summary. The expiry is derived from `tier`.
    pub fn put_filing_summary(
        &self,
        draft: &FilingSummaryDraft,
        tier: AccountTier,
        now_ms: i64,
    ) -> Result<FilingSummary, WarehouseError> {
        validate_version(draft.data_version)?;
        let key = draft.key.normalized()?;
        let expires_at_ms = self
            .ttl_policy
            .expires_at_ms(ArtifactKind::FilingSummary, tier, now_ms)
            .unwrap_or(i64::MAX);
        let key_points = serde_json::to_string(&draft.key_points)?;
        let filing_date = key.filing_date.format_iso();

        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let key_params: [&dyn ToSql; 3] = [&key.ticker, &key.filing_type, &filing_date];
            let stored = stored_version(
                &connection,
                "SELECT data_version FROM filing_summaries \
                 WHERE ticker = ? AND filing_type = ? AND filing_date = CAST(? AS DATE)",
                key_params.as_slice(),
            )?;

            match stored {
                Some(stored) if stored > draft.data_version => {
                    Err(WarehouseError::VersionConflict {
                        kind: ArtifactKind::FilingSummary,
                        key: format!("{}:{}:{}", key.ticker, key.filing_type, filing_date),
                        stored,
                        attempted: draft.data_version,
                    })
                }
                Some(_) => {
                    let params: [&dyn ToSql; 10] = [
                        &draft.summary,
                        &key_points,
                        &draft.sentiment_score,
                        &now_ms,
                        &draft.generated_by,
                        &draft.data_version,
                        &expires_at_ms,
                        &key.ticker,
                        &key.filing_type,
                        &filing_date,
                    ];
                    connection.execute(
                        "UPDATE filing_summaries SET summary = ?, key_points = ?, \
                         sentiment_score = ?, generated_at_ms = ?, generated_by = ?, \
                         data_version = ?, expires_at_ms = ? \
                         WHERE ticker = ? AND filing_type = ? AND filing_date = CAST(? AS DATE)",
                        params.as_slice(),
                    )?;
                    Ok(())
                }
                None => {
                    let params: [&dyn ToSql; 10] = [
                        &key.ticker,
                        &key.filing_type,
                        &filing_date,
                        &draft.summary,
                        &key_points,
                        &draft.sentiment_score,
                        &now_ms,
                        &draft.generated_by,
                        &draft.data_version,
                        &expires_at_ms,
                    ];
                    connection.execute(
                        "INSERT INTO filing_summaries \
                         (ticker, filing_type, filing_date, summary, key_points, sentiment_score, \
                          generated_at_ms, generated_by, data_version, expires_at_ms) \
                         VALUES (?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?)",
                        params.as_slice(),
                    )?;
                    Ok(())
                }
            }
        })();
        finalize_transaction(&connection, result)?;

        Ok(FilingSummary {
            key: key.clone(),
            summary: draft.summary.clone(),
            key_points: draft.key_points.clone(),
            sentiment_score: draft.sentiment_score,
            generated_at_ms: now_ms,
            generated_by: draft.generated_by.clone(),
            data_version: draft.data_version,
            expires_at_ms,
        })
    }

    /// Live filing summary, or `None` when absent, expired or at another version.
    pub fn filing_summary(
        &self,
        key: &FilingKey,
        expected_version: Option<i64>,
        now_ms: i64,
    ) -> Result<Option<FilingSummary>, WarehouseError> {
        let key = key.normalized()?;
        let filing_date = key.filing_date.format_iso();
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            "SELECT summary, key_points, sentiment_score, generated_at_ms, generated_by, \
             data_version, expires_at_ms FROM filing_summaries \
             WHERE ticker = ? AND filing_type = ? AND filing_date = CAST(? AS DATE)",
        )?;
        let params: [&dyn ToSql; 3] = [&key.ticker, &key.filing_type, &filing_date];
        let mut rows = statement.query(params.as_slice())?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let key_points: String = row.get(1)?;
        let summary = FilingSummary {
            key: key.clone(),
            summary: row.get(0)?,
            key_points: serde_json::from_str(&key_points)?,
            sentiment_score: row.get(2)?,
            generated_at_ms: row.get(3)?,
            generated_by: row.get(4)?,
            data_version: row.get(5)?,
            expires_at_ms: row.get(6)?,
        };

        if summary.expires_at_ms <= now_ms || !version_matches(expected_version, summary.data_version)
        {
            return Ok(None);
        }
        Ok(Some(summary))
    }

    /// Insert or refresh an aggregated company profile.
    pub fn put_company_profile(
        &self,
        draft: &CompanyProfileDraft,
        tier: AccountTier,
        now_ms: i64,
    ) -> Result<CompanyProfile, WarehouseError> {
        validate_version(draft.data_version)?;
        let ticker = normalize_ticker(&draft.ticker)?;
        let expires_at_ms = self
            .ttl_policy
            .expires_at_ms(ArtifactKind::CompanyProfile, tier, now_ms)
            .unwrap_or(i64::MAX);
        let profile = serde_json::to_string(&draft.profile)?;
        let source_count = i64::from(draft.source_count);

        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let stored = stored_version(
                &connection,
                "SELECT data_version FROM company_profiles WHERE ticker = ?",
                [&ticker as &dyn ToSql].as_slice(),
            )?;

            match stored {
                Some(stored) if stored > draft.data_version => {
                    Err(WarehouseError::VersionConflict {
                        kind: ArtifactKind::CompanyProfile,
                        key: ticker.clone(),
                        stored,
                        attempted: draft.data_version,
                    })
                }
                Some(_) => {
                    let params: [&dyn ToSql; 6] = [
                        &profile,
                        &source_count,
                        &draft.data_version,
                        &expires_at_ms,
                        &now_ms,
                        &ticker,
                    ];
                    connection.execute(
                        "UPDATE company_profiles SET profile = ?, source_count = ?, \
                         data_version = ?, expires_at_ms = ?, last_verified_ms = ? \
                         WHERE ticker = ?",
                        params.as_slice(),
                    )?;
                    Ok(())
                }
                None => {
                    let params: [&dyn ToSql; 6] = [
                        &ticker,
                        &profile,
                        &source_count,
                        &draft.data_version,
                        &expires_at_ms,
                        &now_ms,
                    ];
                    connection.execute(
                        "INSERT INTO company_profiles \
                         (ticker, profile, source_count, data_version, expires_at_ms, last_verified_ms) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                        params.as_slice(),
                    )?;
                    Ok(())
                }
            }
        })();
        finalize_transaction(&connection, result)?;

        Ok(CompanyProfile {
            ticker,
            profile: draft.profile.clone(),
            source_count: draft.source_count,
            data_version: draft.data_version,
            expires_at_ms,
            last_verified_ms: now_ms,
        })
    }

    /// Live company profile, or `None` when absent, expired or at another version.
    pub fn company_profile(
        &self,
        ticker: &str,
        expected_version: Option<i64>,
        now_ms: i64,
    ) -> Result<Option<CompanyProfile>, WarehouseError> {
        let ticker = normalize_ticker(ticker)?;
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            "SELECT profile, source_count, data_version, expires_at_ms, last_verified_ms \
             FROM company_profiles WHERE ticker = ?",
        )?;
        let mut rows = statement.query([&ticker])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let profile: String = row.get(0)?;
        let source_count: i64 = row.get(1)?;
        let stored = CompanyProfile {
            ticker: ticker.clone(),
            profile: serde_json::from_str(&profile)?,
            source_count: u32::try_from(source_count).map_err(|_| {
                WarehouseError::InvalidData(format!("source_count {source_count} out of range"))
            })?,
            data_version: row.get(2)?,
            expires_at_ms: row.get(3)?,
            last_verified_ms: row.get(4)?,
        };

        if stored.expires_at_ms <= now_ms || !version_matches(expected_version, stored.data_version) {
            return Ok(None);
        }
        Ok(Some(stored))
    }

    /// Append a news sentiment record. Returns `false` if the article was
    /// already recorded; existing rows are never modified.
    pub fn record_news_sentiment(
        &self,
        draft: &NewsSentimentDraft,
        now_ms: i64,
    ) -> Result<bool, WarehouseError> {
        validate_news(draft)?;
        let ticker = normalize_ticker(&draft.ticker)?;
        let news_date = draft.news_date.format_iso();

        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<bool, WarehouseError> {
            if news_exists(&connection, &ticker, &news_date, &draft.news_url)? {
                return Ok(false);
            }

            let params: [&dyn ToSql; 9] = [
                &ticker,
                &news_date,
                &draft.news_url,
                &draft.headline,
                &draft.sentiment_score,
                &draft.sentiment_label,
                &draft.confidence,
                &draft.ai_summary,
                &now_ms,
            ];
            connection.execute(
                "INSERT INTO news_sentiment \
                 (ticker, news_date, news_url, headline, sentiment_score, sentiment_label, \
                  confidence, ai_summary, created_at_ms) \
                 VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?)",
                params.as_slice(),
            )?;
            Ok(true)
        })();

        finalize_transaction(&connection, result)
    }

    pub fn has_news_sentiment(
        &self,
        ticker: &str,
        news_date: IsoDate,
        news_url: &str,
    ) -> Result<bool, WarehouseError> {
        let ticker = normalize_ticker(ticker)?;
        let connection = self.pool.acquire()?;
        news_exists(&connection, &ticker, &news_date.format_iso(), news_url)
    }

    /// Stored records in `[start, end]`, newest first.
    pub fn news_sentiment(
        &self,
        ticker: &str,
        start: IsoDate,
        end: IsoDate,
    ) -> Result<Vec<NewsSentimentRecord>, WarehouseError> {
        let ticker = normalize_ticker(ticker)?;
        let (start, end) = (start.format_iso(), end.format_iso());
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            "SELECT CAST(news_date AS VARCHAR), news_url, headline, sentiment_score, \
             sentiment_label, confidence, ai_summary, created_at_ms FROM news_sentiment \
             WHERE ticker = ? AND news_date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE) \
             ORDER BY news_date DESC, created_at_ms DESC",
        )?;
        let params: [&dyn ToSql; 3] = [&ticker, &start, &end];
        let mut rows = statement.query(params.as_slice())?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let news_date: String = row.get(0)?;
            records.push(NewsSentimentRecord {
                ticker: ticker.clone(),
                news_date: IsoDate::parse(&news_date)?,
                news_url: row.get(1)?,
                headline: row.get(2)?,
                sentiment_score: row.get(3)?,
                sentiment_label: row.get(4)?,
                confidence: row.get(5)?,
                ai_summary: row.get(6)?,
                created_at_ms: row.get(7)?,
            });
        }
        Ok(records)
    }

    /// Mean sentiment in `[start, end]`; `None` when no records exist.
    pub fn average_sentiment(
        &self,
        ticker: &str,
        start: IsoDate,
        end: IsoDate,
    ) -> Result<Option<f64>, WarehouseError> {
        let ticker = normalize_ticker(ticker)?;
        let (start, end) = (start.format_iso(), end.format_iso());
        let connection = self.pool.acquire()?;
        let params: [&dyn ToSql; 3] = [&ticker, &start, &end];
        let average: Option<f64> = connection.query_row(
            "SELECT AVG(sentiment_score) FROM news_sentiment \
             WHERE ticker = ? AND news_date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)",
            params.as_slice(),
            |row| row.get(0),
        )?;
        Ok(average)
    }

    /// Delete expired rows of the expiring artifact kinds. News sentiment is
    /// never touched. Returns the number of rows removed.
    pub fn cleanup_expired(&self, now_ms: i64) -> Result<usize, WarehouseError> {
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let summaries =
                connection.execute("DELETE FROM filing_summaries WHERE expires_at_ms <= ?", [now_ms])?;
            let profiles =
                connection.execute("DELETE FROM company_profiles WHERE expires_at_ms <= ?", [now_ms])?;
            Ok(summaries + profiles)
        })();

        finalize_transaction(&connection, result)
    }

    /// Remove every artifact kind for one ticker. Returns rows removed.
    pub fn clear_ticker(&self, ticker: &str) -> Result<usize, WarehouseError> {
        let ticker = normalize_ticker(ticker)?;
        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let mut removed = 0;
            for table in ["filing_summaries", "company_profiles", "news_sentiment"] {
                // Table names come from the fixed list above.
                let sql = format!("DELETE FROM {table} WHERE ticker = ?");
                removed += connection.execute(sql.as_str(), [&ticker])?;
            }
            Ok(removed)
        })();

        finalize_transaction(&connection, result)
    }
}

fn stored_version(
    connection: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Option<i64>, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    let mut rows = statement.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

fn news_exists(
    connection: &Connection,
    ticker: &str,
    news_date: &str,
    news_url: &str,
) -> Result<bool, WarehouseError> {
    let params: [&dyn ToSql; 3] = [&ticker, &news_date, &news_url];
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM news_sentiment \
         WHERE ticker = ? AND news_date = CAST(? AS DATE) AND news_url = ?",
        params.as_slice(),
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn version_matches(expected: Option<i64>, stored: i64) -> bool {
    expected.map_or(true, |expected| expected == stored)
}

/// Commit on success, roll back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the tickguard home directory from environment or default.
pub fn resolve_tickguard_home() -> PathBuf {
    if let Some(path) = env::var_os("TICKGUARD_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".tickguard");
    }

    PathBuf::from(".tickguard")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    const NOW: i64 = 1_767_225_600_000; // 2026-01-01T00:00:00Z
    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn date(raw: &str) -> IsoDate {
        IsoDate::parse(raw).expect("valid date")
    }

    fn warehouse() -> Warehouse {
        Warehouse::open_in_memory(TtlPolicy::default()).expect("warehouse open")
    }

    fn filing_draft(version: i64) -> FilingSummaryDraft {
        FilingSummaryDraft {
            key: FilingKey::new("AAPL", "10-K", date("2025-10-31")).expect("key"),
            summary: String::from("Revenue grew on services."),
            key_points: vec![String::from("services up"), String::from("margins stable")],
            sentiment_score: Some(0.4),
            generated_by: String::from("summarizer-v2"),
            data_version: version,
        }
    }

    #[test]
    fn literal_filing_keys_are_normalized_before_storage() {
        let warehouse = Warehouse::open_in_memory(TtlPolicy::default()).expect("warehouse open");
        let mut draft = filing_draft(1);
        draft.key = FilingKey {
            ticker: String::from(" aapl "),
            filing_type: String::from("10-k"),
            filing_date: date("2025-10-31"),
        };

        let stored = warehouse
            .put_filing_summary(&draft, AccountTier::Free, NOW)
            .expect("put");
        assert_eq!(stored.key.ticker, "AAPL");
        assert_eq!(stored.key.filing_type, "10-K");

        assert!(warehouse
            .filing_summary(&draft.key, None, NOW)
            .expect("read")
            .is_some());
        assert_eq!(warehouse.clear_ticker("AAPL").expect("clear"), 1);
    }

    fn news(url: &str, news_date: &str, score: f64) -> NewsSentimentDraft {
        NewsSentimentDraft {
            ticker: String::from("msft"),
            news_date: date(news_date),
            news_url: url.to_string(),
            headline: Some(String::from("Headline")),
            sentiment_score: score,
            sentiment_label: String::from(if score >= 0.0 { "positive" } else { "negative" }),
            confidence: 0.8,
            ai_summary: None,
        }
    }

    #[test]
    fn opens_file_backed_database_under_nested_directory() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("home").join("artifacts.duckdb");

        let warehouse = Warehouse::open(WarehouseConfig {
            db_path: db_path.clone(),
            max_pool_size: 2,
            ttl_policy: TtlPolicy::default(),
        })
        .expect("warehouse open");

        assert_eq!(warehouse.db_path(), db_path.as_path());
        assert!(db_path.exists());
    }

    #[test]
    fn filing_summary_round_trips_until_expiry() {
        let policy = TtlPolicy::default().with_ttl(
            ArtifactKind::FilingSummary,
            AccountTier::Pro,
            Duration::from_secs(3600),
        );
        let warehouse = Warehouse::open_in_memory(policy).expect("warehouse open");
        let draft = filing_draft(1);

        let stored = warehouse
            .put_filing_summary(&draft, AccountTier::Pro, NOW)
            .expect("put");
        assert_eq!(stored.expires_at_ms, NOW + HOUR_MS);

        let read = warehouse
            .filing_summary(&draft.key, Some(1), NOW + HOUR_MS - 1)
            .expect("read")
            .expect("live summary");
        assert_eq!(read.key_points, draft.key_points);
        assert_eq!(read.generated_by, "summarizer-v2");

        let expired = warehouse
            .filing_summary(&draft.key, Some(1), NOW + HOUR_MS)
            .expect("read");
        assert!(expired.is_none());
    }

    #[test]
    fn version_mismatch_reads_as_miss() {
        let warehouse = warehouse();
        let draft = filing_draft(2);
        warehouse
            .put_filing_summary(&draft, AccountTier::Free, NOW)
            .expect("put");

        assert!(warehouse
            .filing_summary(&draft.key, Some(3), NOW)
            .expect("read")
            .is_none());
        assert!(warehouse
            .filing_summary(&draft.key, None, NOW)
            .expect("read")
            .is_some());
    }

    #[test]
    fn older_versions_are_rejected() {
        let warehouse = warehouse();
        warehouse
            .put_filing_summary(&filing_draft(3), AccountTier::Free, NOW)
            .expect("put v3");

        let error = warehouse
            .put_filing_summary(&filing_draft(2), AccountTier::Free, NOW)
            .expect_err("v2 must be rejected");
        assert!(matches!(
            error,
            WarehouseError::VersionConflict {
                stored: 3,
                attempted: 2,
                ..
            }
        ));

        warehouse
            .put_filing_summary(&filing_draft(4), AccountTier::Free, NOW)
            .expect("v4 accepted");
        let read = warehouse
            .filing_summary(&filing_draft(4).key, None, NOW)
            .expect("read")
            .expect("live");
        assert_eq!(read.data_version, 4);
    }

    #[test]
    fn company_profile_uses_tier_policy_and_tracks_verification() {
        let warehouse = warehouse();
        let draft = CompanyProfileDraft {
            ticker: String::from("nvda"),
            profile: json!({"sector": "Semiconductors", "employees": 29600}),
            source_count: 3,
            data_version: 1,
        };

        let premium = warehouse
            .put_company_profile(&draft, AccountTier::Premium, NOW)
            .expect("put");
        assert_eq!(premium.ticker, "NVDA");
        assert_eq!(premium.last_verified_ms, NOW);
        assert_eq!(premium.expires_at_ms, NOW + 24 * HOUR_MS);

        let read = warehouse
            .company_profile("NVDA", Some(1), NOW + 1)
            .expect("read")
            .expect("live");
        assert_eq!(read.profile["sector"], "Semiconductors");
        assert_eq!(read.source_count, 3);
    }

    #[test]
    fn news_sentiment_is_append_only() {
        let warehouse = warehouse();
        let first = news("https://news.test/1", "2026-01-02", 0.5);

        assert!(warehouse.record_news_sentiment(&first, NOW).expect("insert"));
        let mut changed = first.clone();
        changed.sentiment_score = -0.9;
        assert!(!warehouse.record_news_sentiment(&changed, NOW + 1).expect("duplicate"));

        let records = warehouse
            .news_sentiment("MSFT", date("2026-01-01"), date("2026-01-31"))
            .expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sentiment_score, 0.5);
        assert!(warehouse
            .has_news_sentiment("MSFT", date("2026-01-02"), "https://news.test/1")
            .expect("exists"));
    }

    #[test]
    fn average_sentiment_distinguishes_no_data_from_neutral() {
        let warehouse = warehouse();
        assert_eq!(
            warehouse
                .average_sentiment("MSFT", date("2026-01-01"), date("2026-01-31"))
                .expect("avg"),
            None
        );

        warehouse
            .record_news_sentiment(&news("https://news.test/a", "2026-01-03", 0.5), NOW)
            .expect("insert");
        warehouse
            .record_news_sentiment(&news("https://news.test/b", "2026-01-04", -0.5), NOW)
            .expect("insert");
        warehouse
            .record_news_sentiment(&news("https://news.test/c", "2026-02-10", 1.0), NOW)
            .expect("insert");

        let average = warehouse
            .average_sentiment("MSFT", date("2026-01-01"), date("2026-01-31"))
            .expect("avg");
        assert_eq!(average, Some(0.0));
    }

    #[test]
    fn cleanup_removes_only_expired_expiring_artifacts() {
        let warehouse = warehouse();
        warehouse
            .put_filing_summary(&filing_draft(1), AccountTier::Premium, NOW)
            .expect("put");
        warehouse
            .put_company_profile(
                &CompanyProfileDraft {
                    ticker: String::from("AAPL"),
                    profile: json!({}),
                    source_count: 1,
                    data_version: 1,
                },
                AccountTier::Free,
                NOW,
            )
            .expect("put");
        warehouse
            .record_news_sentiment(&news("https://news.test/old", "2020-01-01", 0.1), NOW)
            .expect("insert");

        // Premium filing summaries live 7 days, free profiles 7 days as well.
        let eight_days_later = NOW + 8 * 24 * HOUR_MS;
        let removed = warehouse.cleanup_expired(eight_days_later).expect("cleanup");
        assert_eq!(removed, 2);

        let remaining = warehouse
            .news_sentiment("MSFT", date("2019-12-31"), date("2020-01-02"))
            .expect("list");
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn clear_ticker_removes_all_artifact_kinds() {
        let warehouse = warehouse();
        warehouse
            .put_filing_summary(&filing_draft(1), AccountTier::Free, NOW)
            .expect("put");
        warehouse
            .put_company_profile(
                &CompanyProfileDraft {
                    ticker: String::from("AAPL"),
                    profile: json!({"name": "Apple"}),
                    source_count: 2,
                    data_version: 1,
                },
                AccountTier::Free,
                NOW,
            )
            .expect("put");
        let mut apple_news = news("https://news.test/aapl", "2026-01-02", 0.2);
        apple_news.ticker = String::from("AAPL");
        warehouse.record_news_sentiment(&apple_news, NOW).expect("insert");
        warehouse
            .record_news_sentiment(&news("https://news.test/msft", "2026-01-02", 0.2), NOW)
            .expect("insert");

        assert_eq!(warehouse.clear_ticker("aapl").expect("clear"), 3);
        assert!(warehouse
            .company_profile("AAPL", None, NOW)
            .expect("read")
            .is_none());
        assert!(warehouse
            .has_news_sentiment("MSFT", date("2026-01-02"), "https://news.test/msft")
            .expect("exists"));
    }
}
