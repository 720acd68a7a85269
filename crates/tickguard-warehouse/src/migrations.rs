use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

// All instants are UTC epoch milliseconds; calendar dates are DATE.
// Updated columns must stay out of secondary indexes (DuckDB rejects those updates).
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_artifact_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS filing_summaries (
    ticker TEXT NOT NULL,
    filing_type TEXT NOT NULL,
    filing_date DATE NOT NULL,
    summary TEXT NOT NULL,
    key_points TEXT NOT NULL,
    sentiment_score DOUBLE,
    generated_at_ms BIGINT NOT NULL,
    generated_by TEXT NOT NULL,
    data_version BIGINT NOT NULL,
    expires_at_ms BIGINT NOT NULL,
    PRIMARY KEY(ticker, filing_type, filing_date)
);

CREATE TABLE IF NOT EXISTS company_profiles (
    ticker TEXT PRIMARY KEY,
    profile TEXT NOT NULL,
    source_count BIGINT NOT NULL,
    data_version BIGINT NOT NULL,
    expires_at_ms BIGINT NOT NULL,
    last_verified_ms BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS news_sentiment (
    ticker TEXT NOT NULL,
    news_date DATE NOT NULL,
    news_url TEXT NOT NULL,
    headline TEXT,
    sentiment_score DOUBLE NOT NULL,
    sentiment_label TEXT NOT NULL,
    confidence DOUBLE NOT NULL,
    ai_summary TEXT,
    created_at_ms BIGINT NOT NULL,
    PRIMARY KEY(ticker, news_date, news_url)
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_news_sentiment_ticker_date ON news_sentiment(ticker, news_date);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let connection = Connection::open_in_memory().expect("connection");
        apply_migrations(&connection).expect("first run");
        apply_migrations(&connection).expect("second run");

        let applied: i64 = connection
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(applied as usize, MIGRATIONS.len());
    }
}
