//! Async facade over the persistent artifact store (L3).
//!
//! DuckDB work runs on tokio's blocking pool. Every failure is logged and
//! absorbed: reads become misses, writes become no-ops, counts become zero.
//! Callers that need to see errors use [`Warehouse`] directly.

use std::sync::Arc;

use tickguard_warehouse::{
    AccountTier, CompanyProfile, CompanyProfileDraft, FilingKey, FilingSummary,
    FilingSummaryDraft, IsoDate, NewsSentimentDraft, NewsSentimentRecord, Warehouse,
    WarehouseError,
};
use tracing::{debug, warn};

use crate::clock::Clock;

/// Failure-absorbing async handle to a [`Warehouse`].
#[derive(Clone)]
pub struct ArtifactStore {
    warehouse: Warehouse,
    clock: Arc<dyn Clock>,
}

impl ArtifactStore {
    pub fn new(warehouse: Warehouse, clock: Arc<dyn Clock>) -> Self {
        Self { warehouse, clock }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    pub async fn filing_summary(
        &self,
        key: &FilingKey,
        expected_version: Option<i64>,
    ) -> Option<FilingSummary> {
        let key = key.clone();
        let now_ms = self.clock.now_ms();
        self.run("filing_summary.get", move |warehouse| {
            warehouse.filing_summary(&key, expected_version, now_ms)
        })
        .await
        .flatten()
    }

    pub async fn put_filing_summary(
        &self,
        draft: FilingSummaryDraft,
        tier: AccountTier,
    ) -> Option<FilingSummary> {
        let now_ms = self.clock.now_ms();
        self.run("filing_summary.put", move |warehouse| {
            warehouse.put_filing_summary(&draft, tier, now_ms)
        })
        .await
    }

    pub async fn company_profile(
        &self,
        ticker: &str,
        expected_version: Option<i64>,
    ) -> Option<CompanyProfile> {
        let ticker = ticker.to_string();
        let now_ms = self.clock.now_ms();
        self.run("company_profile.get", move |warehouse| {
            warehouse.company_profile(&ticker, expected_version, now_ms)
        })
        .await
        .flatten()
    }

    pub async fn put_company_profile(
        &self,
        draft: CompanyProfileDraft,
        tier: AccountTier,
    ) -> Option<CompanyProfile> {
        let now_ms = self.clock.now_ms();
        self.run("company_profile.put", move |warehouse| {
            warehouse.put_company_profile(&draft, tier, now_ms)
        })
        .await
    }

    /// `true` only when a new record was written.
    pub async fn record_news_sentiment(&self, draft: NewsSentimentDraft) -> bool {
        let now_ms = self.clock.now_ms();
        self.run("news_sentiment.put", move |warehouse| {
            warehouse.record_news_sentiment(&draft, now_ms)
        })
        .await
        .unwrap_or(false)
    }

    pub async fn has_news_sentiment(&self, ticker: &str, news_date: IsoDate, news_url: &str) -> bool {
        let (ticker, news_url) = (ticker.to_string(), news_url.to_string());
        self.run("news_sentiment.exists", move |warehouse| {
            warehouse.has_news_sentiment(&ticker, news_date, &news_url)
        })
        .await
        .unwrap_or(false)
    }

    pub async fn news_sentiment(
        &self,
        ticker: &str,
        start: IsoDate,
        end: IsoDate,
    ) -> Vec<NewsSentimentRecord> {
        let ticker = ticker.to_string();
        self.run("news_sentiment.list", move |warehouse| {
            warehouse.news_sentiment(&ticker, start, end)
        })
        .await
        .unwrap_or_default()
    }

    /// `None` means no records in range, not a neutral score.
    pub async fn average_sentiment(&self, ticker: &str, start: IsoDate, end: IsoDate) -> Option<f64> {
        let ticker = ticker.to_string();
        self.run("news_sentiment.average", move |warehouse| {
            warehouse.average_sentiment(&ticker, start, end)
        })
        .await
        .flatten()
    }

    pub async fn cleanup_expired_data(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let removed = self
            .run("cleanup_expired", move |warehouse| warehouse.cleanup_expired(now_ms))
            .await
            .unwrap_or(0);
        debug!(removed, "expired artifacts removed");
        removed
    }

    pub async fn clear_ticker_cache(&self, ticker: &str) -> usize {
        let ticker = ticker.to_string();
        self.run("clear_ticker", move |warehouse| warehouse.clear_ticker(&ticker))
            .await
            .unwrap_or(0)
    }

    async fn run<T, F>(&self, operation: &'static str, work: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&Warehouse) -> Result<T, WarehouseError> + Send + 'static,
    {
        let warehouse = self.warehouse.clone();
        match tokio::task::spawn_blocking(move || work(&warehouse)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(WarehouseError::VersionConflict {
                kind,
                key,
                stored,
                attempted,
            })) => {
                warn!(operation, %kind, key = %key, stored, attempted, "stale artifact version rejected");
                None
            }
            Ok(Err(error)) => {
                warn!(operation, %error, "artifact store operation failed");
                None
            }
            Err(error) => {
                warn!(operation, %error, "artifact store task did not complete");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tickguard_warehouse::TtlPolicy;

    #[tokio::test]
    async fn invalid_input_is_absorbed() {
        let warehouse = Warehouse::open_in_memory(TtlPolicy::default()).expect("warehouse");
        let store = ArtifactStore::new(warehouse, Arc::new(ManualClock::new(0)));

        assert!(store.company_profile("   ", None).await.is_none());
        assert_eq!(store.clear_ticker_cache("").await, 0);
    }
}
