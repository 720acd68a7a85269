//! Behavior-driven tests for the L1/L2 entry cache.
//!
//! Time is driven by a manual clock so TTL boundaries are exact.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickguard_core::cache::memory::MemoryBackend;
use tickguard_core::{CacheBackendKind, EntryCache, ManualClock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct QuoteValue {
    symbol: String,
    price: f64,
}

fn quote(symbol: &str, price: f64) -> QuoteValue {
    QuoteValue {
        symbol: symbol.to_string(),
        price,
    }
}

fn cache_at(start_ms: i64) -> (Arc<ManualClock>, EntryCache) {
    let clock = Arc::new(ManualClock::new(start_ms));
    let cache = EntryCache::in_memory(clock.clone());
    (clock, cache)
}

// =============================================================================
// Entry Cache: Expiry
// =============================================================================

#[tokio::test]
async fn when_a_value_is_set_it_is_returned_until_its_ttl_elapses() {
    // Given: A quote cached for 60 seconds
    let (clock, cache) = cache_at(1_000_000);
    cache
        .set("quote:AAPL:v1", &quote("AAPL", 189.5), Duration::from_secs(60))
        .await;

    // When/Then: It is served just before the TTL boundary
    clock.advance(Duration::from_millis(59_999));
    assert_eq!(
        cache.get::<QuoteValue>("quote:AAPL:v1").await,
        Some(quote("AAPL", 189.5))
    );

    // When/Then: It is a miss once the TTL has elapsed
    clock.advance(Duration::from_millis(2));
    assert_eq!(cache.get::<QuoteValue>("quote:AAPL:v1").await, None);
}

#[tokio::test]
async fn when_ttl_is_zero_the_value_is_never_served() {
    // Given: A write with a zero TTL
    let (_clock, cache) = cache_at(0);
    cache
        .set("quote:MSFT:v1", &quote("MSFT", 410.0), Duration::ZERO)
        .await;

    // Then: A read in the same instant misses
    assert_eq!(cache.get::<QuoteValue>("quote:MSFT:v1").await, None);
    assert_eq!(cache.age("quote:MSFT:v1").await, None);
}

#[tokio::test]
async fn when_a_key_is_rewritten_the_latest_value_and_ttl_win() {
    // Given: A short-lived value
    let (clock, cache) = cache_at(0);
    cache
        .set("quote:AAPL:v1", &quote("AAPL", 1.0), Duration::from_secs(1))
        .await;

    // When: It is overwritten with a longer TTL
    clock.advance(Duration::from_millis(500));
    cache
        .set("quote:AAPL:v1", &quote("AAPL", 2.0), Duration::from_secs(10))
        .await;
    clock.advance(Duration::from_secs(5));

    // Then: The new value is live and its age restarts from the rewrite
    assert_eq!(
        cache.get::<QuoteValue>("quote:AAPL:v1").await,
        Some(quote("AAPL", 2.0))
    );
    assert_eq!(cache.age("quote:AAPL:v1").await, Some(Duration::from_secs(5)));
}

// =============================================================================
// Entry Cache: Age
// =============================================================================

#[tokio::test]
async fn age_of_a_missing_key_is_infinite() {
    let (_clock, cache) = cache_at(0);

    assert_eq!(cache.age("quote:NONE:v1").await, None);
    assert!(cache.age_millis("quote:NONE:v1").await.is_infinite());
}

#[tokio::test]
async fn age_grows_with_elapsed_time() {
    // Given: A value written at t0
    let (clock, cache) = cache_at(10_000);
    cache
        .set("fundamentals:AAPL:v1", &quote("AAPL", 1.0), Duration::from_secs(3600))
        .await;

    // When: 1.5 seconds pass
    clock.advance(Duration::from_millis(1_500));

    // Then: The reported age is at least the elapsed time
    assert!(cache.age_millis("fundamentals:AAPL:v1").await >= 1_500.0);
}

// =============================================================================
// Entry Cache: Clearing
// =============================================================================

#[tokio::test]
async fn clearing_by_pattern_only_removes_matching_keys() {
    // Given: Keys from two capabilities
    let (_clock, cache) = cache_at(0);
    let ttl = Duration::from_secs(60);
    cache.set("quote:AAPL:v1", &quote("AAPL", 1.0), ttl).await;
    cache.set("quote:MSFT:v1", &quote("MSFT", 2.0), ttl).await;
    cache.set("news:123:v1", &quote("NEWS", 3.0), ttl).await;

    // When: Quotes are cleared
    let removed = cache.clear(Some("quote:*")).await;

    // Then: Only the quote keys are gone
    assert_eq!(removed, 2);
    assert_eq!(cache.get::<QuoteValue>("quote:AAPL:v1").await, None);
    assert_eq!(
        cache.get::<QuoteValue>("news:123:v1").await,
        Some(quote("NEWS", 3.0))
    );
}

#[tokio::test]
async fn clearing_without_pattern_empties_the_cache() {
    let (_clock, cache) = cache_at(0);
    cache
        .set("quote:AAPL:v1", &quote("AAPL", 1.0), Duration::from_secs(60))
        .await;
    cache
        .set("filing:AAPL:v1", &quote("AAPL", 1.0), Duration::from_secs(60))
        .await;

    assert_eq!(cache.clear(None).await, 2);
    assert_eq!(cache.stats().await.size, 0);
}

// =============================================================================
// Entry Cache: Stale Retention and Stats
// =============================================================================

#[tokio::test]
async fn expired_values_stay_available_for_stale_fallback_within_retention() {
    // Given: A cache retaining expired entries for 10 minutes
    let clock = Arc::new(ManualClock::new(0));
    let cache = EntryCache::in_memory(clock.clone()).with_stale_retention(Duration::from_secs(600));
    cache
        .set("quote:AAPL:v1", &quote("AAPL", 150.0), Duration::from_secs(60))
        .await;

    // When: The TTL has elapsed but retention has not
    clock.advance(Duration::from_secs(120));

    // Then: Normal reads miss, stale reads still see the value
    assert_eq!(cache.get::<QuoteValue>("quote:AAPL:v1").await, None);
    let stale = cache
        .get_stale::<QuoteValue>("quote:AAPL:v1")
        .await
        .expect("retained value");
    assert!(stale.expired);
    assert_eq!(stale.age, Duration::from_secs(120));

    // When: Retention has also elapsed
    clock.advance(Duration::from_secs(600));

    // Then: The value is gone for good
    assert!(cache.get_stale::<QuoteValue>("quote:AAPL:v1").await.is_none());
}

#[tokio::test]
async fn stats_count_hits_and_misses() {
    let (_clock, cache) = cache_at(0);
    cache
        .set("quote:AAPL:v1", &quote("AAPL", 1.0), Duration::from_secs(60))
        .await;

    let _ = cache.get::<QuoteValue>("quote:AAPL:v1").await;
    let _ = cache.get::<QuoteValue>("quote:AAPL:v1").await;
    let _ = cache.get::<QuoteValue>("quote:MSFT:v1").await;

    let stats = cache.stats().await;
    assert_eq!(stats.kind, CacheBackendKind::Memory);
    assert_eq!(stats.size, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn a_full_memory_cache_evicts_the_oldest_write() {
    // Given: A two-entry memory backend
    let clock = Arc::new(ManualClock::new(0));
    let backend = Arc::new(MemoryBackend::new(2, clock.clone()));
    let cache = EntryCache::new(backend, clock.clone());
    let ttl = Duration::from_secs(60);

    cache.set("quote:A:v1", &quote("A", 1.0), ttl).await;
    clock.advance(Duration::from_millis(10));
    cache.set("quote:B:v1", &quote("B", 1.0), ttl).await;
    clock.advance(Duration::from_millis(10));

    // When: A third key is written
    cache.set("quote:C:v1", &quote("C", 1.0), ttl).await;

    // Then: The oldest key made room
    assert_eq!(cache.get::<QuoteValue>("quote:A:v1").await, None);
    assert!(cache.get::<QuoteValue>("quote:B:v1").await.is_some());
    assert!(cache.get::<QuoteValue>("quote:C:v1").await.is_some());
}
