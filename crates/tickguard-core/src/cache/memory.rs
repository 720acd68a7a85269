//! In-process cache backend.
//!
//! Entries live in a single process and disappear on restart. Two instances
//! of the application never see each other's entries, so this backend is only
//! suitable for development and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use globset::{Glob, GlobMatcher};
use tokio::sync::RwLock;
use tracing::debug;

use super::{BackendFuture, CacheBackend, CacheBackendKind, CacheError, StoredEntry};
use crate::clock::{duration_ms, Clock};

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
struct Slot {
    entry: StoredEntry,
    discard_at_ms: i64,
}

#[derive(Debug, Default)]
struct MemoryInner {
    map: HashMap<String, Slot>,
}

impl MemoryInner {
    fn prune_discarded(&mut self, now_ms: i64) -> usize {
        let before = self.map.len();
        self.map.retain(|_, slot| slot.discard_at_ms > now_ms);
        before - self.map.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, slot)| slot.entry.written_at_ms)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.map.remove(&key);
        }
    }
}

/// Bounded `HashMap` backend behind a tokio `RwLock`.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<RwLock<MemoryInner>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryInner::default())),
            max_entries: max_entries.max(1),
            clock,
        }
    }
}

impl CacheBackend for MemoryBackend {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Memory
    }

    fn load<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredEntry>> {
        Box::pin(async move {
            let now_ms = self.clock.now_ms();
            let store = self.inner.read().await;
            Ok(store
                .map
                .get(key)
                .filter(|slot| slot.discard_at_ms > now_ms)
                .map(|slot| slot.entry.clone()))
        })
    }

    fn store<'a>(
        &'a self,
        key: &'a str,
        entry: StoredEntry,
        keep_for: Duration,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let now_ms = self.clock.now_ms();
            let discard_at_ms = entry.written_at_ms.saturating_add(duration_ms(keep_for));
            let mut store = self.inner.write().await;

            if !store.map.contains_key(key) && store.map.len() >= self.max_entries {
                let pruned = store.prune_discarded(now_ms);
                if store.map.len() >= self.max_entries {
                    store.evict_oldest();
                }
                debug!(pruned, max_entries = self.max_entries, "memory cache at capacity");
            }

            store.map.insert(
                key.to_string(),
                Slot {
                    entry,
                    discard_at_ms,
                },
            );
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let mut store = self.inner.write().await;
            Ok(store.map.remove(key).is_some())
        })
    }

    fn remove_matching<'a>(&'a self, pattern: Option<&'a str>) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let matcher = pattern.map(compile_pattern).transpose()?;
            let mut store = self.inner.write().await;
            let before = store.map.len();
            match matcher {
                Some(matcher) => store.map.retain(|key, _| !matcher.is_match(key)),
                None => store.map.clear(),
            }
            Ok(before - store.map.len())
        })
    }

    fn len<'a>(&'a self) -> BackendFuture<'a, Option<usize>> {
        Box::pin(async move {
            let store = self.inner.read().await;
            Ok(Some(store.map.len()))
        })
    }
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher, CacheError> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|error| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            message: error.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn entry(written_at_ms: i64) -> StoredEntry {
        StoredEntry {
            value: String::from("1"),
            written_at_ms,
            ttl_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn glob_clear_only_touches_matching_keys() {
        let backend = MemoryBackend::new(10, Arc::new(ManualClock::new(0)));
        let keep = Duration::from_secs(60);
        for key in ["quote:AAPL:v1", "quote:MSFT:v1", "news:123:v1"] {
            backend.store(key, entry(0), keep).await.expect("store");
        }

        assert_eq!(backend.remove_matching(Some("quote:*")).await.expect("clear"), 2);
        assert!(backend.load("news:123:v1").await.expect("load").is_some());
        assert_eq!(backend.remove_matching(Some("news:12?:v1")).await.expect("clear"), 1);
    }

    #[tokio::test]
    async fn full_map_prunes_discarded_entries_before_evicting() {
        let clock = Arc::new(ManualClock::new(0));
        let backend = MemoryBackend::new(2, clock.clone());
        backend
            .store("a", entry(0), Duration::from_millis(10))
            .await
            .expect("store");
        backend
            .store("b", entry(0), Duration::from_secs(60))
            .await
            .expect("store");

        clock.set(20);
        backend
            .store("c", entry(20), Duration::from_secs(60))
            .await
            .expect("store");

        assert!(backend.load("a").await.expect("load").is_none());
        assert!(backend.load("b").await.expect("load").is_some());
        assert_eq!(backend.len().await.expect("len"), Some(2));
    }

    #[tokio::test]
    async fn full_map_evicts_oldest_write_when_nothing_is_discardable() {
        let clock = Arc::new(ManualClock::new(0));
        let backend = MemoryBackend::new(2, clock.clone());
        let keep = Duration::from_secs(60);
        backend.store("old", entry(0), keep).await.expect("store");
        backend.store("newer", entry(5), keep).await.expect("store");
        backend.store("newest", entry(10), keep).await.expect("store");

        assert!(backend.load("old").await.expect("load").is_none());
        assert!(backend.load("newest").await.expect("load").is_some());
    }

    #[tokio::test]
    async fn invalid_patterns_are_reported() {
        let backend = MemoryBackend::new(2, Arc::new(ManualClock::new(0)));
        let error = backend
            .remove_matching(Some("quote:[*"))
            .await
            .expect_err("unclosed class");
        assert!(matches!(error, CacheError::InvalidPattern { .. }));
    }
}
