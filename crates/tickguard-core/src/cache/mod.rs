//! L1/L2 entry cache.
//!
//! [`EntryCache`] is the only type callers talk to. It sits on top of a
//! [`CacheBackend`] (in-process map or Redis) and is where every backend or
//! serialization failure is turned into a plain miss.
//!
//! Backends keep expired entries around for a stale-retention window so that
//! the router can still serve a last-known value when every provider is down.
//! Liveness is decided here from `written_at_ms`/`ttl_ms` and the injected
//! [`Clock`], never by backend-side expiry.

pub mod memory;
pub mod redis;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{duration_ms, Clock};

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// Default window an expired entry stays available for stale fallback.
pub const DEFAULT_STALE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Failures at the backend seam. Never escapes [`EntryCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("cache backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid key pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("cache value could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which backend an [`EntryCache`] runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

impl CacheBackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }

    /// Whether entries are visible to other processes.
    pub const fn shared(self) -> bool {
        matches!(self, Self::Redis)
    }
}

impl Display for CacheBackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend selection, decided once from configuration.
#[derive(Clone, PartialEq, Eq)]
pub enum CacheBackendConfig {
    Memory { max_entries: usize },
    Redis { url: String, namespace: String },
}

impl std::fmt::Debug for CacheBackendConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory { max_entries } => f
                .debug_struct("Memory")
                .field("max_entries", max_entries)
                .finish(),
            Self::Redis { url, namespace } => f
                .debug_struct("Redis")
                .field("url", &redact_url(url))
                .field("namespace", namespace)
                .finish(),
        }
    }
}

/// Hide credentials embedded in a connection URL.
pub(crate) fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    match rest.rfind('@') {
        Some(at) => format!("{}://***@{}", &url[..scheme_end], &rest[at + 1..]),
        None => url.to_string(),
    }
}

impl CacheBackendConfig {
    pub const fn kind(&self) -> CacheBackendKind {
        match self {
            Self::Memory { .. } => CacheBackendKind::Memory,
            Self::Redis { .. } => CacheBackendKind::Redis,
        }
    }
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self::Memory {
            max_entries: memory::DEFAULT_MAX_ENTRIES,
        }
    }
}

/// What a backend persists for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// JSON-encoded value.
    pub value: String,
    pub written_at_ms: i64,
    pub ttl_ms: i64,
}

impl StoredEntry {
    pub fn is_live(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.written_at_ms) < self.ttl_ms
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.written_at_ms).max(0)
    }
}

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Storage seam shared by the in-process map and Redis.
pub trait CacheBackend: Send + Sync {
    fn kind(&self) -> CacheBackendKind;

    fn load<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredEntry>>;

    /// Overwrite `key`. The backend may drop the entry once `keep_for` has
    /// elapsed since `entry.written_at_ms`.
    fn store<'a>(
        &'a self,
        key: &'a str,
        entry: StoredEntry,
        keep_for: Duration,
    ) -> BackendFuture<'a, ()>;

    fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, bool>;

    /// Remove keys matching a glob, or every key when `pattern` is `None`.
    fn remove_matching<'a>(&'a self, pattern: Option<&'a str>) -> BackendFuture<'a, usize>;

    /// Number of stored keys, `None` when it cannot be counted cheaply.
    fn len<'a>(&'a self) -> BackendFuture<'a, Option<usize>>;
}

/// Counter snapshot reported by [`EntryCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    #[serde(rename = "type")]
    pub kind: CacheBackendKind,
    /// `-1` when the backend cannot report it.
    pub size: i64,
    pub hits: u64,
    pub misses: u64,
}

/// A retained value returned regardless of liveness.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleValue<T> {
    pub value: T,
    pub age: Duration,
    pub expired: bool,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Failure-absorbing facade over a [`CacheBackend`].
#[derive(Clone)]
pub struct EntryCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    stale_retention: Duration,
    counters: Arc<Counters>,
}

impl EntryCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            stale_retention: DEFAULT_STALE_RETENTION,
            counters: Arc::new(Counters::default()),
        }
    }

    /// In-process cache with default bounds.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        let backend = Arc::new(MemoryBackend::new(
            memory::DEFAULT_MAX_ENTRIES,
            Arc::clone(&clock),
        ));
        Self::new(backend, clock)
    }

    /// Build the backend described by `config`.
    ///
    /// # Errors
    /// Returns an error if the Redis URL cannot be parsed.
    pub fn from_config(
        config: &CacheBackendConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let backend: Arc<dyn CacheBackend> = match config {
            CacheBackendConfig::Memory { max_entries } => {
                Arc::new(MemoryBackend::new(*max_entries, Arc::clone(&clock)))
            }
            CacheBackendConfig::Redis { url, namespace } => {
                Arc::new(RedisBackend::open(url, namespace)?)
            }
        };
        Ok(Self::new(backend, clock))
    }

    pub fn with_stale_retention(mut self, stale_retention: Duration) -> Self {
        self.stale_retention = stale_retention;
        self
    }

    pub fn kind(&self) -> CacheBackendKind {
        self.backend.kind()
    }

    pub fn stale_retention(&self) -> Duration {
        self.stale_retention
    }

    /// Live value for `key`; misses on absence, expiry and any failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now_ms = self.clock.now_ms();
        let Some(entry) = self.load_retained(key, now_ms).await else {
            self.record_miss(key, "absent");
            return None;
        };

        if !entry.is_live(now_ms) {
            self.record_miss(key, "expired");
            return None;
        }

        match serde_json::from_str(&entry.value) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache hit");
                Some(value)
            }
            Err(error) => {
                warn!(key, %error, "cached value could not be decoded; treating as miss");
                self.record_miss(key, "undecodable");
                None
            }
        }
    }

    /// Overwrite `key`. A zero TTL stores an already-expired entry.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(error) => {
                warn!(key, %error, "cache value could not be encoded; skipping write");
                return;
            }
        };

        let entry = StoredEntry {
            value: encoded,
            written_at_ms: self.clock.now_ms(),
            ttl_ms: duration_ms(ttl),
        };
        let keep_for = ttl.saturating_add(self.stale_retention);
        if let Err(error) = self.backend.store(key, entry, keep_for).await {
            warn!(key, backend = %self.kind(), %error, "cache write failed");
        }
    }

    /// Time since the last write of a live entry.
    pub async fn age(&self, key: &str) -> Option<Duration> {
        let now_ms = self.clock.now_ms();
        let entry = self.load_retained(key, now_ms).await?;
        if !entry.is_live(now_ms) {
            return None;
        }
        Some(Duration::from_millis(entry.age_ms(now_ms).unsigned_abs()))
    }

    /// [`EntryCache::age`] in milliseconds, `f64::INFINITY` when absent or expired.
    pub async fn age_millis(&self, key: &str) -> f64 {
        self.age(key)
            .await
            .map_or(f64::INFINITY, |age| age.as_secs_f64() * 1_000.0)
    }

    /// Retained value regardless of liveness. Used only for last-resort fallback.
    pub async fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<StaleValue<T>> {
        let now_ms = self.clock.now_ms();
        let entry = self.load_retained(key, now_ms).await?;
        match serde_json::from_str(&entry.value) {
            Ok(value) => Some(StaleValue {
                value,
                age: Duration::from_millis(entry.age_ms(now_ms).unsigned_abs()),
                expired: !entry.is_live(now_ms),
            }),
            Err(error) => {
                warn!(key, %error, "retained value could not be decoded");
                None
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.remove(key).await {
            Ok(removed) => removed,
            Err(error) => {
                warn!(key, backend = %self.kind(), %error, "cache delete failed");
                false
            }
        }
    }

    /// Remove keys matching a glob (`*`, `?`); `None` empties the namespace.
    pub async fn clear(&self, pattern: Option<&str>) -> usize {
        match self.backend.remove_matching(pattern).await {
            Ok(removed) => {
                debug!(pattern, removed, "cache cleared");
                removed
            }
            Err(error) => {
                warn!(pattern, backend = %self.kind(), %error, "cache clear failed");
                0
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let size = match self.backend.len().await {
            Ok(Some(len)) => i64::try_from(len).unwrap_or(i64::MAX),
            Ok(None) => -1,
            Err(error) => {
                warn!(backend = %self.kind(), %error, "cache size unavailable");
                -1
            }
        };

        CacheStats {
            kind: self.kind(),
            size,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    async fn load_retained(&self, key: &str, now_ms: i64) -> Option<StoredEntry> {
        let entry = match self.backend.load(key).await {
            Ok(entry) => entry?,
            Err(error) => {
                warn!(key, backend = %self.kind(), %error, "cache read failed; treating as miss");
                return None;
            }
        };

        let retained_ms = entry
            .ttl_ms
            .saturating_add(duration_ms(self.stale_retention));
        (entry.age_ms(now_ms) < retained_ms).then_some(entry)
    }

    fn record_miss(&self, key: &str, reason: &'static str) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, reason, "cache miss");
    }
}
