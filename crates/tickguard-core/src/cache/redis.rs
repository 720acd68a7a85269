//! Redis cache backend.
//!
//! Shared across application instances. Keys are prefixed with a namespace
//! (`tickguard:` by default) so that a full clear never touches foreign keys.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::info;

use super::{BackendFuture, CacheBackend, CacheBackendKind, CacheError, StoredEntry};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const SCAN_BATCH: usize = 500;

/// Redis backend over a lazily-established multiplexed connection.
pub struct RedisBackend {
    client: Client,
    prefix: String,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisBackend {
    /// Parse the URL. No connection is made until the first command.
    ///
    /// # Errors
    /// Returns an error if `url` is not a valid Redis connection string.
    pub fn open(url: &str, namespace: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let namespace = namespace.trim_end_matches(':');
        Ok(Self {
            client,
            prefix: format!("{namespace}:"),
            connection: OnceCell::new(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let connection = timeout(
                    CONNECT_TIMEOUT,
                    self.client.get_multiplexed_async_connection(),
                )
                .await
                .map_err(|_| CacheError::Timeout(CONNECT_TIMEOUT))??;
                info!(prefix = %self.prefix, "redis cache connection established");
                Ok::<_, CacheError>(connection)
            })
            .await?;
        Ok(connection.clone())
    }

    async fn scan_keys(
        &self,
        connection: &mut MultiplexedConnection,
        pattern: &str,
    ) -> Result<Vec<String>, CacheError> {
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(connection)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

impl CacheBackend for RedisBackend {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Redis
    }

    fn load<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredEntry>> {
        Box::pin(async move {
            let mut connection = self.connection().await?;
            let raw: Option<String> = redis::cmd("GET")
                .arg(self.full_key(key))
                .query_async(&mut connection)
                .await?;
            raw.map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(CacheError::from)
        })
    }

    fn store<'a>(
        &'a self,
        key: &'a str,
        entry: StoredEntry,
        keep_for: Duration,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let payload = serde_json::to_string(&entry)?;
            // PX must be positive.
            let expire_ms = u64::try_from(keep_for.as_millis()).unwrap_or(u64::MAX).max(1);
            let mut connection = self.connection().await?;
            let _: () = redis::cmd("SET")
                .arg(self.full_key(key))
                .arg(payload)
                .arg("PX")
                .arg(expire_ms)
                .query_async(&mut connection)
                .await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let mut connection = self.connection().await?;
            let removed: usize = redis::cmd("DEL")
                .arg(self.full_key(key))
                .query_async(&mut connection)
                .await?;
            Ok(removed > 0)
        })
    }

    fn remove_matching<'a>(&'a self, pattern: Option<&'a str>) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let mut connection = self.connection().await?;
            let pattern = self.full_key(pattern.unwrap_or("*"));
            let keys = self.scan_keys(&mut connection, &pattern).await?;

            let mut removed = 0;
            for chunk in keys.chunks(SCAN_BATCH) {
                let deleted: usize = redis::cmd("DEL")
                    .arg(chunk)
                    .query_async(&mut connection)
                    .await?;
                removed += deleted;
            }
            Ok(removed)
        })
    }

    fn len<'a>(&'a self) -> BackendFuture<'a, Option<usize>> {
        // Counting a namespace needs a full SCAN.
        Box::pin(async { Ok(None) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let backend = RedisBackend::open("redis://127.0.0.1:6379", "tickguard").expect("url");
        assert_eq!(backend.full_key("quote:AAPL:v1"), "tickguard:quote:AAPL:v1");

        let trailing = RedisBackend::open("redis://127.0.0.1:6379", "app:").expect("url");
        assert_eq!(trailing.prefix(), "app:");
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            RedisBackend::open("not a url", "tickguard"),
            Err(CacheError::Redis(_))
        ));
    }

    #[tokio::test]
    async fn size_is_not_reported() {
        let backend = RedisBackend::open("redis://127.0.0.1:6379", "tickguard").expect("url");
        assert_eq!(backend.len().await.expect("len"), None);
        assert_eq!(backend.kind(), CacheBackendKind::Redis);
    }
}
