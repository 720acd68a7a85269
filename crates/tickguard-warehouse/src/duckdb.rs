//! `DuckDB` connection pool.
//!
//! A single database instance is opened per file; extra connections are
//! cloned from the root connection so that every handle shares one instance
//! (and one file lock).

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

struct PoolInner {
    db_path: PathBuf,
    max_idle: usize,
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
}

/// Clonable handle to a pool of connections on one `DuckDB` database.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let root = Connection::open(&db_path)?;
        configure_connection(&root)?;
        Ok(Self::from_root(db_path, root, max_idle))
    }

    /// Open a private in-memory database. Mostly useful for tests.
    ///
    /// # Errors
    /// Returns an error if `DuckDB` cannot allocate the database.
    pub fn open_in_memory(max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let root = Connection::open_in_memory()?;
        configure_connection(&root)?;
        Ok(Self::from_root(PathBuf::from(":memory:"), root, max_idle))
    }

    fn from_root(db_path: PathBuf, root: Connection, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path,
                max_idle: max_idle.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Take an idle connection or clone a new one from the root.
    ///
    /// # Errors
    /// Returns an error if a new connection cannot be cloned.
    ///
    /// # Panics
    /// Panics if a pool mutex is poisoned.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let idle = self
            .inner
            .idle
            .lock()
            .expect("duckdb idle pool mutex poisoned")
            .pop();

        let connection = match idle {
            Some(connection) => connection,
            None => {
                let root = self
                    .inner
                    .root
                    .lock()
                    .expect("duckdb root connection mutex poisoned");
                root.try_clone()?
            }
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }
}

/// A connection that goes back to the idle list when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let Ok(mut idle) = self.pool.idle.lock() else {
            return;
        };
        if idle.len() < self.pool.max_idle {
            idle.push(connection);
        }
    }
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloned_connections_share_one_database() {
        let pool = ConnectionPool::open_in_memory(2).expect("pool");

        {
            let writer = pool.acquire().expect("writer");
            writer
                .execute_batch("CREATE TABLE shared (id INTEGER); INSERT INTO shared VALUES (7);")
                .expect("seed");
        }

        let reader = pool.acquire().expect("reader");
        let value: i64 = reader
            .query_row("SELECT id FROM shared", [], |row| row.get(0))
            .expect("read");
        assert_eq!(value, 7);
    }

    #[test]
    fn idle_list_is_bounded() {
        let pool = ConnectionPool::open_in_memory(1).expect("pool");
        let first = pool.acquire().expect("first");
        let second = pool.acquire().expect("second");
        drop(first);
        drop(second);

        assert_eq!(pool.inner.idle.lock().expect("idle").len(), 1);
    }
}
