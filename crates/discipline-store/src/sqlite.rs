//! SQLite-based store implementation

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::{Codec, StoreError, StoreResult, ValueStore};

/// Keeps one value in a row of the `stored_values` table, selected by key.
///
/// Several stores can share one database file as long as their keys differ.
/// Queries run on tokio's blocking pool.
pub struct SqliteStore<V> {
    conn: Arc<Mutex<Connection>>,
    key: &'static str,
    codec: Codec<V>,
}

impl<V> SqliteStore<V> {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>, key: &'static str, codec: Codec<V>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, key, codec)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory(key: &'static str, codec: Codec<V>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, key, codec)
    }

    fn with_connection(conn: Connection, key: &'static str, codec: Codec<V>) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key,
            codec,
        })
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Run `f` against the connection on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Blocking task failed: {}", e)))?
    }

    async fn load_text(&self) -> StoreResult<Option<String>> {
        let key = self.key;
        self.blocking(move |conn| load_text(conn, key)).await
    }

    async fn save_text(&self, text: String) -> StoreResult<()> {
        let key = self.key;
        self.blocking(move |conn| save_text(conn, key, &text)).await
    }
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        -- One row per stored value
        CREATE TABLE IF NOT EXISTS stored_values (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    debug!("Store schema initialized");
    Ok(())
}

fn load_text(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    let text = conn
        .query_row(
            "SELECT value FROM stored_values WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(text)
}

fn save_text(conn: &Connection, key: &str, text: &str) -> StoreResult<()> {
    let updated_at = discipline_util::now().to_string();

    conn.execute(
        r#"
        INSERT INTO stored_values (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key)
        DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        params![key, text, updated_at],
    )?;

    debug!(key, "Value saved");
    Ok(())
}

#[async_trait]
impl<V: Send + Sync + 'static> ValueStore<V> for SqliteStore<V> {
    async fn read(&self) -> StoreResult<V> {
        match self.load_text().await? {
            Some(text) => self
                .codec
                .deserialize(&text)
                .map_err(|source| StoreError::Deserialize {
                    location: format!("sqlite table stored_values, key '{}'", self.key),
                    source,
                }),
            None => {
                info!(key = self.key, "No stored value, writing fallback");
                let value = self.codec.fallback();
                self.save_text(self.codec.serialize(&value)).await?;
                Ok(value)
            }
        }
    }

    async fn write(&self, value: &V) -> StoreResult<()> {
        self.save_text(self.codec.serialize(value)).await
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_codec() -> Codec<String> {
        Codec::new(
            |v: &String| v.clone(),
            |text: &str| {
                if text.is_empty() {
                    Err("empty label")
                } else {
                    Ok(text.to_string())
                }
            },
            || "fresh".to_string(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = SqliteStore::in_memory("label", label_codec()).unwrap();
        assert!(store.is_healthy());
        assert_eq!(store.key(), "label");
    }

    #[tokio::test]
    async fn test_fallback_then_write() {
        let store = SqliteStore::in_memory("label", label_codec()).unwrap();

        assert_eq!(store.read().await.unwrap(), "fresh");
        assert_eq!(store.load_text().await.unwrap().as_deref(), Some("fresh"));

        store.write(&"updated".to_string()).await.unwrap();
        assert_eq!(store.read().await.unwrap(), "updated");
    }

    #[tokio::test]
    async fn test_bad_value_is_deserialize_error() {
        let store = SqliteStore::in_memory("label", label_codec()).unwrap();
        store.save_text(String::new()).await.unwrap();

        match store.read().await {
            Err(StoreError::Deserialize { location, .. }) => assert!(location.contains("'label'")),
            other => panic!("expected deserialize error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_value_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discipline.db");

        {
            let store = SqliteStore::open(&path, "label", label_codec()).unwrap();
            store.write(&"kept".to_string()).await.unwrap();
        }

        let store = SqliteStore::open(&path, "label", label_codec()).unwrap();
        assert_eq!(store.read().await.unwrap(), "kept");
    }

    #[tokio::test]
    async fn test_keys_share_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discipline.db");

        let first = SqliteStore::open(&path, "first", label_codec()).unwrap();
        let second = SqliteStore::open(&path, "second", label_codec()).unwrap();
        first.write(&"one".to_string()).await.unwrap();
        second.write(&"two".to_string()).await.unwrap();

        assert_eq!(first.read().await.unwrap(), "one");
        assert_eq!(second.read().await.unwrap(), "two");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writes_on_runtime() {
        let store = Arc::new(SqliteStore::in_memory("label", label_codec()).unwrap());

        let writes = (0..8).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.write(&format!("value {}", i)).await })
        });
        for handle in writes {
            handle.await.unwrap().unwrap();
        }

        assert!(store.read().await.unwrap().starts_with("value "));
    }
}
