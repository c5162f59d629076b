//! Durable key/value documents for the session engine.
//!
//! Every write replaces the whole document for a key in a single statement,
//! so a reader sees either the previous complete value or the new one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
#[cfg(feature = "sqlite")]
use concierge_db::DbPool;
#[cfg(feature = "sqlite")]
use rusqlite::OptionalExtension;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[cfg(feature = "sqlite")]
use crate::db_timestamp;
use crate::StoreError;

/// Durable storage for whole JSON documents keyed by name.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Reads the document stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the document stored under `key`.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Deletes the document stored under `key`. Missing keys are fine.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Reads and deserializes a document.
pub async fn read_document<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serializes and writes a document.
pub async fn write_document<T: Serialize + ?Sized>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.put(key, serde_json::to_value(value)?).await
}

/// [`LocalStore`] backed by the `local_state` table.
#[cfg(feature = "sqlite")]
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: DbPool,
}

#[cfg(feature = "sqlite")]
impl SqliteLocalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "sqlite")]
#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Value>, StoreError> {
            let conn = pool.get()?;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value_json FROM local_state WHERE key = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            match raw {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let raw = serde_json::to_string(&value)?;
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO local_state (key, value_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at",
                rusqlite::params![key, raw, db_timestamp(chrono::Utc::now())],
            )?;
            tracing::debug!(key = %key, bytes = raw.len(), "local state written");
            Ok(())
        })
        .await?
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = pool.get()?;
            conn.execute("DELETE FROM local_state WHERE key = ?1", [&key])?;
            Ok(())
        })
        .await?
    }
}

/// In-memory [`LocalStore`], used by tests and embedded callers that do not
/// need persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a document exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(key)
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "sqlite")]
    use concierge_db::{open_database, DbRuntimeSettings};
    use serde_json::json;

    async fn exercise(store: &dyn LocalStore) {
        assert!(store.get("activeOrders").await.unwrap().is_none());

        store.put("activeOrders", json!([{"reference": "#ORD-1"}])).await.unwrap();
        store.put("activeOrders", json!([{"reference": "#ORD-2"}])).await.unwrap();
        assert_eq!(
            store.get("activeOrders").await.unwrap(),
            Some(json!([{"reference": "#ORD-2"}]))
        );

        store.remove("activeOrders").await.unwrap();
        store.remove("activeOrders").await.unwrap();
        assert!(store.get("activeOrders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_replaces_documents() {
        exercise(&MemoryLocalStore::new()).await;
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_store_replaces_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.db");
        let (pool, _) = open_database(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
        exercise(&SqliteLocalStore::new(pool)).await;
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.db");
        let path = path.to_str().unwrap();
        {
            let (pool, _) = open_database(path, DbRuntimeSettings::default()).unwrap();
            let store = SqliteLocalStore::new(pool);
            write_document(&store, "checkpoints", &vec!["a", "b"]).await.unwrap();
        }
        let (pool, _) = open_database(path, DbRuntimeSettings::default()).unwrap();
        let store = SqliteLocalStore::new(pool);
        let restored: Option<Vec<String>> = read_document(&store, "checkpoints").await.unwrap();
        assert_eq!(restored, Some(vec!["a".to_string(), "b".to_string()]));
    }
}
