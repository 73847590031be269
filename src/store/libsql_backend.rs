//! libSQL checkpoint store.
//!
//! One row in `checkpoint` holds the current value; every advance also
//! appends to `checkpoint_history` inside the same transaction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::pipeline::types::{Checkpoint, MessageId};
use crate::store::migrations;
use crate::store::traits::{CheckpointStore, check_monotonic};

const CHECKPOINT_KEY: &str = "last_processed_message";

/// A historical checkpoint advance.
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    pub message_id: MessageId,
    pub saved_at: DateTime<Utc>,
}

/// libSQL-backed [`CheckpointStore`].
pub struct LibSqlCheckpointStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlCheckpointStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Checkpoint store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn read_current(conn: &Connection) -> Result<Option<Checkpoint>, StoreError> {
        let mut rows = conn
            .query(
                "SELECT message_id FROM checkpoint WHERE key = ?1",
                params![CHECKPOINT_KEY],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load checkpoint: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("load checkpoint: {e}")))?
        {
            Some(row) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("load checkpoint: {e}")))?;
                Ok(Checkpoint::from_stored(&raw))
            }
            None => Ok(None),
        }
    }

    /// Most recent advances, newest first.
    pub async fn history(&self, limit: u32) -> Result<Vec<CheckpointRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT message_id, saved_at FROM checkpoint_history
                 WHERE key = ?1 ORDER BY id DESC LIMIT ?2",
                params![CHECKPOINT_KEY, limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("checkpoint history: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("checkpoint history: {e}")))?
        {
            let message_id: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("checkpoint history: {e}")))?;
            let saved_at: String = row
                .get(1)
                .map_err(|e| StoreError::Query(format!("checkpoint history: {e}")))?;
            let saved_at = DateTime::parse_from_rfc3339(&saved_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    StoreError::Query(format!("checkpoint history: bad saved_at '{saved_at}': {e}"))
                })?;
            records.push(CheckpointRecord {
                message_id: MessageId::new(message_id),
                saved_at,
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl CheckpointStore for LibSqlCheckpointStore {
    async fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        Self::read_current(&self.conn).await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("begin save: {e}")))?;

        let current = Self::read_current(&tx).await?;
        check_monotonic(current.as_ref(), checkpoint)?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO checkpoint (key, message_id, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET message_id = ?2, updated_at = ?3",
            params![CHECKPOINT_KEY, checkpoint.as_str(), now.as_str()],
        )
        .await
        .map_err(|e| StoreError::Query(format!("save checkpoint: {e}")))?;

        tx.execute(
            "INSERT INTO checkpoint_history (key, message_id, saved_at) VALUES (?1, ?2, ?3)",
            params![CHECKPOINT_KEY, checkpoint.as_str(), now.as_str()],
        )
        .await
        .map_err(|e| StoreError::Query(format!("append checkpoint history: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("commit checkpoint: {e}")))?;

        debug!(checkpoint = %checkpoint, "Checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(id: &str) -> Checkpoint {
        Checkpoint::new(MessageId::new(id))
    }

    async fn test_store() -> LibSqlCheckpointStore {
        LibSqlCheckpointStore::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn empty_store_loads_none() {
        let store = test_store().await;
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = test_store().await;
        store.save(&cp("5")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(cp("5")));

        store.save(&cp("7")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(cp("7")));
    }

    #[tokio::test]
    async fn saving_same_value_is_allowed() {
        let store = test_store().await;
        store.save(&cp("5")).await.unwrap();
        store.save(&cp("5")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(cp("5")));
    }

    #[tokio::test]
    async fn regression_is_rejected_and_value_kept() {
        let store = test_store().await;
        store.save(&cp("5")).await.unwrap();
        let err = store.save(&cp("3")).await.unwrap_err();
        assert!(matches!(err, StoreError::Regression { .. }));
        assert_eq!(store.load().await.unwrap(), Some(cp("5")));
        assert_eq!(store.history(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let store = test_store().await;
        for id in ["1", "2", "3"] {
            store.save(&cp(id)).await.unwrap();
        }
        let history = store.history(2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message_id.as_str(), "3");
        assert_eq!(history[1].message_id.as_str(), "2");
    }

    #[tokio::test]
    async fn corrupt_history_timestamp_is_query_error() {
        let store = test_store().await;
        store.save(&cp("1")).await.unwrap();
        store
            .conn
            .execute(
                "INSERT INTO checkpoint_history (key, message_id, saved_at) VALUES (?1, ?2, ?3)",
                params![CHECKPOINT_KEY, "2", "yesterday"],
            )
            .await
            .unwrap();

        assert!(matches!(
            store.history(10).await,
            Err(StoreError::Query(msg)) if msg.contains("yesterday")
        ));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("autoreply.db");
        {
            let store = LibSqlCheckpointStore::new_local(&path).await.unwrap();
            store.save(&cp("18c2")).await.unwrap();
        }
        let reopened = LibSqlCheckpointStore::new_local(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(cp("18c2")));
    }
}
