//! Database connection management with pragma configuration.
//!
//! Opens the SQLite database behind [`CacheStorage`], applies the pragmas the
//! cache relies on (WAL for concurrent fetch handlers, foreign keys for the
//! partition → entry cascade) and runs migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Process-wide cache storage shared by every fetch handler.
///
/// Wraps a tokio-rusqlite Connection that runs statements on a background
/// thread. Cloning is cheap and every clone talks to the same database.
#[derive(Clone, Debug)]
pub struct CacheStorage {
    pub(crate) conn: Connection,
}

impl CacheStorage {
    /// Open the storage at the specified path, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory storage for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let fk: i64 = storage
            .conn
            .call(|conn| conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_open_file_reopens_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let storage = CacheStorage::open(&path).await.unwrap();
        storage.open_partition("boxer-site-v1-static").await.unwrap();
        drop(storage);

        let reopened = CacheStorage::open(&path).await.unwrap();
        assert_eq!(reopened.partition_names().await.unwrap(), vec!["boxer-site-v1-static".to_string()]);
    }
}
