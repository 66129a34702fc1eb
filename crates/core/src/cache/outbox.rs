//! Deferred requests waiting for a background sync.
//!
//! Page code enqueues work while offline; the matching sync handler drains the
//! queue once connectivity returns. Entries are removed only after the
//! network accepted them.

use super::connection::CacheStorage;
use crate::Error;
use bytes::Bytes;
use serde::Serialize;
use tokio_rusqlite::params;

/// Queue drained by the analytics sync.
pub const ANALYTICS_QUEUE: &str = "analytics";

/// Queue drained by the user-actions sync.
pub const USER_ACTIONS_QUEUE: &str = "user-actions";

/// One queued request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub queue: String,
    pub method: String,
    pub url: String,
    #[serde(skip)]
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
    pub enqueued_at: String,
}

/// A request to enqueue.
#[derive(Debug, Clone, Default)]
pub struct NewOutboxEntry {
    pub method: String,
    pub url: String,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
}

impl CacheStorage {
    /// Append a request to the named queue, returning its id.
    pub async fn enqueue(&self, queue: &str, entry: NewOutboxEntry) -> Result<i64, Error> {
        if queue.trim().is_empty() {
            return Err(Error::InvalidInput("queue name cannot be empty".into()));
        }
        if entry.url.trim().is_empty() {
            return Err(Error::InvalidInput("queued url cannot be empty".into()));
        }
        let queue = queue.to_string();
        let method = if entry.method.is_empty() { "POST".to_string() } else { entry.method.to_ascii_uppercase() };
        let enqueued_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO outbox (queue, method, url, body, content_type, enqueued_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        queue,
                        method,
                        entry.url,
                        entry.body.as_ref().map(|b| b.to_vec()),
                        entry.content_type,
                        enqueued_at
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// Queued entries in enqueue order.
    pub async fn pending(&self, queue: &str) -> Result<Vec<OutboxEntry>, Error> {
        let queue = queue.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<OutboxEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, queue, method, url, body, content_type, enqueued_at
                     FROM outbox WHERE queue = ?1 ORDER BY id",
                )?;
                let entries = stmt
                    .query_map(params![queue], |row| {
                        Ok(OutboxEntry {
                            id: row.get(0)?,
                            queue: row.get(1)?,
                            method: row.get(2)?,
                            url: row.get(3)?,
                            body: row.get::<_, Option<Vec<u8>>>(4)?.map(Bytes::from),
                            content_type: row.get(5)?,
                            enqueued_at: row.get(6)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove delivered entries. Returns how many were removed.
    pub async fn acknowledge(&self, ids: &[i64]) -> Result<u64, Error> {
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut removed = 0u64;
                for id in &ids {
                    removed += tx.execute("DELETE FROM outbox WHERE id = ?1", params![id])? as u64;
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(url: &str, body: &str) -> NewOutboxEntry {
        NewOutboxEntry {
            method: "post".into(),
            url: url.into(),
            body: Some(Bytes::from(body.to_string())),
            content_type: Some("application/json".into()),
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_pending_order() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        storage.enqueue(USER_ACTIONS_QUEUE, event("/api/newsletter", r#"{"n":1}"#)).await.unwrap();
        storage.enqueue(USER_ACTIONS_QUEUE, event("/api/contact", r#"{"n":2}"#)).await.unwrap();
        storage.enqueue(ANALYTICS_QUEUE, event("/api/analytics", r#"{"e":"view"}"#)).await.unwrap();

        let pending = storage.pending(USER_ACTIONS_QUEUE).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].url, "/api/newsletter");
        assert_eq!(pending[0].method, "POST");
        assert_eq!(pending[1].body.as_deref(), Some(&br#"{"n":2}"#[..]));
    }

    #[tokio::test]
    async fn test_acknowledge_removes_only_given_ids() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let first = storage.enqueue(ANALYTICS_QUEUE, event("/a", "1")).await.unwrap();
        storage.enqueue(ANALYTICS_QUEUE, event("/a", "2")).await.unwrap();

        assert_eq!(storage.acknowledge(&[first]).await.unwrap(), 1);
        let pending = storage.pending(ANALYTICS_QUEUE).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].id, first);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_empty_queue() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let result = storage.enqueue(" ", event("/a", "1")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_enqueue_defaults_method() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let entry = NewOutboxEntry { url: "/api/contact".into(), ..Default::default() };
        storage.enqueue(USER_ACTIONS_QUEUE, entry).await.unwrap();
        assert_eq!(storage.pending(USER_ACTIONS_QUEUE).await.unwrap()[0].method, "POST");
    }
}
