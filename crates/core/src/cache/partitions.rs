//! Named cache partitions.
//!
//! A partition maps a request identity (method + URL) to one stored
//! response. Every put replaces the previous entry for its key in a single
//! statement, and bulk population commits all entries or none.

use super::connection::CacheStorage;
use super::hash::compute_cache_key;
use crate::http::{Request, Response};
use crate::Error;
use serde::Serialize;
use tokio_rusqlite::{params, rusqlite};

/// Summary of one partition, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    pub name: String,
    pub created_at: String,
    /// Set once a bulk population committed.
    pub ready: bool,
    pub entries: u64,
}

/// Handle to a single named partition.
#[derive(Clone, Debug)]
pub struct Partition {
    storage: CacheStorage,
    name: String,
}

/// A stored entry as it travels to and from the database thread.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn encode(request: &Request, response: &Response) -> Result<Self, Error> {
        if !request.is_get() {
            return Err(Error::InvalidInput(format!("cannot cache {} request for {}", request.method, request.url)));
        }
        Ok(Self {
            key_hash: compute_cache_key(&request.method, &request.url),
            method: request.method.clone(),
            url: request.url.to_string(),
            status: i64::from(response.status),
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.to_vec(),
        })
    }
}

fn decode_response(url: String, status: i64, headers_json: &str, body: Vec<u8>) -> Result<Response, Error> {
    let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status} for {url}")))?;
    let headers: Vec<(String, String)> = serde_json::from_str(headers_json)?;
    Ok(Response { url, status, headers, body: body.into() })
}

fn insert_entry(conn: &rusqlite::Connection, partition: &str, row: &EntryRow, stored_at: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO entries (partition, key_hash, method, url, status, headers_json, body, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(partition, key_hash) DO UPDATE SET
             method = excluded.method,
             url = excluded.url,
             status = excluded.status,
             headers_json = excluded.headers_json,
             body = excluded.body,
             stored_at = excluded.stored_at",
        params![partition, row.key_hash, row.method, row.url, row.status, row.headers_json, row.body, stored_at],
    )?;
    Ok(())
}

fn ensure_partition(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl CacheStorage {
    /// Handle to a partition without touching the database.
    ///
    /// Lookups on a partition that does not exist miss and puts are
    /// dropped. Only [`CacheStorage::open_partition`] creates partitions.
    pub fn partition(&self, name: &str) -> Partition {
        Partition { storage: self.clone(), name: name.to_string() }
    }

    /// Open a partition, creating it if it does not exist yet.
    pub async fn open_partition(&self, name: &str) -> Result<Partition, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_partition(conn, &owned)?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(self.partition(name))
    }

    /// Names of all partitions, in creation order.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// All partitions with their entry counts, in creation order.
    pub async fn partitions(&self) -> Result<Vec<PartitionInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PartitionInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.name, p.created_at, p.ready, COUNT(e.key_hash)
                     FROM partitions p LEFT JOIN entries e ON e.partition = p.name
                     GROUP BY p.name
                     ORDER BY p.rowid",
                )?;
                let infos = stmt
                    .query_map([], |row| {
                        Ok(PartitionInfo {
                            name: row.get(0)?,
                            created_at: row.get(1)?,
                            ready: row.get::<_, i64>(2)? == 1,
                            entries: row.get::<_, i64>(3)? as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(infos)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and every entry in it.
    ///
    /// Returns false if no such partition existed.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Look the request up in every partition, oldest partition first.
    pub async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
        let key_hash = compute_cache_key(&request.method, &request.url);
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.url, e.status, e.headers_json, e.body
                     FROM entries e JOIN partitions p ON p.name = e.partition
                     WHERE e.key_hash = ?1
                     ORDER BY p.rowid
                     LIMIT 1",
                )?;
                let row = stmt.query_row(params![key_hash], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?, row.get(3)?))
                });
                match row {
                    Ok((url, status, headers, body)) => decode_response(url, status, &headers, body).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a response for the request, replacing any previous entry.
    ///
    /// Only GET requests can be stored. Returns false without writing when
    /// the partition does not exist, which is the case once it was deleted.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<bool, Error> {
        let row = EntryRow::encode(request, response)?;
        let name = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                let exists: bool =
                    tx.query_row("SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                if !exists {
                    return Ok(false);
                }
                insert_entry(&tx, &name, &row, &chrono::Utc::now().to_rfc3339())?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Store every pair and mark the partition ready, all in one transaction.
    ///
    /// Either every entry is written or none is.
    pub async fn put_all(&self, entries: &[(Request, Response)]) -> Result<(), Error> {
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::encode(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let name = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<(), Error> {
                let stored_at = chrono::Utc::now().to_rfc3339();
                let tx = conn.transaction()?;
                ensure_partition(&tx, &name)?;
                for row in &rows {
                    insert_entry(&tx, &name, row, &stored_at)?;
                }
                tx.execute("UPDATE partitions SET ready = 1 WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Stored response for the request, if any.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        let key_hash = compute_cache_key(&request.method, &request.url);
        let name = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let row = conn.query_row(
                    "SELECT url, status, headers_json, body FROM entries WHERE partition = ?1 AND key_hash = ?2",
                    params![name, key_hash],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?, row.get(3)?)),
                );
                match row {
                    Ok((url, status, headers, body)) => decode_response(url, status, &headers, body).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of all stored entries, oldest write first.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE partition = ?1 ORDER BY stored_at, rowid")?;
                let urls = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a bulk population of this partition has committed.
    pub async fn is_ready(&self) -> Result<bool, Error> {
        let name = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let ready = conn.query_row(
                    "SELECT COALESCE((SELECT ready FROM partitions WHERE name = ?1), 0)",
                    params![name],
                    |row| row.get::<_, i64>(0),
                )?;
                Ok(ready == 1)
            })
            .await
            .map_err(Error::from)
    }
}
