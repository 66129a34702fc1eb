//! Which version of the router is in control of a scope.

use super::connection::CacheStorage;
use crate::Error;
use tokio_rusqlite::{params, rusqlite};

impl CacheStorage {
    /// Version recorded as active for the scope, if any activation completed.
    pub async fn active_version(&self, scope: &str) -> Result<Option<String>, Error> {
        let scope = scope.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                match conn.query_row(
                    "SELECT active_version FROM registration WHERE scope = ?1",
                    params![scope],
                    |row| row.get(0),
                ) {
                    Ok(version) => Ok(Some(version)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Record the version that just finished activating.
    pub async fn set_active_version(&self, scope: &str, version: &str) -> Result<(), Error> {
        let scope = scope.to_string();
        let version = version.to_string();
        let activated_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO registration (scope, active_version, activated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(scope) DO UPDATE SET
                         active_version = excluded.active_version,
                         activated_at = excluded.activated_at",
                    params![scope, version, activated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_version_roundtrip() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        assert_eq!(storage.active_version("/").await.unwrap(), None);

        storage.set_active_version("/", "1.0.0").await.unwrap();
        storage.set_active_version("/", "1.1.0").await.unwrap();

        assert_eq!(storage.active_version("/").await.unwrap().as_deref(), Some("1.1.0"));
    }
}
