//! Entry CRUD and generation lifecycle operations.
//!
//! Entries are immutable snapshots of responses; storing the same key
//! again inside a generation replaces the prior entry (UPSERT), so a
//! generation holds at most one entry per key.

use super::connection::CacheDb;
use crate::Error;
use crate::generation::Generations;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached response snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    /// Store key, see [`super::hash::entry_key`].
    pub key: String,
    /// Generation name this entry lives in.
    pub generation: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Selected response headers, JSON-encoded.
    pub headers_json: Option<String>,
    pub body: Vec<u8>,
    /// RFC 3339 timestamp of when the entry was stored.
    pub stored_at: String,
}

const ENTRY_COLUMNS: &str = "generation, key, method, url, status, content_type, headers_json, body, stored_at";

fn entry_from_row(row: &rusqlite::Row<'_>) -> Result<CachedEntry, rusqlite::Error> {
    Ok(CachedEntry {
        generation: row.get(0)?,
        key: row.get(1)?,
        method: row.get(2)?,
        url: row.get(3)?,
        status: row.get::<_, i64>(4)? as u16,
        content_type: row.get(5)?,
        headers_json: row.get(6)?,
        body: row.get(7)?,
        stored_at: row.get(8)?,
    })
}

impl CacheDb {
    /// Insert or replace an entry in its generation.
    pub async fn put_entry(&self, entry: &CachedEntry) -> Result<(), Error> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (
                    generation, key, method, url, status, content_type,
                    headers_json, body, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(generation, key) DO UPDATE SET
                    method = excluded.method,
                    url = excluded.url,
                    status = excluded.status,
                    content_type = excluded.content_type,
                    headers_json = excluded.headers_json,
                    body = excluded.body,
                    stored_at = excluded.stored_at",
                    params![
                        &entry.generation,
                        &entry.key,
                        &entry.method,
                        &entry.url,
                        entry.status as i64,
                        &entry.content_type,
                        &entry.headers_json,
                        &entry.body,
                        &entry.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by (generation, key).
    ///
    /// Returns None if the generation has no entry for the key.
    pub async fn get_entry(&self, generation: &str, key: &str) -> Result<Option<CachedEntry>, Error> {
        let generation = generation.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedEntry>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries WHERE generation = ?1 AND key = ?2"
                ))?;

                let result = stmt.query_row(params![generation, key], entry_from_row);

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by key from the current generations, static first.
    ///
    /// The lookup order matches the order the generations are created in,
    /// so a key present in both resolves to the static copy.
    pub async fn get_entry_current(&self, generations: &Generations, key: &str) -> Result<Option<CachedEntry>, Error> {
        for name in generations.names() {
            if let Some(entry) = self.get_entry(name, key).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// List the distinct generation names present in the store.
    pub async fn list_generations(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT DISTINCT generation FROM entries ORDER BY generation")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry in a generation.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_generation(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE generation = ?1", params![generation])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation that is not part of the current deployment.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_stale_generations(&self, current: &Generations) -> Result<u64, Error> {
        let static_name = current.static_name.clone();
        let dynamic_name = current.dynamic_name.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE generation NOT IN (?1, ?2)",
                    params![static_name, dynamic_name],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Count the entries in a generation.
    pub async fn count_entries(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE generation = ?1",
                    params![generation],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
