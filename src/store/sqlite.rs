//! SQLite-backed partition store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{PartitionStore, StoredResponse};

/// Durable partition store in a single SQLite database.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the response cache.
const CACHE_SCHEMA: &str = r#"
-- One row per cached response, keyed by (partition, request key)
CREATE TABLE IF NOT EXISTS response_cache (
    partition TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, request_key)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_partition
    ON response_cache(partition);
"#;

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a transient in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offcache").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

impl PartitionStore for SqliteStore {
  fn read(&self, partition: &str, key: &str) -> Result<Option<StoredResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, stored_at FROM response_cache
         WHERE partition = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![partition, key], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, headers_json, body, stored_at_str)) => {
        let headers: HashMap<String, String> = serde_json::from_str(&headers_json)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        let stored_at = parse_datetime(&stored_at_str)?;
        Ok(Some(StoredResponse {
          status,
          headers,
          body,
          stored_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn write(&self, partition: &str, key: &str, entry: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&entry.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    let stored_at = entry.stored_at.format("%Y-%m-%d %H:%M:%S").to_string();

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (partition, request_key, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![partition, key, entry.status, headers, entry.body, stored_at],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT partition FROM response_cache ORDER BY partition")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let deleted = conn
      .execute(
        "DELETE FROM response_cache WHERE partition = ?",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to delete partition {}: {}", partition, e))?;

    Ok(deleted > 0)
  }

  fn entry_count(&self, partition: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM response_cache WHERE partition = ?",
        params![partition],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries: {}", e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::Response;

  fn entry(status: u16, body: &[u8]) -> StoredResponse {
    StoredResponse::snapshot(
      &Response::new(status, body.to_vec()).with_header("content-type", "text/html"),
    )
  }

  #[test]
  fn test_roundtrip_preserves_status_headers_body() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.write("static-v1.0.0", "k1", &entry(200, b"<html>")).unwrap();

    let read = store.read("static-v1.0.0", "k1").unwrap().unwrap();
    assert_eq!(read.status, 200);
    assert_eq!(read.body, b"<html>");
    assert_eq!(
      read.headers.get("content-type").map(String::as_str),
      Some("text/html")
    );
  }

  #[test]
  fn test_stored_at_survives_roundtrip_to_the_second() {
    let store = SqliteStore::open_in_memory().unwrap();
    let written = entry(200, b"x");
    store.write("api-v1.0.0", "k1", &written).unwrap();

    let read = store.read("api-v1.0.0", "k1").unwrap().unwrap();
    assert_eq!(
      read.stored_at.timestamp(),
      written.stored_at.timestamp()
    );
  }

  #[test]
  fn test_partition_listing_and_deletion() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.write("static-v1.0.0", "k1", &entry(200, b"a")).unwrap();
    store.write("static-v1.0.0", "k2", &entry(200, b"b")).unwrap();
    store.write("api-v1.0.0", "k1", &entry(200, b"c")).unwrap();

    let mut names = store.partitions().unwrap();
    names.sort();
    assert_eq!(names, vec!["api-v1.0.0", "static-v1.0.0"]);
    assert_eq!(store.entry_count("static-v1.0.0").unwrap(), 2);

    assert!(store.delete_partition("static-v1.0.0").unwrap());
    assert_eq!(store.entry_count("static-v1.0.0").unwrap(), 0);
    assert_eq!(store.partitions().unwrap(), vec!["api-v1.0.0"]);
  }

  #[test]
  fn test_overwrite_replaces_existing_row() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.write("api-v1.0.0", "k1", &entry(200, b"old")).unwrap();
    store.write("api-v1.0.0", "k1", &entry(201, b"new")).unwrap();

    let read = store.read("api-v1.0.0", "k1").unwrap().unwrap();
    assert_eq!(read.status, 201);
    assert_eq!(read.body, b"new");
    assert_eq!(store.entry_count("api-v1.0.0").unwrap(), 1);
  }
}
