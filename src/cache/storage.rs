//! SQLite store backend.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::key::{normalize_url, request_key};
use super::traits::{CacheStorage, CachedResponse};
use crate::http::{Request, Response};

type Headers = Vec<(String, String)>;

/// SQLite-based store implementation.
///
/// All stores live in one database file; a store is a row in `stores` plus
/// its rows in `entries`. Survives restarts until the store is deleted.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the database at `path`, or at the default location if `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("trip-sw").join("cache.db"))
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

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS entries (
    store TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    request_headers TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, request_key)
);
"#;

fn reject_non_get(request: &Request) -> Result<()> {
  if request.is_get() {
    Ok(())
  } else {
    Err(eyre!(
      "Refusing to store {} request for {}",
      request.method,
      request.url
    ))
  }
}

/// Insert the store row (if new) and one entry. Caller owns the transaction.
fn insert_entry(
  conn: &Connection,
  store: &str,
  request: &Request,
  response: &Response,
) -> Result<()> {
  let request_headers = serde_json::to_string(&request.headers)
    .map_err(|e| eyre!("Failed to serialize request headers: {}", e))?;
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize response headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO stores (name) VALUES (?)",
      params![store],
    )
    .map_err(|e| eyre!("Failed to create store {}: {}", store, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (store, request_key, url, request_headers, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        store,
        request_key(&request.url),
        normalize_url(&request.url),
        request_headers,
        response.status,
        headers,
        response.body.as_ref(),
      ],
    )
    .map_err(|e| eyre!("Failed to store entry for {}: {}", request.url, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn keys(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read store name: {}", e))?;

    Ok(names)
  }

  fn has(&self, store: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let found: Option<i64> = conn
      .query_row("SELECT 1 FROM stores WHERE name = ?", params![store], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up store {}: {}", store, e))?;

    Ok(found.is_some())
  }

  fn delete(&self, store: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE store = ?", params![store])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", store, e))?;
    let removed = tx
      .execute("DELETE FROM stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_request(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>> {
    if !request.is_get() {
      return Ok(None);
    }

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE store = ? AND request_key = ?",
        params![store, request_key(&request.url)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", request.url, e))?;

    match row {
      Some((status, headers, body, cached_at_str)) => {
        let headers: Headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(CachedResponse {
          response: Response::new(status, headers, body),
          cached_at: parse_datetime(&cached_at_str)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    reject_non_get(request)?;

    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    insert_entry(&tx, store, request, response)?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()> {
    for (request, _) in entries {
      reject_non_get(request)?;
    }

    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Dropping the transaction on any error rolls everything back
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    for (request, response) in entries {
      insert_entry(&tx, store, request, response)?;
    }
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entry_count(&self, store: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE store = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", store, e))?;

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
