//! Durable keyed store trait and SQLite implementation.
//!
//! This store holds local-only records (never synced with the remote service).

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A value that can be kept in a [`PersistentStore`].
pub trait Record: Serialize + DeserializeOwned {
  /// Key of this record within its type
  fn record_key(&self) -> String;

  /// Record type name for storage organization (e.g., "resource_pin")
  fn record_type() -> &'static str;
}

/// A stored record with its write time.
#[derive(Debug, Clone)]
pub struct StoredRecord<T> {
  pub value: T,
  pub stored_at: DateTime<Utc>,
}

/// Trait for durable keyed storage backends.
pub trait PersistentStore: Send + Sync {
  /// Get a record by key.
  fn get<T: Record>(&self, key: &str) -> Result<Option<StoredRecord<T>>>;

  /// Insert or replace a record.
  fn put<T: Record>(&self, value: &T) -> Result<()>;

  /// Delete a record. Returns whether it existed.
  fn delete<T: Record>(&self, key: &str) -> Result<bool>;

  /// All records of a type, ordered by key.
  fn list<T: Record>(&self) -> Result<Vec<T>>;
}

/// SQLite-based store implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open store database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory store.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("catalog-sync").join("local.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    record_type TEXT NOT NULL,
    record_key TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (record_type, record_key)
);
"#;

impl PersistentStore for SqliteStore {
  fn get<T: Record>(&self, key: &str) -> Result<Option<StoredRecord<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, stored_at FROM records WHERE record_type = ? AND record_key = ?",
        params![T::record_type(), key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {} {}: {}", T::record_type(), key, e))?;

    match row {
      Some((data, stored_at)) => {
        let value: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize {} {}: {}", T::record_type(), key, e))?;
        Ok(Some(StoredRecord {
          value,
          stored_at: parse_datetime(&stored_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put<T: Record>(&self, value: &T) -> Result<()> {
    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize record: {}", e))?;
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO records (record_type, record_key, data, stored_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![T::record_type(), value.record_key(), data],
      )
      .map_err(|e| eyre!("Failed to store record: {}", e))?;

    Ok(())
  }

  fn delete<T: Record>(&self, key: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let deleted = conn
      .execute(
        "DELETE FROM records WHERE record_type = ? AND record_key = ?",
        params![T::record_type(), key],
      )
      .map_err(|e| eyre!("Failed to delete record: {}", e))?;

    Ok(deleted > 0)
  }

  fn list<T: Record>(&self) -> Result<Vec<T>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT data FROM records WHERE record_type = ? ORDER BY record_key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map(params![T::record_type()], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query records: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read records: {}", e))?;

    rows
      .iter()
      .map(|data| {
        serde_json::from_slice(data).map_err(|e| eyre!("Failed to deserialize record: {}", e))
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
