//! Persistent snapshot store trait and its implementations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::Cacheable;
use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// Minimal durable key-value contract for snapshot collections.
///
/// Records are grouped by collection name and identified inside it by
/// [`Cacheable::cache_key`]. Reads return records in the order they were
/// written.
pub trait SnapshotStore: Send + Sync {
  /// All records of a collection. An unknown collection is empty.
  fn get_all<T: Cacheable>(&self, collection: &str) -> Result<Vec<T>>;

  /// Remove every record of a collection.
  fn clear(&self, collection: &str) -> Result<()>;

  /// Insert records, replacing any with the same identifier.
  fn put_many<T: Cacheable>(&self, collection: &str, records: &[T]) -> Result<()>;

  /// Clear the collection and write `records` as its new generation.
  ///
  /// Implementations backed by a transactional store override this so the
  /// two steps commit together.
  fn replace<T: Cacheable>(&self, collection: &str, records: &[T]) -> Result<()> {
    self.clear(collection)?;
    self.put_many(collection, records)
  }

  /// When the collection was last written, if known.
  fn saved_at(&self, _collection: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(None)
  }
}

/// Storage implementation that doesn't persist anything.
/// Used when offline fallback is disabled - all operations are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStorage;

impl SnapshotStore for NoopStorage {
  fn get_all<T: Cacheable>(&self, _collection: &str) -> Result<Vec<T>> {
    Ok(Vec::new()) // Always empty
  }

  fn clear(&self, _collection: &str) -> Result<()> {
    Ok(())
  }

  fn put_many<T: Cacheable>(&self, _collection: &str, _records: &[T]) -> Result<()> {
    Ok(()) // Discard
  }
}

#[derive(Debug, Default)]
struct MemoryCollection {
  records: Vec<(String, Value)>,
  saved_at: Option<DateTime<Utc>>,
}

/// Snapshot store kept in process memory.
///
/// Records are held as JSON so that decoding behaves like a durable store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  collections: Mutex<HashMap<String, MemoryCollection>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Write a raw JSON value under `id`, bypassing type checks.
  pub fn insert_raw(&self, collection: &str, id: &str, value: Value) -> Result<()> {
    let mut collections = self.lock()?;
    let entry = collections.entry(collection.to_string()).or_default();
    upsert(&mut entry.records, id.to_string(), value);
    entry.saved_at = Some(Utc::now());
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryCollection>>> {
    self
      .collections
      .lock()
      .map_err(|e| CacheError::Storage(format!("Lock poisoned: {}", e)))
  }
}

fn upsert(records: &mut Vec<(String, Value)>, id: String, value: Value) {
  match records.iter_mut().find(|(existing, _)| *existing == id) {
    Some(slot) => slot.1 = value,
    None => records.push((id, value)),
  }
}

impl SnapshotStore for MemoryStorage {
  fn get_all<T: Cacheable>(&self, collection: &str) -> Result<Vec<T>> {
    let collections = self.lock()?;
    let Some(entry) = collections.get(collection) else {
      return Ok(Vec::new());
    };

    entry
      .records
      .iter()
      .map(|(id, value)| {
        serde_json::from_value(value.clone())
          .map_err(|e| CacheError::corruption(collection, format!("record '{}': {}", id, e)))
      })
      .collect()
  }

  fn clear(&self, collection: &str) -> Result<()> {
    self.lock()?.remove(collection);
    Ok(())
  }

  fn put_many<T: Cacheable>(&self, collection: &str, records: &[T]) -> Result<()> {
    let values = records
      .iter()
      .map(|r| {
        serde_json::to_value(r)
          .map(|v| (r.cache_key(), v))
          .map_err(|e| CacheError::Storage(format!("Failed to serialize record: {}", e)))
      })
      .collect::<Result<Vec<_>>>()?;

    let mut collections = self.lock()?;
    let entry = collections.entry(collection.to_string()).or_default();
    for (id, value) in values {
      upsert(&mut entry.records, id, value);
    }
    entry.saved_at = Some(Utc::now());
    Ok(())
  }

  fn replace<T: Cacheable>(&self, collection: &str, records: &[T]) -> Result<()> {
    let mut fresh = Vec::with_capacity(records.len());
    for r in records {
      let value = serde_json::to_value(r)
        .map_err(|e| CacheError::Storage(format!("Failed to serialize record: {}", e)))?;
      upsert(&mut fresh, r.cache_key(), value);
    }

    // Swap under a single lock so readers see either generation, never both.
    let mut collections = self.lock()?;
    collections.insert(
      collection.to_string(),
      MemoryCollection {
        records: fresh,
        saved_at: Some(Utc::now()),
      },
    );
    Ok(())
  }

  fn saved_at(&self, collection: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(self.lock()?.get(collection).and_then(|c| c.saved_at))
  }
}

/// SQLite-based snapshot storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the snapshot database at the default location.
  pub fn open_default() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open(&path)
  }

  /// Open (or create) the snapshot database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| CacheError::Storage(format!("Failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      CacheError::Storage(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// A throwaway database that lives as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
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
      .ok_or_else(|| CacheError::Storage("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("dashcache").join("cache.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::Storage(format!("Lock poisoned: {}", e)))
  }

  /// Run database migrations for snapshot tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(SNAPSHOT_SCHEMA)
      .map_err(|e| CacheError::Storage(format!("Failed to run cache migrations: {}", e)))
  }

  /// Overwrite the stored bytes of one record. Only useful to simulate
  /// on-disk damage.
  #[cfg(test)]
  fn tamper(&self, collection: &str, record_id: &str, data: &[u8]) -> Result<()> {
    self.lock()?.execute(
      "UPDATE snapshot_records SET data = ? WHERE collection = ? AND record_id = ?",
      params![data, collection, record_id],
    )?;
    Ok(())
  }
}

/// Schema for snapshot tables.
const SNAPSHOT_SCHEMA: &str = r#"
-- One row per record, grouped by collection (stores serialized JSON)
CREATE TABLE IF NOT EXISTS snapshot_records (
    collection TEXT NOT NULL,
    record_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    data BLOB NOT NULL,
    checksum TEXT NOT NULL,
    PRIMARY KEY (collection, record_id)
);

CREATE INDEX IF NOT EXISTS idx_snapshot_records_position
    ON snapshot_records(collection, position);

-- When each collection was last written
CREATE TABLE IF NOT EXISTS snapshot_meta (
    collection TEXT PRIMARY KEY,
    saved_at TEXT NOT NULL DEFAULT (datetime('now')),
    record_count INTEGER NOT NULL
);
"#;

/// Hex-encoded SHA-256 of a record's serialized bytes.
fn checksum(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}

fn insert_records<T: Cacheable>(
  conn: &Connection,
  collection: &str,
  records: &[T],
) -> Result<()> {
  let mut next_position: i64 = conn.query_row(
    "SELECT COALESCE(MAX(position) + 1, 0) FROM snapshot_records WHERE collection = ?",
    params![collection],
    |row| row.get(0),
  )?;

  for record in records {
    let data = serde_json::to_vec(record)
      .map_err(|e| CacheError::Storage(format!("Failed to serialize record: {}", e)))?;
    let id = record.cache_key();

    // Replacing keeps the original position of an existing record.
    let existing: Option<i64> = conn
      .query_row(
        "SELECT position FROM snapshot_records WHERE collection = ? AND record_id = ?",
        params![collection, id],
        |row| row.get(0),
      )
      .optional()?;
    let position = match existing {
      Some(p) => p,
      None => {
        next_position += 1;
        next_position - 1
      }
    };

    conn.execute(
      "INSERT OR REPLACE INTO snapshot_records (collection, record_id, position, data, checksum)
       VALUES (?, ?, ?, ?, ?)",
      params![collection, id, position, data, checksum(&data)],
    )?;
  }

  conn.execute(
    "INSERT OR REPLACE INTO snapshot_meta (collection, saved_at, record_count)
     VALUES (?, datetime('now'), (SELECT COUNT(*) FROM snapshot_records WHERE collection = ?))",
    params![collection, collection],
  )?;

  Ok(())
}

fn delete_collection(conn: &Connection, collection: &str) -> Result<()> {
  conn.execute(
    "DELETE FROM snapshot_records WHERE collection = ?",
    params![collection],
  )?;
  conn.execute(
    "DELETE FROM snapshot_meta WHERE collection = ?",
    params![collection],
  )?;
  Ok(())
}

impl SnapshotStore for SqliteStorage {
  fn get_all<T: Cacheable>(&self, collection: &str) -> Result<Vec<T>> {
    let conn = self.lock()?;

    let mut stmt = conn.prepare(
      "SELECT record_id, data, checksum FROM snapshot_records
       WHERE collection = ?
       ORDER BY position",
    )?;

    let rows: Vec<(String, Vec<u8>, String)> = stmt
      .query_map(params![collection], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })?
      .collect::<std::result::Result<_, _>>()?;

    rows
      .into_iter()
      .map(|(id, data, expected)| {
        if checksum(&data) != expected {
          return Err(CacheError::corruption(
            collection,
            format!("record '{}' failed checksum", id),
          ));
        }
        serde_json::from_slice(&data)
          .map_err(|e| CacheError::corruption(collection, format!("record '{}': {}", id, e)))
      })
      .collect()
  }

  fn clear(&self, collection: &str) -> Result<()> {
    let conn = self.lock()?;
    delete_collection(&conn, collection)
  }

  fn put_many<T: Cacheable>(&self, collection: &str, records: &[T]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    insert_records(&tx, collection, records)?;
    tx.commit()?;
    Ok(())
  }

  fn replace<T: Cacheable>(&self, collection: &str, records: &[T]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    delete_collection(&tx, collection)?;
    insert_records(&tx, collection, records)?;
    tx.commit()?;
    Ok(())
  }

  fn saved_at(&self, collection: &str) -> Result<Option<DateTime<Utc>>> {
    let conn = self.lock()?;
    let saved: Option<String> = conn
      .query_row(
        "SELECT saved_at FROM snapshot_meta WHERE collection = ?",
        params![collection],
        |row| row.get(0),
      )
      .optional()?;

    saved.as_deref().map(parse_datetime).transpose()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| CacheError::Storage(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::{Deserialize, Serialize};
  use tempfile::TempDir;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Film {
    id: String,
    title: String,
  }

  impl Cacheable for Film {
    fn cache_key(&self) -> String {
      self.id.clone()
    }
  }

  fn film(id: &str, title: &str) -> Film {
    Film {
      id: id.to_string(),
      title: title.to_string(),
    }
  }

  #[test]
  fn test_sqlite_round_trip_preserves_order() {
    let storage = SqliteStorage::open_in_memory().expect("open");
    let films = vec![film("b", "Spirited Away"), film("a", "Totoro")];

    storage.put_many("movies", &films).expect("put");
    let loaded: Vec<Film> = storage.get_all("movies").expect("get");

    assert_eq!(loaded, films);
  }

  #[test]
  fn test_sqlite_unknown_collection_is_empty() {
    let storage = SqliteStorage::open_in_memory().expect("open");
    let loaded: Vec<Film> = storage.get_all("nothing").expect("get");
    assert!(loaded.is_empty());
    assert!(storage.saved_at("nothing").expect("saved_at").is_none());
  }

  #[test]
  fn test_sqlite_replace_drops_previous_generation() {
    let storage = SqliteStorage::open_in_memory().expect("open");
    storage
      .put_many("movies", &[film("1", "Old"), film("2", "Stale")])
      .expect("put");

    storage.replace("movies", &[film("3", "New")]).expect("replace");

    let loaded: Vec<Film> = storage.get_all("movies").expect("get");
    assert_eq!(loaded, vec![film("3", "New")]);
    assert!(storage.saved_at("movies").expect("saved_at").is_some());
  }

  #[test]
  fn test_sqlite_put_many_upserts_by_id() {
    let storage = SqliteStorage::open_in_memory().expect("open");
    storage
      .put_many("movies", &[film("1", "First"), film("2", "Second")])
      .expect("put");
    storage.put_many("movies", &[film("1", "Renamed")]).expect("put");

    let loaded: Vec<Film> = storage.get_all("movies").expect("get");
    assert_eq!(loaded, vec![film("1", "Renamed"), film("2", "Second")]);
  }

  #[test]
  fn test_sqlite_collections_are_isolated() {
    let storage = SqliteStorage::open_in_memory().expect("open");
    storage.put_many("movies", &[film("1", "A")]).expect("put");
    storage.put_many("other", &[film("9", "Z")]).expect("put");

    storage.clear("movies").expect("clear");

    let movies: Vec<Film> = storage.get_all("movies").expect("get");
    let other: Vec<Film> = storage.get_all("other").expect("get");
    assert!(movies.is_empty());
    assert_eq!(other.len(), 1);
  }

  #[test]
  fn test_sqlite_detects_tampered_record() {
    let storage = SqliteStorage::open_in_memory().expect("open");
    storage.put_many("movies", &[film("1", "A")]).expect("put");
    storage
      .tamper("movies", "1", br#"{"id":"1","title":"B"}"#)
      .expect("tamper");

    let err = storage.get_all::<Film>("movies").unwrap_err();
    assert!(matches!(err, CacheError::CacheCorruption { .. }));
  }

  #[test]
  fn test_sqlite_persists_across_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open(&path).expect("open");
      storage.replace("movies", &[film("1", "Kept")]).expect("replace");
    }

    let storage = SqliteStorage::open(&path).expect("reopen");
    let loaded: Vec<Film> = storage.get_all("movies").expect("get");
    assert_eq!(loaded, vec![film("1", "Kept")]);
  }

  #[test]
  fn test_memory_storage_reports_undecodable_record() {
    let storage = MemoryStorage::new();
    storage
      .insert_raw("movies", "1", serde_json::json!({"id": 1}))
      .expect("insert");

    let err = storage.get_all::<Film>("movies").unwrap_err();
    assert!(matches!(err, CacheError::CacheCorruption { .. }));
  }

  #[test]
  fn test_memory_storage_replace() {
    let storage = MemoryStorage::new();
    storage.put_many("movies", &[film("1", "A")]).expect("put");
    storage.replace("movies", &[film("2", "B")]).expect("replace");

    let loaded: Vec<Film> = storage.get_all("movies").expect("get");
    assert_eq!(loaded, vec![film("2", "B")]);
  }

  #[test]
  fn test_noop_storage_always_empty() {
    let storage = NoopStorage;
    storage.put_many("movies", &[film("1", "A")]).expect("put");
    let loaded: Vec<Film> = storage.get_all("movies").expect("get");
    assert!(loaded.is_empty());
  }
}
