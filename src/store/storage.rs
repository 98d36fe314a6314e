//! Local store trait, SQLite implementation and the no-op fallback.

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::traits::StoreRecord;
use crate::error::{FeedError, FeedResult};

/// Trait for local store backends.
///
/// Every mutation runs in its own transaction scoped to one collection and
/// is durable once the call returns.
pub trait LocalStore: Send + Sync {
  /// Insert or replace an item, keyed by its record id.
  fn put<T: StoreRecord>(&self, collection: &str, item: &T) -> FeedResult<()>;

  /// All items of a collection in key order.
  fn get_all<T: StoreRecord>(&self, collection: &str) -> FeedResult<Vec<T>>;

  /// Remove every item of a collection.
  fn clear(&self, collection: &str) -> FeedResult<()>;

  /// Remove one item. Deleting an absent id is not an error.
  fn delete(&self, collection: &str, id: &str) -> FeedResult<()>;
}

/// Store used when persistence is unavailable - all operations are no-ops.
pub struct NoopStore;

impl LocalStore for NoopStore {
  fn put<T: StoreRecord>(&self, _collection: &str, _item: &T) -> FeedResult<()> {
    Ok(()) // Discard
  }

  fn get_all<T: StoreRecord>(&self, _collection: &str) -> FeedResult<Vec<T>> {
    Ok(Vec::new()) // Always empty
  }

  fn clear(&self, _collection: &str) -> FeedResult<()> {
    Ok(())
  }

  fn delete(&self, _collection: &str, _id: &str) -> FeedResult<()> {
    Ok(())
  }
}

/// Upgrade handle passed to the migrate callback.
///
/// The callback runs inside the upgrade transaction, once per version bump.
pub struct Migration<'a> {
  conn: &'a Connection,
  /// Version found on disk (0 for a new store)
  pub old_version: u32,
  /// Version being opened
  pub new_version: u32,
}

impl Migration<'_> {
  /// Whether a collection already exists.
  pub fn contains(&self, collection: &str) -> FeedResult<bool> {
    collection_exists(self.conn, collection)
  }

  /// Create a collection. Creating an existing one is a no-op.
  pub fn create_collection(&self, collection: &str) -> FeedResult<()> {
    self.conn.execute(
      "INSERT OR IGNORE INTO store_collections (name) VALUES (?)",
      params![collection],
    )?;
    Ok(())
  }
}

/// Schema for store tables. The schema version lives in `user_version`.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS store_collections (
    name TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS store_records (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (collection, id),
    FOREIGN KEY (collection) REFERENCES store_collections(name)
);
"#;

/// SQLite-backed local store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  name: String,
  version: u32,
}

impl SqliteStore {
  /// Open `<dir>/<name>.db` at `version`, running `migrate` if the file is
  /// older.
  pub fn open<F>(dir: &Path, name: &str, version: u32, migrate: F) -> FeedResult<Self>
  where
    F: FnOnce(&Migration<'_>) -> FeedResult<()>,
  {
    std::fs::create_dir_all(dir).map_err(|e| {
      FeedError::PersistenceUnavailable(format!("cannot create {}: {}", dir.display(), e))
    })?;

    let path = dir.join(format!("{}.db", name));
    let conn = Connection::open(&path).map_err(|e| {
      FeedError::PersistenceUnavailable(format!("cannot open {}: {}", path.display(), e))
    })?;

    Self::from_connection(conn, name, version, migrate)
  }

  /// Private in-memory store, used by tests.
  pub fn open_in_memory<F>(name: &str, version: u32, migrate: F) -> FeedResult<Self>
  where
    F: FnOnce(&Migration<'_>) -> FeedResult<()>,
  {
    Self::from_connection(Connection::open_in_memory()?, name, version, migrate)
  }

  fn from_connection<F>(mut conn: Connection, name: &str, version: u32, migrate: F) -> FeedResult<Self>
  where
    F: FnOnce(&Migration<'_>) -> FeedResult<()>,
  {
    conn.execute_batch(STORE_SCHEMA)?;

    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current > version {
      return Err(FeedError::PersistenceUnavailable(format!(
        "store '{}' is at version {}, cannot open as {}",
        name, current, version
      )));
    }

    if current < version {
      let tx = conn.transaction()?;
      migrate(&Migration {
        conn: &tx,
        old_version: current,
        new_version: version,
      })?;
      tx.pragma_update(None, "user_version", version)?;
      tx.commit()?;
      info!(store = name, from = current, to = version, "Local store upgraded");
    }

    Ok(Self {
      conn: Mutex::new(conn),
      name: name.to_string(),
      version,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn version(&self) -> u32 {
    self.version
  }

  /// Run raw SQL against the store, for tests that need to break it.
  #[cfg(test)]
  pub(crate) fn execute_batch(&self, sql: &str) -> FeedResult<()> {
    self.lock()?.execute_batch(sql)?;
    Ok(())
  }

  fn lock(&self) -> FeedResult<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| FeedError::LockPoisoned(e.to_string()))
  }
}

fn collection_exists(conn: &Connection, collection: &str) -> FeedResult<bool> {
  let exists: bool = conn.query_row(
    "SELECT EXISTS(SELECT 1 FROM store_collections WHERE name = ?)",
    params![collection],
    |row| row.get(0),
  )?;
  Ok(exists)
}

fn ensure_collection(conn: &Connection, collection: &str) -> FeedResult<()> {
  if collection_exists(conn, collection)? {
    Ok(())
  } else {
    Err(FeedError::UnknownCollection(collection.to_string()))
  }
}

impl LocalStore for SqliteStore {
  fn put<T: StoreRecord>(&self, collection: &str, item: &T) -> FeedResult<()> {
    let data = serde_json::to_vec(item)?;
    let id = item.record_id();

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    ensure_collection(&tx, collection)?;
    tx.execute(
      "INSERT OR REPLACE INTO store_records (collection, id, data) VALUES (?, ?, ?)",
      params![collection, id, data],
    )?;
    tx.commit()?;

    debug!(collection, id = %id, "Stored record");
    Ok(())
  }

  fn get_all<T: StoreRecord>(&self, collection: &str) -> FeedResult<Vec<T>> {
    let rows: Vec<(String, Vec<u8>)> = {
      let conn = self.lock()?;
      ensure_collection(&conn, collection)?;
      let mut stmt =
        conn.prepare("SELECT id, data FROM store_records WHERE collection = ? ORDER BY id")?;
      let rows = stmt
        .query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
      rows
    };

    let items = rows
      .into_iter()
      .filter_map(|(id, data)| match serde_json::from_slice(&data) {
        Ok(item) => Some(item),
        Err(e) => {
          warn!(collection, id = %id, error = %e, "Skipping unreadable record");
          None
        }
      })
      .collect();

    Ok(items)
  }

  fn clear(&self, collection: &str) -> FeedResult<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    ensure_collection(&tx, collection)?;
    let removed = tx.execute(
      "DELETE FROM store_records WHERE collection = ?",
      params![collection],
    )?;
    tx.commit()?;

    debug!(collection, removed, "Cleared collection");
    Ok(())
  }

  fn delete(&self, collection: &str, id: &str) -> FeedResult<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    ensure_collection(&tx, collection)?;
    tx.execute(
      "DELETE FROM store_records WHERE collection = ? AND id = ?",
      params![collection, id],
    )?;
    tx.commit()?;

    debug!(collection, id, "Deleted record");
    Ok(())
  }
}

/// Opened store: persistent, or degraded to no-ops.
pub enum StoreHandle {
  Persistent(SqliteStore),
  Unavailable(NoopStore),
}

impl StoreHandle {
  /// Open a SQLite store, falling back to [`NoopStore`] if that fails.
  pub fn open_or_degrade<F>(dir: &Path, name: &str, version: u32, migrate: F) -> Self
  where
    F: FnOnce(&Migration<'_>) -> FeedResult<()>,
  {
    match SqliteStore::open(dir, name, version, migrate) {
      Ok(store) => StoreHandle::Persistent(store),
      Err(e) => {
        warn!(store = name, error = %e, "Local store unavailable, continuing without persistence");
        StoreHandle::Unavailable(NoopStore)
      }
    }
  }

  pub fn is_persistent(&self) -> bool {
    matches!(self, StoreHandle::Persistent(_))
  }
}

impl LocalStore for StoreHandle {
  fn put<T: StoreRecord>(&self, collection: &str, item: &T) -> FeedResult<()> {
    match self {
      StoreHandle::Persistent(store) => store.put(collection, item),
      StoreHandle::Unavailable(store) => store.put(collection, item),
    }
  }

  fn get_all<T: StoreRecord>(&self, collection: &str) -> FeedResult<Vec<T>> {
    match self {
      StoreHandle::Persistent(store) => store.get_all(collection),
      StoreHandle::Unavailable(store) => store.get_all(collection),
    }
  }

  fn clear(&self, collection: &str) -> FeedResult<()> {
    match self {
      StoreHandle::Persistent(store) => store.clear(collection),
      StoreHandle::Unavailable(store) => store.clear(collection),
    }
  }

  fn delete(&self, collection: &str, id: &str) -> FeedResult<()> {
    match self {
      StoreHandle::Persistent(store) => store.delete(collection, id),
      StoreHandle::Unavailable(store) => store.delete(collection, id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    id: String,
    title: String,
  }

  impl StoreRecord for Note {
    fn record_id(&self) -> String {
      self.id.clone()
    }
  }

  fn note(id: &str, title: &str) -> Note {
    Note {
      id: id.to_string(),
      title: title.to_string(),
    }
  }

  fn store() -> SqliteStore {
    SqliteStore::open_in_memory("test", 1, |m| m.create_collection("notes")).unwrap()
  }

  #[test]
  fn test_put_is_last_writer_wins() {
    let store = store();
    store.put("notes", &note("b", "first")).unwrap();
    store.put("notes", &note("a", "other")).unwrap();
    store.put("notes", &note("b", "second")).unwrap();

    let all: Vec<Note> = store.get_all("notes").unwrap();
    assert_eq!(all, vec![note("a", "other"), note("b", "second")]);
  }

  #[test]
  fn test_clear_and_delete() {
    let store = store();
    store.put("notes", &note("a", "x")).unwrap();
    store.put("notes", &note("b", "y")).unwrap();

    store.delete("notes", "a").unwrap();
    store.delete("notes", "missing").unwrap();
    let all: Vec<Note> = store.get_all("notes").unwrap();
    assert_eq!(all, vec![note("b", "y")]);

    store.clear("notes").unwrap();
    let all: Vec<Note> = store.get_all("notes").unwrap();
    assert!(all.is_empty());
  }

  #[test]
  fn test_unknown_collection_is_rejected() {
    let store = store();
    let err = store.put("nope", &note("a", "x")).unwrap_err();
    assert!(matches!(err, FeedError::UnknownCollection(_)));
  }

  #[test]
  fn test_migrate_runs_once_per_version_bump() {
    let dir = tempfile::tempdir().unwrap();
    let calls = AtomicU32::new(0);
    let migrate = |m: &Migration<'_>| -> FeedResult<()> {
      calls.fetch_add(1, Ordering::SeqCst);
      if !m.contains("notes")? {
        m.create_collection("notes")?;
      }
      Ok(())
    };

    {
      let store = SqliteStore::open(dir.path(), "db", 1, migrate).unwrap();
      store.put("notes", &note("a", "kept")).unwrap();
    }
    SqliteStore::open(dir.path(), "db", 1, migrate).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut seen = None;
    let store = SqliteStore::open(dir.path(), "db", 2, |m| {
      seen = Some((m.old_version, m.new_version));
      migrate(m)
    })
    .unwrap();
    assert_eq!(seen, Some((1, 2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Upgrade kept existing data
    let all: Vec<Note> = store.get_all("notes").unwrap();
    assert_eq!(all, vec![note("a", "kept")]);
  }

  #[test]
  fn test_unopenable_store_degrades_to_noop() {
    let dir = tempfile::tempdir().unwrap();
    SqliteStore::open(dir.path(), "db", 3, |m| m.create_collection("notes")).unwrap();

    // Downgrade cannot be opened
    let handle = StoreHandle::open_or_degrade(dir.path(), "db", 1, |m| m.create_collection("notes"));
    assert!(!handle.is_persistent());

    handle.put("notes", &note("a", "x")).unwrap();
    let all: Vec<Note> = handle.get_all("notes").unwrap();
    assert!(all.is_empty());
  }
}
