pub mod schema;

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{FeedError, FeedResult};

/// Connection wrapper for the platform database
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database file at `path`
  pub fn open(path: &Path) -> FeedResult<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        FeedError::PersistenceUnavailable(format!("cannot create {}: {}", parent.display(), e))
      })?;
    }

    let conn = Connection::open(path)?;
    Self::from_connection(conn)
  }

  /// Private database, used by tests
  pub fn open_in_memory() -> FeedResult<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> FeedResult<Self> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    Ok(db)
  }

  fn run_migrations(&self) -> FeedResult<()> {
    self.conn()?.execute_batch(schema::SCHEMA)?;
    Ok(())
  }

  /// Lock the connection for one unit of work
  pub fn conn(&self) -> FeedResult<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| FeedError::LockPoisoned(e.to_string()))
  }

  /// Read a platform setting
  pub fn get_state(&self, key: &str) -> FeedResult<Option<String>> {
    let conn = self.conn()?;
    let value = conn
      .query_row(
        "SELECT value FROM platform_state WHERE key = ?",
        [key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  /// Write a platform setting
  pub fn set_state(&self, key: &str, value: &str) -> FeedResult<()> {
    self.conn()?.execute(
      "INSERT OR REPLACE INTO platform_state (key, value) VALUES (?, ?)",
      [key, value],
    )?;
    Ok(())
  }
}
