use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use tracing::debug;

use crate::db::Database;
use crate::error::FeedResult;

/// Background-sync registrations that still wait for their handler to
/// succeed.
#[derive(Clone)]
pub struct SyncRegistry {
  db: Arc<Database>,
}

impl SyncRegistry {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Register a tag. Registering a pending tag again keeps its place in
  /// line but bumps its generation, so a handler already running for the
  /// older generation cannot complete it.
  pub fn register(&self, tag: &str) -> FeedResult<()> {
    self.db.conn()?.execute(
      "INSERT INTO sync_registrations (tag) VALUES (?)
       ON CONFLICT(tag) DO UPDATE SET generation = generation + 1",
      params![tag],
    )?;
    debug!(tag, "Registered sync");
    Ok(())
  }

  /// Current generation of a pending tag
  pub fn generation(&self, tag: &str) -> FeedResult<Option<i64>> {
    let generation = self
      .db
      .conn()?
      .query_row(
        "SELECT generation FROM sync_registrations WHERE tag = ?",
        params![tag],
        |row| row.get(0),
      )
      .optional()?;
    Ok(generation)
  }

  /// Pending tags, oldest registration first
  pub fn pending(&self) -> FeedResult<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt =
      conn.prepare("SELECT tag FROM sync_registrations ORDER BY registered_at, rowid")?;
    let tags = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(tags)
  }

  pub fn is_pending(&self, tag: &str) -> FeedResult<bool> {
    let exists: bool = self.db.conn()?.query_row(
      "SELECT EXISTS(SELECT 1 FROM sync_registrations WHERE tag = ?)",
      params![tag],
      |row| row.get(0),
    )?;
    Ok(exists)
  }

  /// Drop a registration once a handler for `generation` resolved
  /// successfully. Returns `false` and keeps the registration if the tag was
  /// registered again in the meantime.
  pub fn complete(&self, tag: &str, generation: i64) -> FeedResult<bool> {
    let removed = self.db.conn()?.execute(
      "DELETE FROM sync_registrations WHERE tag = ? AND generation = ?",
      params![tag, generation],
    )?;
    if removed > 0 {
      debug!(tag, "Sync completed");
    } else {
      debug!(tag, generation, "Tag registered again during sync, keeping it");
    }
    Ok(removed > 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::memory_db;

  #[test]
  fn test_register_is_idempotent() {
    let registry = SyncRegistry::new(memory_db());
    registry.register("sync-new-posts").unwrap();
    registry.register("sync-new-posts").unwrap();
    registry.register("other").unwrap();

    assert_eq!(registry.pending().unwrap(), vec!["sync-new-posts", "other"]);
  }

  #[test]
  fn test_complete_removes_registration() {
    let registry = SyncRegistry::new(memory_db());
    registry.register("sync-new-posts").unwrap();
    assert!(registry.is_pending("sync-new-posts").unwrap());

    let generation = registry.generation("sync-new-posts").unwrap().unwrap();
    assert!(registry.complete("sync-new-posts", generation).unwrap());
    assert!(!registry.is_pending("sync-new-posts").unwrap());
    assert!(registry.pending().unwrap().is_empty());
    assert_eq!(registry.generation("sync-new-posts").unwrap(), None);
  }

  #[test]
  fn test_registration_during_sync_survives_completion() {
    let registry = SyncRegistry::new(memory_db());
    registry.register("sync-new-posts").unwrap();
    let seen = registry.generation("sync-new-posts").unwrap().unwrap();

    // Another post is queued while the handler for `seen` runs
    registry.register("sync-new-posts").unwrap();

    assert!(!registry.complete("sync-new-posts", seen).unwrap());
    assert_eq!(registry.pending().unwrap(), vec!["sync-new-posts"]);

    let current = registry.generation("sync-new-posts").unwrap().unwrap();
    assert!(registry.complete("sync-new-posts", current).unwrap());
    assert!(registry.pending().unwrap().is_empty());
  }
}
