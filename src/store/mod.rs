//! Durable local store: a versioned, transactional key-value store with
//! named collections.
//!
//! The feed uses two collections:
//! - `posts`: read cache of the last fetched list
//! - `sync-posts`: write-ahead queue of posts not yet accepted by the server
//!
//! If the store cannot be opened every operation becomes a no-op, so callers
//! tolerate absent persistence instead of failing.

mod storage;
mod traits;

pub use storage::{LocalStore, Migration, NoopStore, SqliteStore, StoreHandle};
pub use traits::StoreRecord;

use std::path::Path;

use crate::config::StoreConfig;
use crate::error::FeedResult;

/// Read cache of fetched posts
pub const POSTS: &str = "posts";
/// Write-ahead queue of deferred posts
pub const SYNC_POSTS: &str = "sync-posts";

/// Upgrade callback for the feed store. Create-if-absent, so running it
/// against any older layout is safe.
pub fn migrate(migration: &Migration<'_>) -> FeedResult<()> {
  for collection in [POSTS, SYNC_POSTS] {
    if !migration.contains(collection)? {
      migration.create_collection(collection)?;
    }
  }
  Ok(())
}

/// Open the feed store under `dir`, degrading to a no-op store on failure.
pub fn open_feed_store(dir: &Path, config: &StoreConfig) -> StoreHandle {
  StoreHandle::open_or_degrade(dir, &config.name, config.version, migrate)
}
