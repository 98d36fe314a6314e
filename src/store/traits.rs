//! Record trait for items kept in the durable local store.

use serde::{de::DeserializeOwned, Serialize};

/// Item that can be kept in a store collection.
///
/// Items are keyed by `record_id`; a second `put` with the same id replaces
/// the first (last writer wins).
pub trait StoreRecord: Send + Sync + Serialize + DeserializeOwned {
  /// Primary key within its collection
  fn record_id(&self) -> String;
}
