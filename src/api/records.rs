//! Store keys for feed types.

use crate::store::StoreRecord;

use super::types::{PendingWrite, Post};

impl StoreRecord for Post {
  fn record_id(&self) -> String {
    self.id.clone()
  }
}

impl StoreRecord for PendingWrite {
  fn record_id(&self) -> String {
    self.id.clone()
  }
}
