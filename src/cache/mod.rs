//! Named HTTP cache partitions.
//!
//! Two partitions are live at any time:
//! - static: the app shell, filled once at install and never trimmed
//! - dynamic: responses picked up while browsing, trimmed oldest-first
//!
//! Both names embed a version; activation deletes every other name.

mod names;
mod storage;

pub use names::CacheNames;
pub use storage::{Cache, CacheStorage};
