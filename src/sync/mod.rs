//! Deferred writes and background sync.
//!
//! A post that cannot be delivered is written to the `sync-posts` queue and a
//! sync registration is recorded under a fixed tag. When connectivity comes
//! back the registration fires, the queue is replayed, and the registration
//! is dropped only once every queued post was accepted.

mod connectivity;
mod coordinator;
mod registry;

pub use connectivity::{spawn_watcher, ConnectivityProbe};
pub use coordinator::{ReplayReport, SubmitOutcome, SyncCoordinator};
pub use registry::SyncRegistry;
