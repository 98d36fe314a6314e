use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{PendingWrite, Post, PostDraft, PostsApi};
use crate::error::{FeedError, FeedResult};
use crate::store::{LocalStore, StoreHandle, SYNC_POSTS};

use super::registry::SyncRegistry;

/// What became of a submitted post
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
  /// The server accepted the post
  Created(Post),
  /// Saved for a later sync, carrying the local id
  Queued(String),
}

/// Result of one replay of the queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
  pub confirmed: usize,
  pub failed: usize,
}

/// Owns the write-ahead queue of posts.
///
/// Without a sync registry the platform has no retry trigger, so nothing is
/// ever queued and failures go straight back to the caller.
pub struct SyncCoordinator {
  store: Arc<StoreHandle>,
  api: Arc<dyn PostsApi>,
  registry: Option<SyncRegistry>,
  tag: String,
}

impl SyncCoordinator {
  pub fn new(
    store: Arc<StoreHandle>,
    api: Arc<dyn PostsApi>,
    registry: Option<SyncRegistry>,
    tag: impl Into<String>,
  ) -> Self {
    Self {
      store,
      api,
      registry,
      tag: tag.into(),
    }
  }

  pub fn tag(&self) -> &str {
    &self.tag
  }

  pub fn supports_background_sync(&self) -> bool {
    self.registry.is_some()
  }

  /// Try the network; queue the post if it cannot be delivered now.
  pub async fn submit(&self, draft: PostDraft) -> FeedResult<SubmitOutcome> {
    draft.validate()?;
    let pending = draft.into_pending();

    match self.api.create_post(&pending).await {
      Ok(post) => {
        info!(id = %post.id, "Post created");
        Ok(SubmitOutcome::Created(post))
      }
      Err(e) if e.is_network() && self.registry.is_some() => {
        warn!(id = %pending.id, error = %e, "Post not delivered, queueing");
        self.enqueue(pending)
      }
      Err(e) => Err(e),
    }
  }

  /// Queue the post without trying the network first. Falls back to a
  /// direct attempt when background sync is unavailable.
  pub async fn defer(&self, draft: PostDraft) -> FeedResult<SubmitOutcome> {
    if self.registry.is_none() {
      return self.submit(draft).await;
    }
    draft.validate()?;
    self.enqueue(draft.into_pending())
  }

  fn enqueue(&self, pending: PendingWrite) -> FeedResult<SubmitOutcome> {
    if !self.store.is_persistent() {
      warn!(id = %pending.id, "No local persistence, queued post will not survive a restart");
    }
    self.store.put(SYNC_POSTS, &pending)?;
    if let Some(registry) = &self.registry {
      registry.register(&self.tag)?;
    }
    info!(id = %pending.id, tag = %self.tag, "Post queued for sync");
    Ok(SubmitOutcome::Queued(pending.id))
  }

  pub fn pending(&self) -> FeedResult<Vec<PendingWrite>> {
    self.store.get_all(SYNC_POSTS)
  }

  /// Submit every queued post concurrently. Confirmed posts leave the
  /// queue, failed ones stay for the next trigger.
  pub async fn replay(&self) -> FeedResult<ReplayReport> {
    let queued = self.pending()?;
    debug!(count = queued.len(), "Replaying queued posts");

    let results = join_all(queued.iter().map(|item| async move {
      let result = self.api.create_post(item).await;
      (item, result)
    }))
    .await;

    let mut report = ReplayReport::default();
    for (item, result) in results {
      match result {
        Ok(post) => {
          info!(id = %item.id, server_id = %post.id, "Queued post delivered");
          // The server has it; a failed delete must not count as a failure
          if let Err(e) = self.store.delete(SYNC_POSTS, &item.id) {
            warn!(id = %item.id, error = %e, "Delivered post left in queue");
          }
          report.confirmed += 1;
        }
        Err(e) => {
          warn!(id = %item.id, error = %e, "Queued post still pending");
          report.failed += 1;
        }
      }
    }

    Ok(report)
  }

  /// Sync handler. Resolves only when nothing of this tag is left to send.
  pub async fn on_sync(&self, tag: &str) -> FeedResult<ReplayReport> {
    if tag != self.tag {
      debug!(tag, "Ignoring unknown sync tag");
      return Ok(ReplayReport::default());
    }

    let report = self.replay().await?;
    if report.failed > 0 {
      return Err(FeedError::SyncIncomplete(report.failed));
    }
    Ok(report)
  }
}
