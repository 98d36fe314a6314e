//! Error taxonomy shared by the offline layer.

use thiserror::Error;

/// Errors raised by the store, cache strategies, sync and notification flows.
///
/// Strategy code recovers locally wherever a fallback exists; whatever
/// reaches a caller as `Err` is a failed load from its point of view.
#[derive(Debug, Error)]
pub enum FeedError {
  /// The local store could not be opened. Callers degrade to no persistence.
  #[error("local persistence unavailable: {0}")]
  PersistenceUnavailable(String),

  /// Fetch rejected at the transport level, or a non-success status where
  /// the strategy treats it as a failure.
  #[error("network failure for {url}: {reason}")]
  NetworkFailure { url: String, reason: String },

  /// No cache entry matched the request.
  #[error("no cache entry for {0}")]
  CacheMiss(String),

  /// The user declined notification permission.
  #[error("notification permission denied")]
  SubscriptionDenied,

  /// The push service could not produce a subscription for this device.
  #[error("push subscription failed: {0}")]
  SubscribeFailed(String),

  /// The backend rejected the subscription.
  #[error("subscription registration failed: {0}")]
  SubscriptionRegistrationFailed(String),

  /// A push payload that is not the expected JSON document.
  #[error("malformed push payload: {0}")]
  MalformedPushPayload(String),

  /// Some queued writes were not accepted; they stay queued for the next
  /// sync.
  #[error("{0} queued posts could not be submitted")]
  SyncIncomplete(usize),

  /// Precache batch failed; nothing was stored.
  #[error("install failed: {0}")]
  Install(String),

  #[error("unknown collection '{0}'")]
  UnknownCollection(String),

  #[error("response body already used")]
  BodyUsed,

  #[error("invalid post: {0}")]
  InvalidDraft(String),

  #[error("invalid url: {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("lock poisoned: {0}")]
  LockPoisoned(String),
}

impl FeedError {
  pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
    FeedError::NetworkFailure {
      url: url.into(),
      reason: reason.to_string(),
    }
  }

  /// True for failures a strategy may recover from with a cached fallback.
  pub fn is_network(&self) -> bool {
    matches!(self, FeedError::NetworkFailure { .. })
  }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
