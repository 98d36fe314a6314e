use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::api::PostsApi;
use crate::config::NotificationConfig;
use crate::error::{FeedError, FeedResult};

use super::platform::{Clients, Notifier, Permission, PermissionPrompt, PushManager};
use super::push::{decode_vapid_key, Notification, PushMessage, CONFIRM_ACTION};

/// Where the device stands in the subscription flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
  Unasked,
  Requesting,
  /// Terminal: the user declined and will not be asked again
  Denied,
  Granted,
  Subscribing,
  Subscribed,
  SubscribeFailed(String),
}

/// What a notification click led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  Dismissed,
  /// A visible window was navigated and focused
  Focused { client: String, url: String },
  Opened { url: String },
}

/// Platform handles the reconciler works through
pub struct NotificationPlatform {
  pub prompt: Arc<dyn PermissionPrompt>,
  pub push: Arc<dyn PushManager>,
  pub notifier: Arc<dyn Notifier>,
  pub clients: Arc<dyn Clients>,
}

/// Drives the push subscription lifecycle and turns push deliveries and
/// notification interactions into user-visible effects.
pub struct NotificationReconciler {
  platform: NotificationPlatform,
  api: Arc<dyn PostsApi>,
  vapid_public_key: String,
  options: NotificationConfig,
  state: Mutex<SubscriptionState>,
}

impl NotificationReconciler {
  pub fn new(
    platform: NotificationPlatform,
    api: Arc<dyn PostsApi>,
    vapid_public_key: impl Into<String>,
    options: NotificationConfig,
  ) -> Self {
    Self {
      platform,
      api,
      vapid_public_key: vapid_public_key.into(),
      options,
      state: Mutex::new(SubscriptionState::Unasked),
    }
  }

  pub fn state(&self) -> SubscriptionState {
    self.lock_state().clone()
  }

  fn lock_state(&self) -> std::sync::MutexGuard<'_, SubscriptionState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn transition(&self, next: SubscriptionState) {
    let mut state = self.lock_state();
    debug!(from = ?state, to = ?next, "Subscription state");
    *state = next;
  }

  /// Run on an explicit user gesture: ask for permission, then subscribe
  /// and register with the backend.
  pub async fn request_and_subscribe(&self) -> FeedResult<SubscriptionState> {
    if self.state() == SubscriptionState::Denied {
      return Err(FeedError::SubscriptionDenied);
    }

    self.transition(SubscriptionState::Requesting);
    match self.platform.prompt.request_permission().await {
      Ok(Permission::Granted) => self.transition(SubscriptionState::Granted),
      Ok(Permission::Denied) => {
        info!("Notification permission denied");
        self.transition(SubscriptionState::Denied);
        return Err(FeedError::SubscriptionDenied);
      }
      Ok(Permission::Default) => {
        info!("Notification permission not decided");
        self.transition(SubscriptionState::Unasked);
        return Ok(SubscriptionState::Unasked);
      }
      Err(e) => {
        self.transition(SubscriptionState::Unasked);
        return Err(e);
      }
    }

    if let Some(existing) = self.platform.push.get_subscription().await? {
      // Kept from an earlier run whose registration may have been rejected
      debug!("Existing push subscription kept, registering it again");
      self.transition(SubscriptionState::Subscribing);
      if let Err(e) = self.api.register_subscription(&existing).await {
        warn!(error = %e, "Registering existing subscription failed");
        self.transition(SubscriptionState::SubscribeFailed(e.to_string()));
        return Err(e);
      }
      self.transition(SubscriptionState::Subscribed);
      return Ok(SubscriptionState::Subscribed);
    }

    self.transition(SubscriptionState::Subscribing);
    if let Err(e) = self.subscribe().await {
      warn!(error = %e, "Push subscription failed");
      self.transition(SubscriptionState::SubscribeFailed(e.to_string()));
      return Err(e);
    }
    self.transition(SubscriptionState::Subscribed);

    let confirmation = Notification::subscribed(&self.options);
    if let Err(e) = self.platform.notifier.show(&confirmation).await {
      warn!(error = %e, "Failed to show confirmation");
    }
    Ok(SubscriptionState::Subscribed)
  }

  async fn subscribe(&self) -> FeedResult<()> {
    let key = decode_vapid_key(&self.vapid_public_key)?;
    let subscription = self.platform.push.subscribe(&key).await?;
    self.api.register_subscription(&subscription).await?;
    info!(endpoint = %subscription.endpoint, "Subscription registered");
    Ok(())
  }

  /// Show a notification for a push delivery. A missing or unreadable
  /// payload shows the default message.
  pub async fn on_push(&self, payload: Option<&[u8]>) -> FeedResult<Notification> {
    let message = PushMessage::parse(payload);
    let notification = Notification::from_push(&message, &self.options);
    self.platform.notifier.show(&notification).await?;
    Ok(notification)
  }

  pub async fn on_click(
    &self,
    notification: &Notification,
    action: Option<&str>,
  ) -> FeedResult<ClickOutcome> {
    if action == Some(CONFIRM_ACTION) {
      self.platform.notifier.close(notification).await?;
      return Ok(ClickOutcome::Dismissed);
    }

    let opened = self.open_target(notification.target_url()).await;

    // Dismissed whether or not a window could be reached
    self.platform.notifier.close(notification).await?;
    opened
  }

  async fn open_target(&self, url: &str) -> FeedResult<ClickOutcome> {
    let url = url.to_string();
    let clients = self.platform.clients.match_all().await?;
    match clients.into_iter().find(|c| c.visible) {
      Some(client) => {
        self.platform.clients.navigate(&client.id, &url).await?;
        self.platform.clients.focus(&client.id).await?;
        Ok(ClickOutcome::Focused { client: client.id, url })
      }
      None => {
        self.platform.clients.open_window(&url).await?;
        Ok(ClickOutcome::Opened { url })
      }
    }
  }

  pub fn on_close(&self, notification: &Notification) {
    debug!(title = %notification.title, "Notification dismissed");
  }
}
