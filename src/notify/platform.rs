//! Notification platform seams and their terminal implementations.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::api::{Subscription, SubscriptionKeys};
use crate::config::PushConfig;
use crate::db::Database;
use crate::error::{FeedError, FeedResult};

use super::push::Notification;

const PERMISSION_KEY: &str = "notification_permission";
const SUBSCRIPTION_KEY: &str = "push_subscription";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  /// Not decided yet; asking again is allowed
  Default,
  Granted,
  Denied,
}

impl Permission {
  fn as_str(&self) -> &'static str {
    match self {
      Permission::Default => "default",
      Permission::Granted => "granted",
      Permission::Denied => "denied",
    }
  }

  fn parse(s: &str) -> Self {
    match s {
      "granted" => Permission::Granted,
      "denied" => Permission::Denied,
      _ => Permission::Default,
    }
  }
}

#[async_trait]
pub trait PermissionPrompt: Send + Sync {
  async fn request_permission(&self) -> FeedResult<Permission>;
}

#[async_trait]
pub trait PushManager: Send + Sync {
  async fn get_subscription(&self) -> FeedResult<Option<Subscription>>;

  async fn subscribe(&self, application_server_key: &[u8]) -> FeedResult<Subscription>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn show(&self, notification: &Notification) -> FeedResult<()>;

  async fn close(&self, notification: &Notification) -> FeedResult<()>;
}

/// An open window of the app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
  pub id: String,
  pub url: String,
  pub visible: bool,
}

#[async_trait]
pub trait Clients: Send + Sync {
  async fn match_all(&self) -> FeedResult<Vec<ClientWindow>>;

  async fn navigate(&self, id: &str, url: &str) -> FeedResult<()>;

  async fn focus(&self, id: &str) -> FeedResult<()>;

  async fn open_window(&self, url: &str) -> FeedResult<()>;
}

/// Asks on the terminal and remembers a final answer, like a browser does.
pub struct StdinPrompt {
  db: Arc<Database>,
  origin: String,
}

impl StdinPrompt {
  pub fn new(db: Arc<Database>, origin: impl Into<String>) -> Self {
    Self {
      db,
      origin: origin.into(),
    }
  }
}

#[async_trait]
impl PermissionPrompt for StdinPrompt {
  async fn request_permission(&self) -> FeedResult<Permission> {
    let stored = self
      .db
      .get_state(PERMISSION_KEY)?
      .map(|s| Permission::parse(&s))
      .unwrap_or(Permission::Default);
    if stored != Permission::Default {
      debug!(permission = stored.as_str(), "Permission already decided");
      return Ok(stored);
    }

    let mut stdout = tokio::io::stdout();
    let question = format!("Allow {} to show notifications? [y/n] ", self.origin);
    stdout
      .write_all(question.as_bytes())
      .await
      .map_err(|e| FeedError::SubscribeFailed(e.to_string()))?;
    stdout
      .flush()
      .await
      .map_err(|e| FeedError::SubscribeFailed(e.to_string()))?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
      .read_line(&mut answer)
      .await
      .map_err(|e| FeedError::SubscribeFailed(e.to_string()))?;

    let permission = match answer.trim().to_ascii_lowercase().as_str() {
      "y" | "yes" => Permission::Granted,
      "n" | "no" => Permission::Denied,
      _ => Permission::Default,
    };
    if permission != Permission::Default {
      self.db.set_state(PERMISSION_KEY, permission.as_str())?;
    }
    info!(permission = permission.as_str(), "Notification permission answered");
    Ok(permission)
  }
}

/// Push manager for a device whose push-service subscription details are
/// configured up front. The active subscription lives in the platform
/// database.
pub struct ConfiguredPushManager {
  db: Arc<Database>,
  config: PushConfig,
}

impl ConfiguredPushManager {
  pub fn new(db: Arc<Database>, config: PushConfig) -> Self {
    Self { db, config }
  }
}

#[async_trait]
impl PushManager for ConfiguredPushManager {
  async fn get_subscription(&self) -> FeedResult<Option<Subscription>> {
    match self.db.get_state(SUBSCRIPTION_KEY)? {
      Some(json) => Ok(Some(serde_json::from_str(&json)?)),
      None => Ok(None),
    }
  }

  async fn subscribe(&self, application_server_key: &[u8]) -> FeedResult<Subscription> {
    let (Some(endpoint), Some(auth), Some(p256dh)) = (
      self.config.endpoint.clone(),
      self.config.auth.clone(),
      self.config.p256dh.clone(),
    ) else {
      return Err(FeedError::SubscribeFailed(
        "no push endpoint configured for this device".to_string(),
      ));
    };

    let subscription = Subscription {
      endpoint,
      keys: SubscriptionKeys { auth, p256dh },
    };
    self
      .db
      .set_state(SUBSCRIPTION_KEY, &serde_json::to_string(&subscription)?)?;
    info!(
      endpoint = %subscription.endpoint,
      key_len = application_server_key.len(),
      "Push subscription created"
    );
    Ok(subscription)
  }
}

/// Prints notifications to stdout
pub struct TerminalNotifier;

#[async_trait]
impl Notifier for TerminalNotifier {
  async fn show(&self, notification: &Notification) -> FeedResult<()> {
    info!(title = %notification.title, tag = ?notification.tag, "Showing notification");
    println!("[notification] {}", notification.title);
    println!("  {}", notification.body);
    if !notification.actions.is_empty() {
      let actions: Vec<&str> = notification.actions.iter().map(|a| a.title.as_str()).collect();
      println!("  actions: {}", actions.join(" | "));
    }
    Ok(())
  }

  async fn close(&self, notification: &Notification) -> FeedResult<()> {
    debug!(title = %notification.title, "Closed notification");
    Ok(())
  }
}

/// No app window is ever open in a terminal session, so every click opens
/// a new one.
pub struct TerminalClients;

#[async_trait]
impl Clients for TerminalClients {
  async fn match_all(&self) -> FeedResult<Vec<ClientWindow>> {
    Ok(Vec::new())
  }

  async fn navigate(&self, id: &str, url: &str) -> FeedResult<()> {
    println!("Navigating {} to {}", id, url);
    Ok(())
  }

  async fn focus(&self, id: &str) -> FeedResult<()> {
    println!("Focusing {}", id);
    Ok(())
  }

  async fn open_window(&self, url: &str) -> FeedResult<()> {
    info!(url, "Opening window");
    println!("Opening {}", url);
    Ok(())
  }
}
