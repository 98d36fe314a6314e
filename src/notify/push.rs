//! Push payloads and the notifications built from them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::NotificationConfig;
use crate::error::{FeedError, FeedResult};

pub const DEFAULT_TITLE: &str = "New!";
pub const DEFAULT_CONTENT: &str = "Something new happened!";
pub const DEFAULT_OPEN_URL: &str = "/";

pub const CONFIRM_TAG: &str = "confirm-notification";
pub const CONFIRM_ACTION: &str = "confirm";
pub const CANCEL_ACTION: &str = "cancel";

/// Uncompressed P-256 point: 0x04 || X || Y
const VAPID_KEY_LEN: usize = 65;

#[derive(Debug, Deserialize)]
struct RawPushMessage {
  title: Option<String>,
  content: Option<String>,
  image: Option<String>,
  #[serde(rename = "openUrl")]
  open_url: Option<String>,
}

/// Content of a push delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
  pub title: String,
  pub content: String,
  pub image: Option<String>,
  pub open_url: String,
}

impl Default for PushMessage {
  fn default() -> Self {
    Self {
      title: DEFAULT_TITLE.to_string(),
      content: DEFAULT_CONTENT.to_string(),
      image: None,
      open_url: DEFAULT_OPEN_URL.to_string(),
    }
  }
}

impl PushMessage {
  /// Parse a delivery, falling back to the default message when there is no
  /// payload or it cannot be read. Never fails.
  pub fn parse(payload: Option<&[u8]>) -> Self {
    let Some(bytes) = payload else {
      return Self::default();
    };

    match Self::try_parse(bytes) {
      Ok(message) => message,
      Err(e) => {
        warn!(error = %e, "Using default push message");
        Self::default()
      }
    }
  }

  /// Strict parse. Fields missing from a valid document take their defaults
  /// one by one.
  pub fn try_parse(bytes: &[u8]) -> FeedResult<Self> {
    let raw: RawPushMessage = serde_json::from_slice(bytes)
      .map_err(|e| FeedError::MalformedPushPayload(e.to_string()))?;

    let defaults = Self::default();
    Ok(Self {
      title: raw.title.unwrap_or(defaults.title),
      content: raw.content.unwrap_or(defaults.content),
      image: raw.image,
      open_url: raw.open_url.unwrap_or(defaults.open_url),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

/// Metadata attached to a notification, read back on click
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationData {
  pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub image: Option<String>,
  pub lang: String,
  pub dir: String,
  pub vibrate: Vec<u32>,
  pub tag: Option<String>,
  pub renotify: bool,
  pub actions: Vec<NotificationAction>,
  pub data: NotificationData,
}

impl Notification {
  fn with_options(title: &str, body: &str, config: &NotificationConfig) -> Self {
    Self {
      title: title.to_string(),
      body: body.to_string(),
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      image: None,
      lang: config.lang.clone(),
      dir: config.dir.clone(),
      vibrate: config.vibrate.clone(),
      tag: None,
      renotify: false,
      actions: Vec::new(),
      data: NotificationData::default(),
    }
  }

  pub fn from_push(message: &PushMessage, config: &NotificationConfig) -> Self {
    let mut notification = Self::with_options(&message.title, &message.content, config);
    notification.image = message.image.clone();
    notification.data.url = Some(message.open_url.clone());
    notification
  }

  /// Shown once a subscription reached the backend
  pub fn subscribed(config: &NotificationConfig) -> Self {
    let mut notification = Self::with_options(
      "You have successfully subscribed!",
      "You have successfully subscribed to our Notification Service. Thank you.",
      config,
    );
    notification.tag = Some(CONFIRM_TAG.to_string());
    notification.renotify = true;
    notification.actions = vec![
      NotificationAction {
        action: CONFIRM_ACTION.to_string(),
        title: "Okay".to_string(),
        icon: config.icon.clone(),
      },
      NotificationAction {
        action: CANCEL_ACTION.to_string(),
        title: "Cancel".to_string(),
        icon: config.icon.clone(),
      },
    ];
    notification
  }

  /// Where a click should take the user
  pub fn target_url(&self) -> &str {
    self.data.url.as_deref().unwrap_or(DEFAULT_OPEN_URL)
  }
}

/// Decode a URL-safe base64 application server key. Padding is tolerated.
pub fn decode_vapid_key(key: &str) -> FeedResult<Vec<u8>> {
  let bytes = URL_SAFE_NO_PAD
    .decode(key.trim().trim_end_matches('='))
    .map_err(|e| FeedError::SubscribeFailed(format!("invalid application server key: {}", e)))?;

  if bytes.len() != VAPID_KEY_LEN || bytes[0] != 0x04 {
    return Err(FeedError::SubscribeFailed(format!(
      "application server key is not an uncompressed P-256 point ({} bytes)",
      bytes.len()
    )));
  }
  Ok(bytes)
}
