//! Push subscription and notification handling.

pub mod platform;
pub mod push;
mod reconciler;

pub use platform::{
  ClientWindow, Clients, ConfiguredPushManager, Notifier, Permission, PermissionPrompt,
  PushManager, StdinPrompt, TerminalClients, TerminalNotifier,
};
pub use push::{Notification, PushMessage};
pub use reconciler::{ClickOutcome, NotificationPlatform, NotificationReconciler, SubscriptionState};
