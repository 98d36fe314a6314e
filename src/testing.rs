//! Scripted doubles for the network and the notification platform.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::{PendingWrite, Post, PostsApi, Subscription, SubscriptionKeys};
use crate::db::Database;
use crate::error::{FeedError, FeedResult};
use crate::fetch::Fetcher;
use crate::http::{Request, Response};
use crate::notify::{ClientWindow, Clients, Notification, Notifier, Permission, PermissionPrompt, PushManager};
use crate::store::{self, SqliteStore, StoreHandle};

pub const ORIGIN: &str = "http://localhost:3000";

pub fn memory_store() -> Arc<StoreHandle> {
  let store = SqliteStore::open_in_memory("posts-store", 1, store::migrate).unwrap();
  Arc::new(StoreHandle::Persistent(store))
}

pub fn memory_db() -> Arc<Database> {
  Arc::new(Database::open_in_memory().unwrap())
}

/// Fetcher answering from a routing table keyed by absolute URL.
/// Unrouted URLs answer 404; offline mode fails every request.
#[derive(Default)]
pub struct ScriptedFetcher {
  routes: Mutex<HashMap<String, (u16, Bytes)>>,
  offline: AtomicBool,
  calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Route a path (relative to [`ORIGIN`]) or an absolute URL
  pub fn route(&self, target: &str, status: u16, body: impl Into<Bytes>) {
    let url = if target.starts_with("http") {
      target.to_string()
    } else {
      format!("{}{}", ORIGIN, target)
    };
    self.routes.lock().unwrap().insert(url, (status, body.into()));
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> FeedResult<Response> {
    let url = request.cache_key();
    self.calls.lock().unwrap().push(url.clone());

    if self.offline.load(Ordering::SeqCst) {
      return Err(FeedError::network(url, "offline"));
    }

    let routed = self.routes.lock().unwrap().get(&url).cloned();
    let (status, body) = routed.unwrap_or((404, Bytes::from_static(b"not found")));
    Ok(Response::new(status, url, Vec::new(), body))
  }
}

/// Posts backend double
#[derive(Default)]
pub struct ScriptedApi {
  offline: AtomicBool,
  reject_subscriptions: AtomicBool,
  failing_titles: Mutex<HashSet<String>>,
  created: Mutex<Vec<PendingWrite>>,
  subscriptions: Mutex<Vec<Subscription>>,
  attempts: AtomicUsize,
}

impl ScriptedApi {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn reject_subscriptions(&self, reject: bool) {
    self.reject_subscriptions.store(reject, Ordering::SeqCst);
  }

  /// Answer 500 for posts with this title
  pub fn fail_title(&self, title: &str) {
    self.failing_titles.lock().unwrap().insert(title.to_string());
  }

  pub fn heal_title(&self, title: &str) {
    self.failing_titles.lock().unwrap().remove(title);
  }

  pub fn created(&self) -> Vec<PendingWrite> {
    self.created.lock().unwrap().clone()
  }

  pub fn subscriptions(&self) -> Vec<Subscription> {
    self.subscriptions.lock().unwrap().clone()
  }

  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PostsApi for ScriptedApi {
  async fn create_post(&self, post: &PendingWrite) -> FeedResult<Post> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    let url = format!("{}/api/posts", ORIGIN);
    if self.offline.load(Ordering::SeqCst) {
      return Err(FeedError::network(url, "offline"));
    }
    if self.failing_titles.lock().unwrap().contains(&post.title) {
      return Err(FeedError::network(url, "server answered 500"));
    }

    let mut created = self.created.lock().unwrap();
    created.push(post.clone());
    let mut record = post.to_post();
    record.id = format!("srv-{}", created.len());
    Ok(record)
  }

  async fn register_subscription(&self, subscription: &Subscription) -> FeedResult<()> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(FeedError::SubscriptionRegistrationFailed("offline".to_string()));
    }
    if self.reject_subscriptions.load(Ordering::SeqCst) {
      return Err(FeedError::SubscriptionRegistrationFailed(
        "server answered 500".to_string(),
      ));
    }
    self.subscriptions.lock().unwrap().push(subscription.clone());
    Ok(())
  }
}

/// Permission prompt with a fixed answer
pub struct FixedPrompt {
  answer: Permission,
  asked: AtomicUsize,
}

impl FixedPrompt {
  pub fn new(answer: Permission) -> Self {
    Self {
      answer,
      asked: AtomicUsize::new(0),
    }
  }

  pub fn asked(&self) -> usize {
    self.asked.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PermissionPrompt for FixedPrompt {
  async fn request_permission(&self) -> FeedResult<Permission> {
    self.asked.fetch_add(1, Ordering::SeqCst);
    Ok(self.answer)
  }
}

#[derive(Default)]
pub struct FakePushManager {
  existing: Mutex<Option<Subscription>>,
  subscribe_calls: AtomicUsize,
}

impl FakePushManager {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_existing(&self, subscription: Subscription) {
    *self.existing.lock().unwrap() = Some(subscription);
  }

  pub fn subscribe_calls(&self) -> usize {
    self.subscribe_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PushManager for FakePushManager {
  async fn get_subscription(&self) -> FeedResult<Option<Subscription>> {
    Ok(self.existing.lock().unwrap().clone())
  }

  async fn subscribe(&self, application_server_key: &[u8]) -> FeedResult<Subscription> {
    self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
    let subscription = Subscription {
      endpoint: format!("https://push.example/{}", application_server_key.len()),
      keys: SubscriptionKeys {
        auth: "auth".to_string(),
        p256dh: "p256dh".to_string(),
      },
    };
    *self.existing.lock().unwrap() = Some(subscription.clone());
    Ok(subscription)
  }
}

#[derive(Default)]
pub struct RecordingNotifier {
  shown: Mutex<Vec<Notification>>,
  closed: AtomicUsize,
}

impl RecordingNotifier {
  pub fn shown(&self) -> Vec<Notification> {
    self.shown.lock().unwrap().clone()
  }

  pub fn closed(&self) -> usize {
    self.closed.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn show(&self, notification: &Notification) -> FeedResult<()> {
    self.shown.lock().unwrap().push(notification.clone());
    Ok(())
  }

  async fn close(&self, _notification: &Notification) -> FeedResult<()> {
    self.closed.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// Window list double recording every interaction
pub struct FakeClients {
  windows: Vec<ClientWindow>,
  log: Mutex<Vec<String>>,
  failing: AtomicBool,
}

impl FakeClients {
  pub fn new(windows: Vec<ClientWindow>) -> Self {
    Self {
      windows,
      log: Mutex::new(Vec::new()),
      failing: AtomicBool::new(false),
    }
  }

  /// Fail every navigate, focus and open
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  fn record(&self, entry: String) -> FeedResult<()> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(FeedError::network(entry, "window unavailable"));
    }
    self.log.lock().unwrap().push(entry);
    Ok(())
  }

  pub fn log(&self) -> Vec<String> {
    self.log.lock().unwrap().clone()
  }
}

#[async_trait]
impl Clients for FakeClients {
  async fn match_all(&self) -> FeedResult<Vec<ClientWindow>> {
    Ok(self.windows.clone())
  }

  async fn navigate(&self, id: &str, url: &str) -> FeedResult<()> {
    self.record(format!("navigate {} {}", id, url))
  }

  async fn focus(&self, id: &str) -> FeedResult<()> {
    self.record(format!("focus {}", id))
  }

  async fn open_window(&self, url: &str) -> FeedResult<()> {
    self.record(format!("open {}", url))
  }
}
