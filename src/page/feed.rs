//! Page-side feed loading.
//!
//! Both sources are asked at once: the local read cache and `GET /api/posts`
//! through the worker. A cache result is shown only while nothing has come
//! from the network; a network result always replaces what is shown. A
//! superseded load is not cancelled, its result is just ignored.
//!
//! ```ignore
//! let mut feed = FeedQuery::for_worker(store, dispatcher, request);
//! feed.fetch();
//!
//! // On every tick
//! if feed.poll() {
//!     render(feed.view());
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::api_types::ApiPostsResponse;
use crate::api::Post;
use crate::http::Request;
use crate::store::{LocalStore, StoreHandle, POSTS};
use crate::worker::{Dispatcher, Event, EventOutcome};

/// Where the shown posts came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
  Cache,
  Network,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedView {
  pub posts: Vec<Post>,
  pub source: FeedSource,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type LoaderFn = Box<dyn Fn() -> BoxFuture<Vec<Post>> + Send + Sync>;

type Receiver = mpsc::UnboundedReceiver<Result<Vec<Post>, String>>;

pub struct FeedQuery {
  cache_loader: LoaderFn,
  network_loader: LoaderFn,
  cache_rx: Option<Receiver>,
  network_rx: Option<Receiver>,
  network_received: bool,
  view: Option<FeedView>,
  error: Option<String>,
  fetched_at: Option<Instant>,
}

impl FeedQuery {
  pub fn new<C, CF, N, NF>(cache_loader: C, network_loader: N) -> Self
  where
    C: Fn() -> CF + Send + Sync + 'static,
    CF: Future<Output = Result<Vec<Post>, String>> + Send + 'static,
    N: Fn() -> NF + Send + Sync + 'static,
    NF: Future<Output = Result<Vec<Post>, String>> + Send + 'static,
  {
    Self {
      cache_loader: Box::new(move || Box::pin(cache_loader())),
      network_loader: Box::new(move || Box::pin(network_loader())),
      cache_rx: None,
      network_rx: None,
      network_received: false,
      view: None,
      error: None,
      fetched_at: None,
    }
  }

  /// Feed backed by the local read cache and the worker's fetch handler.
  pub fn for_worker(store: Arc<StoreHandle>, dispatcher: Arc<Dispatcher>, request: Request) -> Self {
    let cache = move || {
      let store = Arc::clone(&store);
      async move { store.get_all::<Post>(POSTS).map_err(|e| e.to_string()) }
    };

    let network = move || {
      let dispatcher = Arc::clone(&dispatcher);
      let request = request.clone();
      async move {
        let outcome = dispatcher
          .dispatch(Event::Fetch(request))
          .await
          .map_err(|e| e.to_string())?;
        let EventOutcome::Response(mut response) = outcome else {
          return Err("fetch was not handled".to_string());
        };
        if !response.ok() {
          return Err(format!("server answered {}", response.status()));
        }
        let payload: ApiPostsResponse = response.json().map_err(|e| e.to_string())?;
        Ok(payload.into_posts().unwrap_or_default())
      }
    };

    Self::new(cache, network)
  }

  pub fn view(&self) -> Option<&FeedView> {
    self.view.as_ref()
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.cache_rx.is_some() || self.network_rx.is_some()
  }

  pub fn fetched_at(&self) -> Option<Instant> {
    self.fetched_at
  }

  /// Start both loads. An earlier load still in flight is dropped.
  pub fn fetch(&mut self) {
    self.network_received = false;
    self.error = None;
    self.cache_rx = Some(spawn_loader(&self.cache_loader));
    self.network_rx = Some(spawn_loader(&self.network_loader));
  }

  /// Take in finished loads. Returns `true` if the view changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    match take_result(&mut self.network_rx) {
      Some(Ok(posts)) => {
        debug!(count = posts.len(), "Feed from network");
        self.network_received = true;
        self.fetched_at = Some(Instant::now());
        self.view = Some(FeedView {
          posts,
          source: FeedSource::Network,
        });
        self.error = None;
        changed = true;
      }
      Some(Err(e)) => {
        warn!(error = %e, "Feed network load failed");
        self.error = Some(e);
        changed = true;
      }
      None => {}
    }

    match take_result(&mut self.cache_rx) {
      Some(Ok(posts)) if !self.network_received => {
        debug!(count = posts.len(), "Feed from cache");
        self.view = Some(FeedView {
          posts,
          source: FeedSource::Cache,
        });
        changed = true;
      }
      Some(Ok(_)) => debug!("Cache result arrived after network, ignored"),
      Some(Err(e)) => warn!(error = %e, "Feed cache load failed"),
      None => {}
    }

    changed
  }
}

fn spawn_loader(loader: &LoaderFn) -> Receiver {
  let (tx, rx) = mpsc::unbounded_channel();
  let future = loader();
  tokio::spawn(async move {
    // Receiver may have been dropped by a newer fetch
    let _ = tx.send(future.await);
  });
  rx
}

/// Non-blocking receive; clears the slot once the load has finished.
fn take_result(slot: &mut Option<Receiver>) -> Option<Result<Vec<Post>, String>> {
  let rx = slot.as_mut()?;
  match rx.try_recv() {
    Ok(result) => {
      *slot = None;
      Some(result)
    }
    Err(mpsc::error::TryRecvError::Empty) => None,
    Err(mpsc::error::TryRecvError::Disconnected) => {
      *slot = None;
      Some(Err("load was cancelled".to_string()))
    }
  }
}

impl std::fmt::Debug for FeedQuery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FeedQuery")
      .field("view", &self.view)
      .field("error", &self.error)
      .field("network_received", &self.network_received)
      .finish_non_exhaustive()
  }
}
