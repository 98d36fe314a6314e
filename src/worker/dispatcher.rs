use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::FeedResult;
use crate::http::{Request, Response};
use crate::notify::{ClickOutcome, Notification};
use crate::sync::{ReplayReport, SyncRegistry};

/// Worker events
#[derive(Debug)]
pub enum Event {
  /// Populate the static partition
  Install,
  /// Drop caches of earlier generations
  Activate,
  /// An intercepted request
  Fetch(Request),
  /// A background-sync registration fired
  Sync { tag: String },
  /// A push delivery, with its raw payload if any
  Push { payload: Option<Bytes> },
  NotificationClick {
    notification: Notification,
    action: Option<String>,
  },
  NotificationClose { notification: Notification },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Install,
  Activate,
  Fetch,
  Sync,
  Push,
  NotificationClick,
  NotificationClose,
}

impl Event {
  pub fn kind(&self) -> EventKind {
    match self {
      Event::Install => EventKind::Install,
      Event::Activate => EventKind::Activate,
      Event::Fetch(_) => EventKind::Fetch,
      Event::Sync { .. } => EventKind::Sync,
      Event::Push { .. } => EventKind::Push,
      Event::NotificationClick { .. } => EventKind::NotificationClick,
      Event::NotificationClose { .. } => EventKind::NotificationClose,
    }
  }
}

/// What a handler resolved with
#[derive(Debug)]
pub enum EventOutcome {
  Done,
  /// Number of app-shell resources stored
  Installed(usize),
  /// Names of the caches removed
  Activated(Vec<String>),
  Response(Response),
  Synced(ReplayReport),
  Shown(Notification),
  Clicked(ClickOutcome),
  /// No handler registered for this kind
  Unhandled,
}

type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, FeedResult<EventOutcome>> + Send + Sync>;

/// Registration table from event kind to handler.
///
/// `dispatch` resolves only once the handler's future has finished.
#[derive(Default)]
pub struct Dispatcher {
  handlers: HashMap<EventKind, Handler>,
  registry: Option<SyncRegistry>,
}

impl Dispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drop sync registrations whose handler succeeded
  pub fn with_sync_registry(mut self, registry: SyncRegistry) -> Self {
    self.registry = Some(registry);
    self
  }

  /// Register the handler for `kind`, replacing any earlier one.
  pub fn on<F, Fut>(&mut self, kind: EventKind, handler: F)
  where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FeedResult<EventOutcome>> + Send + 'static,
  {
    let handler: Handler = Arc::new(move |event| -> BoxFuture<'static, FeedResult<EventOutcome>> {
      Box::pin(handler(event))
    });
    self.handlers.insert(kind, handler);
  }

  pub fn handles(&self, kind: EventKind) -> bool {
    self.handlers.contains_key(&kind)
  }

  pub async fn dispatch(&self, event: Event) -> FeedResult<EventOutcome> {
    let kind = event.kind();
    let Some(handler) = self.handlers.get(&kind).cloned() else {
      debug!(?kind, "No handler registered");
      return Ok(EventOutcome::Unhandled);
    };

    // Generation the handler is about to serve; a registration made while
    // it runs bumps it and stays pending.
    let sync_registration = match (&event, &self.registry) {
      (Event::Sync { tag }, Some(registry)) => registry
        .generation(tag)?
        .map(|generation| (tag.clone(), generation)),
      _ => None,
    };

    let outcome = handler(event).await?;

    if let (Some((tag, generation)), Some(registry)) = (sync_registration, &self.registry) {
      registry.complete(&tag, generation)?;
    }
    Ok(outcome)
  }
}

/// Channel-fed loop handling one event at a time, in arrival order.
pub struct EventLoop {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventLoop {
  /// Create the loop and the sender producers use to feed it
  pub fn channel() -> (mpsc::UnboundedSender<Event>, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Self { rx })
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }

  /// Handle events until every sender is gone. Handler failures are logged;
  /// the loop keeps going.
  pub async fn run(mut self, dispatcher: Arc<Dispatcher>) {
    while let Some(event) = self.next().await {
      let kind = event.kind();
      match dispatcher.dispatch(event).await {
        Ok(EventOutcome::Synced(report)) => {
          info!(confirmed = report.confirmed, "Sync finished");
        }
        Ok(outcome) => debug!(?kind, ?outcome, "Event handled"),
        Err(e) => warn!(?kind, error = %e, "Event handler failed"),
      }
    }
  }
}
