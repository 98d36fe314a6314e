//! The background worker: one context built at start-up, and the handlers
//! that answer its events.

mod dispatcher;

pub use dispatcher::{Dispatcher, Event, EventKind, EventLoop, EventOutcome};

use std::sync::Arc;
use url::Url;

use crate::api::PostsApi;
use crate::cache::CacheStorage;
use crate::config::Config;
use crate::db::Database;
use crate::error::FeedResult;
use crate::fetch::Fetcher;
use crate::notify::{NotificationPlatform, NotificationReconciler};
use crate::store::StoreHandle;
use crate::strategy::StrategyEngine;
use crate::sync::{SyncCoordinator, SyncRegistry};

/// Everything the handlers share. Built once, then passed around behind an
/// `Arc`.
pub struct WorkerContext {
  pub config: Config,
  pub store: Arc<StoreHandle>,
  pub fetcher: Arc<dyn Fetcher>,
  pub registry: Option<SyncRegistry>,
  pub engine: StrategyEngine,
  pub coordinator: SyncCoordinator,
  pub reconciler: NotificationReconciler,
}

impl WorkerContext {
  pub fn new(
    config: Config,
    db: Arc<Database>,
    store: Arc<StoreHandle>,
    fetcher: Arc<dyn Fetcher>,
    api: Arc<dyn PostsApi>,
    platform: NotificationPlatform,
  ) -> FeedResult<Self> {
    let origin = Url::parse(&config.api.origin)?;
    let registry = config
      .sync
      .background_sync
      .then(|| SyncRegistry::new(Arc::clone(&db)));

    let engine = StrategyEngine::new(
      origin,
      &config.api,
      &config.caches,
      CacheStorage::new(db),
      Arc::clone(&store),
      Arc::clone(&fetcher),
    );
    let coordinator = SyncCoordinator::new(
      Arc::clone(&store),
      Arc::clone(&api),
      registry.clone(),
      config.sync.tag.clone(),
    );
    let reconciler = NotificationReconciler::new(
      platform,
      api,
      config.push.vapid_public_key.clone(),
      config.notifications.clone(),
    );

    Ok(Self {
      config,
      store,
      fetcher,
      registry,
      engine,
      coordinator,
      reconciler,
    })
  }

  /// Dispatcher with every handler of this context registered.
  pub fn dispatcher(self: &Arc<Self>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    if let Some(registry) = &self.registry {
      dispatcher = dispatcher.with_sync_registry(registry.clone());
    }
    register_handlers(&mut dispatcher, self);
    dispatcher
  }
}

pub fn register_handlers(dispatcher: &mut Dispatcher, ctx: &Arc<WorkerContext>) {
  let c = Arc::clone(ctx);
  dispatcher.on(EventKind::Install, move |_| {
    let c = Arc::clone(&c);
    async move { Ok(EventOutcome::Installed(c.engine.precache().await?)) }
  });

  let c = Arc::clone(ctx);
  dispatcher.on(EventKind::Activate, move |_| {
    let c = Arc::clone(&c);
    async move { Ok(EventOutcome::Activated(c.engine.activate()?)) }
  });

  let c = Arc::clone(ctx);
  dispatcher.on(EventKind::Fetch, move |event| {
    let c = Arc::clone(&c);
    async move {
      let Event::Fetch(request) = event else {
        return Ok(EventOutcome::Unhandled);
      };
      Ok(EventOutcome::Response(c.engine.respond(&request).await?))
    }
  });

  let c = Arc::clone(ctx);
  dispatcher.on(EventKind::Sync, move |event| {
    let c = Arc::clone(&c);
    async move {
      let Event::Sync { tag } = event else {
        return Ok(EventOutcome::Unhandled);
      };
      Ok(EventOutcome::Synced(c.coordinator.on_sync(&tag).await?))
    }
  });

  let c = Arc::clone(ctx);
  dispatcher.on(EventKind::Push, move |event| {
    let c = Arc::clone(&c);
    async move {
      let Event::Push { payload } = event else {
        return Ok(EventOutcome::Unhandled);
      };
      Ok(EventOutcome::Shown(c.reconciler.on_push(payload.as_deref()).await?))
    }
  });

  let c = Arc::clone(ctx);
  dispatcher.on(EventKind::NotificationClick, move |event| {
    let c = Arc::clone(&c);
    async move {
      let Event::NotificationClick { notification, action } = event else {
        return Ok(EventOutcome::Unhandled);
      };
      let outcome = c
        .reconciler
        .on_click(&notification, action.as_deref())
        .await?;
      Ok(EventOutcome::Clicked(outcome))
    }
  });

  let c = Arc::clone(ctx);
  dispatcher.on(EventKind::NotificationClose, move |event| {
    let c = Arc::clone(&c);
    async move {
      if let Event::NotificationClose { notification } = event {
        c.reconciler.on_close(&notification);
      }
      Ok(EventOutcome::Done)
    }
  });
}
