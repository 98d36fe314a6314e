use crate::api::{ApiClient, PostDraft};
use crate::commands::Command;
use crate::config::Config;
use crate::db::Database;
use crate::fetch::HttpFetcher;
use crate::notify::{
  ClickOutcome, ConfiguredPushManager, Notification, NotificationPlatform, StdinPrompt,
  TerminalClients, TerminalNotifier,
};
use crate::page::{FeedQuery, FeedSource};
use crate::store::open_feed_store;
use crate::sync::{spawn_watcher, ConnectivityProbe, SubmitOutcome};
use crate::worker::{Dispatcher, Event, EventLoop, EventOutcome, WorkerContext};
use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const TICK: Duration = Duration::from_millis(50);

/// Main application state
pub struct App {
  /// Shared worker state: store, caches, sync and notifications
  ctx: Arc<WorkerContext>,

  dispatcher: Arc<Dispatcher>,
}

impl App {
  pub async fn new(config: Config, data_dir: &Path) -> Result<Self> {
    let db = Arc::new(Database::open(&data_dir.join("platform.db"))?);
    let store = Arc::new(open_feed_store(data_dir, &config.store));

    let fetcher = HttpFetcher::new()?;
    let api = ApiClient::new(&config.api, fetcher.client().clone())?;

    let platform = NotificationPlatform {
      prompt: Arc::new(StdinPrompt::new(Arc::clone(&db), config.api.origin.clone())),
      push: Arc::new(ConfiguredPushManager::new(Arc::clone(&db), config.push.clone())),
      notifier: Arc::new(TerminalNotifier),
      clients: Arc::new(TerminalClients),
    };

    let ctx = Arc::new(WorkerContext::new(
      config,
      db,
      store,
      Arc::new(fetcher),
      Arc::new(api),
      platform,
    )?);
    let dispatcher = Arc::new(ctx.dispatcher());

    Ok(Self { ctx, dispatcher })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Install => match self.dispatch(Event::Install).await? {
        EventOutcome::Installed(count) => println!("Precached {} resources", count),
        other => return Err(unexpected(other)),
      },
      Command::Activate => match self.dispatch(Event::Activate).await? {
        EventOutcome::Activated(removed) if removed.is_empty() => println!("No old caches"),
        EventOutcome::Activated(removed) => {
          for name in removed {
            println!("Removed cache {}", name);
          }
        }
        other => return Err(unexpected(other)),
      },
      Command::Fetch { url, html } => self.fetch(&url, html).await?,
      Command::Feed => self.feed().await?,
      Command::Post {
        title,
        location,
        image,
        lat,
        lng,
        defer,
      } => {
        let mut draft = PostDraft::new(title, location);
        if let Some(path) = image {
          let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| eyre!("Failed to read image {}: {}", path.display(), e))?;
          draft = draft.with_image(bytes);
        }
        if let (Some(lat), Some(lng)) = (lat, lng) {
          draft = draft.with_coordinates(lat, lng);
        }
        self.post(draft, defer).await?;
      }
      Command::Queue => {
        let pending = self.ctx.coordinator.pending()?;
        if pending.is_empty() {
          println!("Nothing queued");
        }
        for write in pending {
          println!("{}  {} ({})", write.id, write.title, write.location);
        }
      }
      Command::Sync => self.sync().await?,
      Command::Watch => self.watch().await?,
      Command::Trim => {
        let removed = self.ctx.engine.trim_dynamic()?;
        println!("Trimmed {} entries", removed);
      }
      Command::Subscribe => {
        let state = self.ctx.reconciler.request_and_subscribe().await?;
        println!("Subscription: {:?}", state);
      }
      Command::Push {
        payload,
        click,
        click_body,
      } => self.push(payload, click, click_body).await?,
    }
    Ok(())
  }

  async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
    Ok(self.dispatcher.dispatch(event).await?)
  }

  async fn fetch(&self, target: &str, html: bool) -> Result<()> {
    let mut request = self.ctx.engine.request(target)?;
    if html {
      request = request.with_header("Accept", "text/html");
    }
    let EventOutcome::Response(mut response) = self.dispatch(Event::Fetch(request)).await? else {
      return Err(eyre!("Fetch was not handled"));
    };
    println!("{} {}", response.status(), response.url());
    println!("{}", response.text()?);
    Ok(())
  }

  async fn feed(&self) -> Result<()> {
    let request = self.ctx.engine.request(&self.ctx.config.api.posts_path)?;
    let mut query = FeedQuery::for_worker(
      Arc::clone(&self.ctx.store),
      Arc::clone(&self.dispatcher),
      request,
    );
    query.fetch();

    let mut ticker = tokio::time::interval(TICK);
    loop {
      ticker.tick().await;
      if query.poll() {
        if let Some(view) = query.view() {
          let source = match view.source {
            FeedSource::Cache => "cache",
            FeedSource::Network => "network",
          };
          println!("-- {} posts from {} --", view.posts.len(), source);
          for post in &view.posts {
            println!("{}  {} ({})", post.id, post.title, post.location);
          }
        }
      }
      if !query.is_loading() {
        break;
      }
    }

    match (query.view(), query.error()) {
      (None, Some(e)) => Err(eyre!("Feed unavailable: {}", e)),
      (Some(_), Some(e)) => {
        println!("(offline: {})", e);
        Ok(())
      }
      _ => Ok(()),
    }
  }

  async fn post(&self, draft: PostDraft, defer: bool) -> Result<()> {
    let coordinator = &self.ctx.coordinator;
    let outcome = if defer || self.ctx.config.sync.prefer_deferred {
      coordinator.defer(draft).await?
    } else {
      coordinator.submit(draft).await?
    };

    match outcome {
      SubmitOutcome::Created(post) => println!("Created post {}", post.id),
      SubmitOutcome::Queued(id) => println!("Your post was saved for syncing ({})", id),
    }
    Ok(())
  }

  async fn sync(&self) -> Result<()> {
    let Some(registry) = &self.ctx.registry else {
      return Err(eyre!("Background sync is disabled"));
    };
    let tags = registry.pending()?;
    if tags.is_empty() {
      println!("Nothing to sync");
    }
    for tag in tags {
      match self.dispatch(Event::Sync { tag: tag.clone() }).await? {
        EventOutcome::Synced(report) => {
          println!("{}: {} submitted, {} failed", tag, report.confirmed, report.failed)
        }
        other => return Err(unexpected(other)),
      }
    }
    Ok(())
  }

  async fn watch(&self) -> Result<()> {
    let Some(registry) = self.ctx.registry.clone() else {
      return Err(eyre!("Background sync is disabled"));
    };
    let origin = self.ctx.engine.origin().clone();
    let probe = ConnectivityProbe::new(Arc::clone(&self.ctx.fetcher), origin);
    let interval = Duration::from_secs(self.ctx.config.sync.probe_interval_secs.max(1));

    let (tx, event_loop) = EventLoop::channel();
    let watcher = spawn_watcher(probe, registry, interval, tx);
    info!(?interval, "Watching connectivity");
    println!("Watching for connectivity, Ctrl-C to stop");

    tokio::select! {
      _ = event_loop.run(Arc::clone(&self.dispatcher)) => {}
      result = tokio::signal::ctrl_c() => result?,
    }
    watcher.abort();
    Ok(())
  }

  async fn push(
    &self,
    payload: Option<String>,
    click: Option<String>,
    click_body: bool,
  ) -> Result<()> {
    let event = Event::Push {
      payload: payload.map(|p| p.into_bytes().into()),
    };
    let notification = match self.dispatch(event).await? {
      EventOutcome::Shown(notification) => notification,
      other => return Err(unexpected(other)),
    };

    if click.is_some() || click_body {
      self.click(notification, click).await?;
    }
    Ok(())
  }

  async fn click(&self, notification: Notification, action: Option<String>) -> Result<()> {
    let event = Event::NotificationClick {
      notification,
      action,
    };
    match self.dispatch(event).await? {
      EventOutcome::Clicked(ClickOutcome::Dismissed) => println!("Dismissed"),
      EventOutcome::Clicked(ClickOutcome::Focused { client, url }) => {
        println!("Focused window {} at {}", client, url)
      }
      EventOutcome::Clicked(ClickOutcome::Opened { url }) => println!("Opened {}", url),
      other => return Err(unexpected(other)),
    }
    Ok(())
  }
}

fn unexpected(outcome: EventOutcome) -> color_eyre::Report {
  eyre!("Unexpected worker outcome: {:?}", outcome)
}
