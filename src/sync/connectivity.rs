use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::fetch::Fetcher;
use crate::http::Request;
use crate::worker::Event;

use super::registry::SyncRegistry;

/// Judges connectivity by whether the app origin answers at all.
#[derive(Clone)]
pub struct ConnectivityProbe {
  fetcher: Arc<dyn Fetcher>,
  target: Url,
}

impl ConnectivityProbe {
  pub fn new(fetcher: Arc<dyn Fetcher>, origin: Url) -> Self {
    Self {
      fetcher,
      target: origin,
    }
  }

  /// Any HTTP answer counts as online
  pub async fn is_online(&self) -> bool {
    match self.fetcher.fetch(&Request::get(self.target.clone())).await {
      Ok(response) => {
        debug!(status = response.status(), "Origin reachable");
        true
      }
      Err(e) => {
        debug!(error = %e, "Origin unreachable");
        false
      }
    }
  }
}

/// While the origin is reachable, emit a sync event for every pending
/// registration on each tick. A tag registered while already online, or left
/// pending by a failed replay, fires on the next tick; one going offline
/// waits for connectivity to come back.
pub fn spawn_watcher(
  probe: ConnectivityProbe,
  registry: SyncRegistry,
  interval: Duration,
  tx: mpsc::UnboundedSender<Event>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut was_online = false;
    loop {
      let online = probe.is_online().await;

      if online && !was_online {
        info!("Connectivity restored");
      } else if !online && was_online {
        info!("Connectivity lost");
      }

      if online {
        let tags = match registry.pending() {
          Ok(tags) => tags,
          Err(e) => {
            warn!(error = %e, "Failed to read sync registrations");
            Vec::new()
          }
        };
        for tag in tags {
          if tx.send(Event::Sync { tag }).is_err() {
            return;
          }
        }
      }

      was_online = online;
      if tx.is_closed() {
        return;
      }
      tokio::time::sleep(interval).await;
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{memory_db, ScriptedFetcher, ORIGIN};

  #[tokio::test]
  async fn test_probe_counts_any_status_as_online() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let probe = ConnectivityProbe::new(fetcher.clone(), Url::parse(ORIGIN).unwrap());

    // Unrouted: 404, but the server answered
    assert!(probe.is_online().await);
    fetcher.set_offline(true);
    assert!(!probe.is_online().await);
  }

  #[tokio::test]
  async fn test_watcher_fires_pending_tags_on_reconnect() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.set_offline(true);
    let registry = SyncRegistry::new(memory_db());
    registry.register("sync-new-posts").unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let probe = ConnectivityProbe::new(fetcher.clone(), Url::parse(ORIGIN).unwrap());
    let handle = spawn_watcher(probe, registry.clone(), Duration::from_millis(5), tx);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());

    fetcher.set_offline(false);
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
      .await
      .unwrap()
      .unwrap();
    assert!(matches!(event, Event::Sync { tag } if tag == "sync-new-posts"));

    // Once the registration is gone, staying online fires nothing
    let generation = registry.generation("sync-new-posts").unwrap().unwrap();
    registry.complete("sync-new-posts", generation).unwrap();
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());

    drop(rx);
    tokio::time::timeout(Duration::from_secs(1), handle)
      .await
      .unwrap()
      .unwrap();
  }

  #[tokio::test]
  async fn test_registration_while_online_fires_on_next_tick() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let registry = SyncRegistry::new(memory_db());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let probe = ConnectivityProbe::new(fetcher, Url::parse(ORIGIN).unwrap());
    let handle = spawn_watcher(probe, registry.clone(), Duration::from_millis(5), tx);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(rx.try_recv().is_err());

    registry.register("sync-new-posts").unwrap();
    let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
      .await
      .unwrap()
      .unwrap();
    assert!(matches!(event, Event::Sync { tag } if tag == "sync-new-posts"));

    handle.abort();
  }
}
