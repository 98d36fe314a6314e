//! Cache strategy engine.
//!
//! Every intercepted GET is classified and answered by one strategy:
//!
//! | class         | strategy                                            |
//! |---------------|-----------------------------------------------------|
//! | `ApiList`     | network, then rebuild the read cache from the payload |
//! | `StaticAsset` | cache only                                          |
//! | `Other`       | cache, else network (stored in dynamic), else offline page for HTML |
//!
//! Writes to a cache or the local store never fail the response handed back
//! to the caller; they are logged and dropped.

use futures::future::try_join_all;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::api_types::ApiPostsResponse;
use crate::cache::{CacheNames, CacheStorage};
use crate::classify::{Classifier, RequestClass};
use crate::config::{ApiConfig, CachesConfig};
use crate::error::{FeedError, FeedResult};
use crate::fetch::Fetcher;
use crate::http::{Request, Response};
use crate::store::{LocalStore, StoreHandle, POSTS};

pub struct StrategyEngine {
  caches: CacheStorage,
  store: Arc<StoreHandle>,
  fetcher: Arc<dyn Fetcher>,
  classifier: Classifier,
  names: CacheNames,
  origin: Url,
  static_files: Vec<String>,
  offline_page: String,
  max_dynamic_items: usize,
  trim_on_insert: bool,
}

impl StrategyEngine {
  pub fn new(
    origin: Url,
    api: &ApiConfig,
    config: &CachesConfig,
    caches: CacheStorage,
    store: Arc<StoreHandle>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Self {
    let classifier = Classifier::new(&origin, api.posts_path.clone(), config.static_files.clone());
    Self {
      caches,
      store,
      fetcher,
      classifier,
      names: CacheNames::from_config(config),
      origin,
      static_files: config.static_files.clone(),
      offline_page: config.offline_page.clone(),
      max_dynamic_items: config.max_dynamic_items,
      trim_on_insert: config.trim_on_insert,
    }
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  pub fn origin(&self) -> &Url {
    &self.origin
  }

  pub fn caches(&self) -> &CacheStorage {
    &self.caches
  }

  /// GET request for a path or absolute URL
  pub fn request(&self, target: &str) -> FeedResult<Request> {
    Request::resolve(&self.origin, target)
  }

  /// Answer an intercepted request.
  pub async fn respond(&self, request: &Request) -> FeedResult<Response> {
    if request.method() != Method::GET {
      return self.fetcher.fetch(request).await;
    }

    let class = self.classifier.classify(request.url().as_str());
    debug!(url = %request.url(), ?class, "Intercepted");
    match class {
      RequestClass::ApiList => self.cache_then_network(request).await,
      RequestClass::StaticAsset => self.cache_only(request),
      RequestClass::Other => self.cache_with_network_fallback(request).await,
    }
  }

  /// Network first. A successful list payload replaces the read cache; the
  /// live response is returned whatever happens to the cache.
  pub async fn cache_then_network(&self, request: &Request) -> FeedResult<Response> {
    let response = self.fetcher.fetch(request).await?;
    if !response.ok() {
      debug!(url = %request.url(), status = response.status(), "Not refreshing read cache");
      return Ok(response);
    }

    match response.try_clone() {
      Ok(copy) => match self.refresh_read_cache(copy) {
        Ok(Some(count)) => debug!(count, "Read cache refreshed"),
        Ok(None) => debug!(url = %request.url(), "Not a list payload"),
        Err(e) => warn!(error = %e, "Failed to refresh read cache"),
      },
      Err(e) => warn!(error = %e, "Could not clone list response"),
    }

    Ok(response)
  }

  /// Replace the read cache with the posts of a list payload. Returns `None`
  /// and leaves the cache alone when the body is not a list payload.
  pub fn refresh_read_cache(&self, mut copy: Response) -> FeedResult<Option<usize>> {
    let payload: ApiPostsResponse = copy.json()?;
    let Some(posts) = payload.into_posts() else {
      return Ok(None);
    };

    self.store.clear(POSTS)?;
    for post in &posts {
      self.store.put(POSTS, post)?;
    }
    Ok(Some(posts.len()))
  }

  pub fn cache_only(&self, request: &Request) -> FeedResult<Response> {
    self
      .caches
      .match_any(request)?
      .ok_or_else(|| FeedError::CacheMiss(request.cache_key()))
  }

  pub async fn cache_with_network_fallback(&self, request: &Request) -> FeedResult<Response> {
    match self.caches.match_any(request) {
      Ok(Some(hit)) => return Ok(hit),
      Ok(None) => {}
      Err(e) => warn!(url = %request.url(), error = %e, "Cache lookup failed"),
    }

    match self.fetcher.fetch(request).await {
      Ok(response) if response.ok() => {
        self.store_dynamic(request, &response);
        Ok(response)
      }
      Ok(response) => {
        let cause = FeedError::network(
          request.cache_key(),
          format!("server answered {}", response.status()),
        );
        self.offline_fallback(request, cause)
      }
      Err(e) => self.offline_fallback(request, e),
    }
  }

  /// Keep a copy of a fetched response in the dynamic partition.
  fn store_dynamic(&self, request: &Request, response: &Response) {
    let stored = response.try_clone().and_then(|copy| {
      let cache = self.caches.open(&self.names.dynamic_name)?;
      cache.put(request, copy)?;
      if self.trim_on_insert {
        cache.trim(self.max_dynamic_items)?;
      }
      Ok(())
    });

    if let Err(e) = stored {
      warn!(url = %request.url(), error = %e, "Failed to cache response");
    }
  }

  /// The offline page for HTML requests, the original failure otherwise.
  fn offline_fallback(&self, request: &Request, cause: FeedError) -> FeedResult<Response> {
    if !request.accepts_html() {
      return Err(cause);
    }

    let page = self.request(&self.offline_page)?;
    let cache = self.caches.open(&self.names.static_name)?;
    match cache.match_request(&page)? {
      Some(response) => {
        info!(url = %request.url(), "Serving offline page");
        Ok(response)
      }
      None => Err(cause),
    }
  }

  /// Fetch the whole app shell and store it in one batch. Any failure
  /// leaves the static partition untouched.
  pub async fn precache(&self) -> FeedResult<usize> {
    let requests = self
      .static_files
      .iter()
      .map(|target| self.request(target))
      .collect::<FeedResult<Vec<_>>>()?;

    let responses = try_join_all(requests.iter().map(|request| async move {
      let response = self.fetcher.fetch(request).await?;
      if !response.ok() {
        return Err(FeedError::network(
          request.cache_key(),
          format!("server answered {}", response.status()),
        ));
      }
      Ok::<_, FeedError>(response)
    }))
    .await
    .map_err(|e| FeedError::Install(e.to_string()))?;

    let count = responses.len();
    self
      .caches
      .open(&self.names.static_name)?
      .put_all(requests.into_iter().zip(responses).collect())
      .map_err(|e| FeedError::Install(e.to_string()))?;

    info!(cache = %self.names.static_name, count, "Precached app shell");
    Ok(count)
  }

  /// Delete every cache outside the current generation.
  pub fn activate(&self) -> FeedResult<Vec<String>> {
    let mut removed = Vec::new();
    for name in self.caches.keys()? {
      if self.names.is_current(&name) {
        continue;
      }
      self.caches.delete(&name)?;
      info!(cache = %name, "Removed old cache");
      removed.push(name);
    }
    Ok(removed)
  }

  pub fn trim_dynamic(&self) -> FeedResult<usize> {
    self
      .caches
      .open(&self.names.dynamic_name)?
      .trim(self.max_dynamic_items)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Post;
  use crate::config::Config;
  use crate::testing::{memory_db, memory_store, ScriptedFetcher, ORIGIN};

  struct Fixture {
    engine: StrategyEngine,
    fetcher: Arc<ScriptedFetcher>,
    store: Arc<StoreHandle>,
  }

  fn fixture_with(config: Config) -> Fixture {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = memory_store();
    let engine = StrategyEngine::new(
      Url::parse(ORIGIN).unwrap(),
      &config.api,
      &config.caches,
      CacheStorage::new(memory_db()),
      Arc::clone(&store),
      fetcher.clone(),
    );
    Fixture { engine, fetcher, store }
  }

  fn fixture() -> Fixture {
    let mut config = Config::default();
    config.caches.static_files = vec!["/".into(), "/index.html".into(), "/offline.html".into()];
    fixture_with(config)
  }

  fn route_shell(fetcher: &ScriptedFetcher) {
    fetcher.route("/", 200, "<html>root</html>");
    fetcher.route("/index.html", 200, "<html>index</html>");
    fetcher.route("/offline.html", 200, "<html>offline</html>");
  }

  fn list_payload(ids: &[&str]) -> String {
    let posts: Vec<String> = ids
      .iter()
      .map(|id| format!(r#""{id}":{{"id":"{id}","title":"T{id}","location":"L"}}"#))
      .collect();
    format!(
      r#"{{"message":"ok","posts":{{{}}},"totalPosts":{}}}"#,
      posts.join(","),
      ids.len()
    )
  }

  fn cached_ids(store: &StoreHandle) -> Vec<String> {
    let posts: Vec<Post> = store.get_all(POSTS).unwrap();
    posts.into_iter().map(|p| p.id).collect()
  }

  #[tokio::test]
  async fn test_list_fetch_fills_empty_read_cache() {
    let f = fixture();
    f.fetcher.route(
      "/api/posts",
      200,
      r#"{"posts":{"a":{"id":"a","title":"T"}},"totalPosts":1}"#,
    );

    let request = f.engine.request("/api/posts").unwrap();
    let mut response = f.engine.respond(&request).await.unwrap();

    assert!(response.text().unwrap().contains("\"a\""));
    let posts: Vec<Post> = f.store.get_all(POSTS).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, "a");
    assert_eq!(posts[0].title, "T");
  }

  #[tokio::test]
  async fn test_read_cache_matches_latest_payload_for_every_size() {
    let f = fixture();
    let request = f.engine.request("/api/posts").unwrap();
    let all = ["p1", "p2", "p3", "p4", "p5"];

    // Grow then shrink so deletions on the server must show up locally
    for n in (0..=all.len()).chain((0..all.len()).rev()) {
      f.fetcher.route("/api/posts", 200, list_payload(&all[..n]));
      f.engine.respond(&request).await.unwrap();

      let mut expected: Vec<String> = all[..n].iter().map(|s| s.to_string()).collect();
      expected.sort();
      assert_eq!(cached_ids(&f.store), expected, "payload of {} posts", n);
    }
  }

  #[tokio::test]
  async fn test_non_list_payload_leaves_read_cache_alone() {
    let f = fixture();
    f.fetcher.route("/api/posts", 200, list_payload(&["a", "b"]));
    f.engine.respond(&f.engine.request("/api/posts").unwrap()).await.unwrap();

    f.fetcher.route("/api/posts/a", 200, r#"{"id":"a","title":"T"}"#);
    let mut single = f
      .engine
      .respond(&f.engine.request("/api/posts/a").unwrap())
      .await
      .unwrap();
    assert!(single.text().unwrap().contains("\"T\""));

    f.fetcher.route("/api/posts", 500, "boom");
    let failed = f.engine.respond(&f.engine.request("/api/posts").unwrap()).await.unwrap();
    assert_eq!(failed.status(), 500);

    assert_eq!(cached_ids(&f.store), vec!["a", "b"]);
  }

  #[tokio::test]
  async fn test_list_fetch_offline_is_a_network_failure() {
    let f = fixture();
    f.fetcher.set_offline(true);
    let result = f.engine.respond(&f.engine.request("/api/posts").unwrap()).await;
    assert!(matches!(result, Err(e) if e.is_network()));
  }

  #[tokio::test]
  async fn test_static_assets_never_touch_the_network() {
    let f = fixture();
    let request = f.engine.request("/index.html").unwrap();

    assert!(matches!(f.engine.respond(&request).await, Err(FeedError::CacheMiss(_))));

    route_shell(&f.fetcher);
    f.engine.precache().await.unwrap();
    let calls = f.fetcher.call_count();

    let mut hit = f.engine.respond(&request).await.unwrap();
    assert_eq!(hit.text().unwrap(), "<html>index</html>");
    assert_eq!(f.fetcher.call_count(), calls);
  }

  #[tokio::test]
  async fn test_other_requests_are_cached_in_dynamic_partition() {
    let f = fixture();
    f.fetcher.route("/help", 200, "help page");
    let request = f.engine.request("/help").unwrap();

    let mut first = f.engine.respond(&request).await.unwrap();
    assert_eq!(first.text().unwrap(), "help page");

    f.fetcher.set_offline(true);
    let mut second = f.engine.respond(&request).await.unwrap();
    assert_eq!(second.text().unwrap(), "help page");
    assert_eq!(f.fetcher.call_count(), 1);

    let dynamic = f.engine.caches().open("dynamic-v2").unwrap();
    assert_eq!(dynamic.keys().unwrap(), vec!["http://localhost:3000/help"]);
  }

  #[tokio::test]
  async fn test_offline_page_only_for_html_requests() {
    let f = fixture();
    route_shell(&f.fetcher);
    f.engine.precache().await.unwrap();
    f.fetcher.set_offline(true);

    let html = f
      .engine
      .request("/help")
      .unwrap()
      .with_header("Accept", "text/html");
    let mut page = f.engine.respond(&html).await.unwrap();
    assert_eq!(page.text().unwrap(), "<html>offline</html>");

    let image = f.engine.request("/photo.png").unwrap().with_header("Accept", "image/*");
    assert!(matches!(f.engine.respond(&image).await, Err(e) if e.is_network()));
  }

  #[tokio::test]
  async fn test_error_status_is_not_cached() {
    let f = fixture();
    let request = f.engine.request("/missing.png").unwrap();

    assert!(f.engine.respond(&request).await.is_err());
    let dynamic = f.engine.caches().open("dynamic-v2").unwrap();
    assert!(dynamic.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_partial_precache_failure_stores_nothing() {
    let f = fixture();
    f.fetcher.route("/", 200, "root");
    f.fetcher.route("/index.html", 200, "index");
    // "/offline.html" unrouted: 404

    assert!(matches!(f.engine.precache().await, Err(FeedError::Install(_))));
    assert!(!f.engine.caches().has("static-v3").unwrap());

    route_shell(&f.fetcher);
    assert_eq!(f.engine.precache().await.unwrap(), 3);
    assert_eq!(f.engine.caches().open("static-v3").unwrap().len().unwrap(), 3);
  }

  #[tokio::test]
  async fn test_activation_removes_previous_generation() {
    let mut config = Config::default();
    config.caches.static_files = vec!["/".into()];
    config.caches.static_version = 2;
    config.caches.dynamic_version = 1;
    let old = fixture_with(config.clone());
    old.fetcher.route("/", 200, "old root");
    old.fetcher.route("/help", 200, "help");
    old.engine.precache().await.unwrap();
    old.engine.respond(&old.engine.request("/help").unwrap()).await.unwrap();

    // Same platform database, next generation
    config.caches.static_version = 3;
    config.caches.dynamic_version = 2;
    let new = StrategyEngine::new(
      Url::parse(ORIGIN).unwrap(),
      &config.api,
      &config.caches,
      old.engine.caches().clone(),
      Arc::clone(&old.store),
      old.fetcher.clone(),
    );
    old.fetcher.route("/", 200, "new root");
    new.precache().await.unwrap();
    new.caches().open("dynamic-v2").unwrap();

    let mut removed = new.activate().unwrap();
    removed.sort();
    assert_eq!(removed, vec!["dynamic-v1", "static-v2"]);
    assert_eq!(new.caches().keys().unwrap(), vec!["static-v3", "dynamic-v2"]);

    let mut root = new.respond(&new.request("/").unwrap()).await.unwrap();
    assert_eq!(root.text().unwrap(), "new root");
    assert!(new.activate().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_trim_on_insert_keeps_newest_entries() {
    let mut config = Config::default();
    config.caches.static_files = Vec::new();
    config.caches.max_dynamic_items = 2;
    config.caches.trim_on_insert = true;
    let f = fixture_with(config);

    for path in ["/a", "/b", "/c"] {
      f.fetcher.route(path, 200, path);
      f.engine.respond(&f.engine.request(path).unwrap()).await.unwrap();
    }

    let dynamic = f.engine.caches().open("dynamic-v2").unwrap();
    assert_eq!(
      dynamic.keys().unwrap(),
      vec!["http://localhost:3000/b", "http://localhost:3000/c"]
    );
    assert_eq!(f.engine.trim_dynamic().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_non_get_goes_straight_to_network() {
    let f = fixture();
    f.fetcher.route("/api/posts", 201, "{}");
    let request = Request::new(Method::POST, Url::parse(ORIGIN).unwrap().join("/api/posts").unwrap());

    let response = f.engine.respond(&request).await.unwrap();
    assert_eq!(response.status(), 201);
    assert!(cached_ids(&f.store).is_empty());
  }
}
