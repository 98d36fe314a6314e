//! Request classification.
//!
//! Rules, first match wins:
//! 1. the URL contains the posts API path -> `ApiList`
//! 2. the URL, minus our own origin, is in the static manifest -> `StaticAsset`
//! 3. anything else -> `Other`
//!
//! Same-origin manifest entries are paths, cross-origin ones (CDN assets)
//! are absolute URLs, hence the origin stripping in rule 2.

use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Posts list, reconciled with the read cache
  ApiList,
  /// App shell, served from the static partition only
  StaticAsset,
  /// Everything else, cache first with network fallback
  Other,
}

#[derive(Debug, Clone)]
pub struct Classifier {
  origin: String,
  api_path: String,
  manifest: HashSet<String>,
}

impl Classifier {
  pub fn new<I, S>(origin: &Url, api_path: impl Into<String>, manifest: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      origin: origin.origin().ascii_serialization(),
      api_path: api_path.into(),
      manifest: manifest.into_iter().map(Into::into).collect(),
    }
  }

  pub fn classify(&self, url: &str) -> RequestClass {
    if url.contains(&self.api_path) {
      return RequestClass::ApiList;
    }

    let key = url.strip_prefix(&self.origin).unwrap_or(url);
    if self.manifest.contains(key) {
      return RequestClass::StaticAsset;
    }

    RequestClass::Other
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    Classifier::new(
      &Url::parse("http://localhost:3000").unwrap(),
      "/api/posts",
      ["/", "/index.html", "https://cdn.example/font.css"],
    )
  }

  #[test]
  fn test_manifest_partition() {
    let c = classifier();
    assert_eq!(c.classify("/index.html"), RequestClass::StaticAsset);
    assert_eq!(c.classify("/api/posts"), RequestClass::ApiList);
    assert_eq!(c.classify("/random.png"), RequestClass::Other);
    assert_eq!(c.classify("https://cdn.example/font.css"), RequestClass::StaticAsset);
  }

  #[test]
  fn test_same_origin_urls_match_by_path() {
    let c = classifier();
    assert_eq!(c.classify("http://localhost:3000/"), RequestClass::StaticAsset);
    assert_eq!(c.classify("http://localhost:3000/index.html"), RequestClass::StaticAsset);
    assert_eq!(c.classify("http://localhost:3000/api/posts"), RequestClass::ApiList);
    assert_eq!(c.classify("http://localhost:3000/help"), RequestClass::Other);
  }

  #[test]
  fn test_cross_origin_urls_match_in_full() {
    let c = classifier();
    // A path that is only in the manifest as a same-origin entry
    assert_eq!(c.classify("https://cdn.example/index.html"), RequestClass::Other);
    assert_eq!(c.classify("https://cdn.example/font.css?v=2"), RequestClass::Other);
  }

  #[test]
  fn test_api_rule_wins_over_manifest() {
    let c = Classifier::new(
      &Url::parse("http://localhost:3000").unwrap(),
      "/api/posts",
      ["/api/posts"],
    );
    assert_eq!(c.classify("/api/posts"), RequestClass::ApiList);
  }
}
