//! Request and response values exchanged between the page, the strategies
//! and the network.
//!
//! A response body can be read once. Anything that wants to keep a copy
//! (a cache partition, the local store) must `try_clone` before the caller
//! reads it.

use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{FeedError, FeedResult};

#[derive(Debug, Clone)]
pub struct Request {
  method: Method,
  url: Url,
  headers: Vec<(String, String)>,
  body: Option<Bytes>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn new(method: Method, mut url: Url) -> Self {
    url.set_fragment(None);
    Self {
      method,
      url,
      headers: Vec::new(),
      body: None,
    }
  }

  /// GET request for `target`, which is either absolute or relative to
  /// `origin`.
  pub fn resolve(origin: &Url, target: &str) -> FeedResult<Self> {
    let url = match Url::parse(target) {
      Ok(url) => url,
      Err(url::ParseError::RelativeUrlWithoutBase) => origin.join(target)?,
      Err(e) => return Err(e.into()),
    };
    Ok(Self::get(url))
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn headers(&self) -> &[(String, String)] {
    &self.headers
  }

  pub fn body(&self) -> Option<&Bytes> {
    self.body.as_ref()
  }

  /// Header lookup, case-insensitive on the name
  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  /// Whether the request declared it accepts an HTML document.
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .map(|accept| accept.contains("text/html"))
      .unwrap_or(false)
  }

  /// Identity used as the cache key.
  pub fn cache_key(&self) -> String {
    self.url.as_str().to_string()
  }
}

#[derive(Debug)]
pub struct Response {
  status: u16,
  url: String,
  headers: Vec<(String, String)>,
  body: Option<Bytes>,
}

impl Response {
  pub fn new(
    status: u16,
    url: impl Into<String>,
    headers: Vec<(String, String)>,
    body: impl Into<Bytes>,
  ) -> Self {
    Self {
      status,
      url: url.into(),
      headers,
      body: Some(body.into()),
    }
  }

  pub fn status(&self) -> u16 {
    self.status
  }

  /// 2xx status
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn headers(&self) -> &[(String, String)] {
    &self.headers
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  pub fn body_used(&self) -> bool {
    self.body.is_none()
  }

  /// Independent copy with its own unread body.
  pub fn try_clone(&self) -> FeedResult<Response> {
    let body = self.body.clone().ok_or(FeedError::BodyUsed)?;
    Ok(Response {
      status: self.status,
      url: self.url.clone(),
      headers: self.headers.clone(),
      body: Some(body),
    })
  }

  /// Consume the body.
  pub fn bytes(&mut self) -> FeedResult<Bytes> {
    self.body.take().ok_or(FeedError::BodyUsed)
  }

  pub fn text(&mut self) -> FeedResult<String> {
    let body = self.bytes()?;
    Ok(String::from_utf8_lossy(&body).into_owned())
  }

  pub fn json<T: DeserializeOwned>(&mut self) -> FeedResult<T> {
    let body = self.bytes()?;
    Ok(serde_json::from_slice(&body)?)
  }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
  headers
    .iter()
    .find(|(key, _)| key.eq_ignore_ascii_case(name))
    .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn origin() -> Url {
    Url::parse("http://localhost:3000").unwrap()
  }

  #[test]
  fn test_resolve_relative_and_absolute() {
    let req = Request::resolve(&origin(), "/index.html").unwrap();
    assert_eq!(req.cache_key(), "http://localhost:3000/index.html");

    let req = Request::resolve(&origin(), "https://cdn.example/font.css").unwrap();
    assert_eq!(req.cache_key(), "https://cdn.example/font.css");
  }

  #[test]
  fn test_fragment_is_not_part_of_identity() {
    let req = Request::resolve(&origin(), "/help#top").unwrap();
    assert_eq!(req.cache_key(), "http://localhost:3000/help");
  }

  #[test]
  fn test_accepts_html() {
    let req = Request::resolve(&origin(), "/help")
      .unwrap()
      .with_header("Accept", "text/html,application/xhtml+xml");
    assert!(req.accepts_html());

    let req = Request::resolve(&origin(), "/img.png")
      .unwrap()
      .with_header("accept", "image/*");
    assert!(!req.accepts_html());
    assert!(!Request::resolve(&origin(), "/x").unwrap().accepts_html());
  }

  #[test]
  fn test_cloned_body_is_readable_by_both_sides() {
    let mut original = Response::new(200, "http://x/", Vec::new(), "payload");
    let mut copy = original.try_clone().unwrap();

    assert_eq!(copy.text().unwrap(), "payload");
    assert_eq!(original.text().unwrap(), "payload");
  }

  #[test]
  fn test_body_can_only_be_read_once() {
    let mut response = Response::new(200, "http://x/", Vec::new(), "payload");
    response.bytes().unwrap();

    assert!(response.body_used());
    assert!(matches!(response.bytes(), Err(FeedError::BodyUsed)));
    assert!(matches!(response.try_clone(), Err(FeedError::BodyUsed)));
  }
}
