//! Remote fetch capability.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FeedError, FeedResult};
use crate::http::{Request, Response};

/// Something that can put a request on the network.
///
/// Resolves with the server's response whatever its status; fails with
/// `NetworkFailure` only when no response was obtained.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request) -> FeedResult<Response>;
}

/// Fetcher backed by a reqwest client
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> FeedResult<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| FeedError::network("client", e))?;
    Ok(Self { client })
  }

  pub fn client(&self) -> &reqwest::Client {
    &self.client
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> FeedResult<Response> {
    let mut builder = self
      .client
      .request(request.method().clone(), request.url().clone());
    for (name, value) in request.headers() {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body() {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| FeedError::network(request.url().as_str(), e))?;

    let status = response.status().as_u16();
    let url = response.url().to_string();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| FeedError::network(request.url().as_str(), e))?;

    debug!(url = %request.url(), status, bytes = body.len(), "Fetched");
    Ok(Response::new(status, url, headers, body))
  }
}
