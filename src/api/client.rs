use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{FeedError, FeedResult};

use super::api_types::ApiCreatePostResponse;
use super::types::{PendingWrite, Post, Subscription};

/// Write side of the posts backend.
///
/// Reads go through the request strategies instead so they can be served
/// from cache.
#[async_trait]
pub trait PostsApi: Send + Sync {
  /// `POST /api/posts`; succeeds only once the server confirmed the post.
  async fn create_post(&self, post: &PendingWrite) -> FeedResult<Post>;

  /// `POST /api/subscriptions`
  async fn register_subscription(&self, subscription: &Subscription) -> FeedResult<()>;
}

/// Posts backend client
#[derive(Clone)]
pub struct ApiClient {
  client: reqwest::Client,
  posts_url: Url,
  subscriptions_url: Url,
}

impl ApiClient {
  pub fn new(config: &ApiConfig, client: reqwest::Client) -> FeedResult<Self> {
    let origin = Url::parse(&config.origin)?;
    Ok(Self {
      client,
      posts_url: origin.join(&config.posts_path)?,
      subscriptions_url: origin.join(&config.subscriptions_path)?,
    })
  }
}

#[async_trait]
impl PostsApi for ApiClient {
  async fn create_post(&self, post: &PendingWrite) -> FeedResult<Post> {
    let url = self.posts_url.as_str();

    let mut form = Form::new()
      .text("id", post.id.clone())
      .text("title", post.title.clone())
      .text("location", post.location.clone())
      .text("rawLocationLat", post.latitude.to_string())
      .text("rawLocationLng", post.longitude.to_string());

    if !post.image.is_empty() {
      let image = Part::bytes(post.image.clone())
        .file_name(format!("{}.png", post.id))
        .mime_str("image/png")
        .map_err(|e| FeedError::network(url, e))?;
      form = form.part("image", image);
    }

    let response = self
      .client
      .post(self.posts_url.clone())
      .multipart(form)
      .send()
      .await
      .map_err(|e| FeedError::network(url, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(FeedError::network(url, format!("server answered {}", status)));
    }

    // The post is stored at this point; an unreadable echo is not a failure
    let created = match response.json::<ApiCreatePostResponse>().await {
      Ok(body) => body.post.and_then(|p| p.into_post(None)),
      Err(e) => {
        debug!(error = %e, "Unreadable create-post response");
        None
      }
    };

    Ok(created.unwrap_or_else(|| post.to_post()))
  }

  async fn register_subscription(&self, subscription: &Subscription) -> FeedResult<()> {
    let response = self
      .client
      .post(self.subscriptions_url.clone())
      .header("Accept", "application/json")
      .json(subscription)
      .send()
      .await
      .map_err(|e| FeedError::SubscriptionRegistrationFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(FeedError::SubscriptionRegistrationFailed(format!(
        "server answered {}",
        status
      )));
    }

    Ok(())
  }
}
