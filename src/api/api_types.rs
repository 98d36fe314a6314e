//! Wire formats of the posts backend.
//!
//! The backend is loose about shapes: list payloads carry `posts` either as
//! an id-keyed mapping or as an array, ids may be strings or numbers and
//! coordinates may arrive as strings. Everything is normalised into
//! [`Post`] here.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::Post;

/// Body of `GET /api/posts`
#[derive(Debug, Deserialize)]
pub struct ApiPostsResponse {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub posts: Option<ApiPosts>,
  #[serde(default, rename = "totalPosts")]
  pub total_posts: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiPosts {
  ById(BTreeMap<String, ApiPost>),
  List(Vec<ApiPost>),
}

/// Body of `POST /api/posts`
#[derive(Debug, Deserialize)]
pub struct ApiCreatePostResponse {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub post: Option<ApiPost>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPost {
  #[serde(default, deserialize_with = "lenient_id")]
  pub id: Option<String>,
  #[serde(default, rename = "_id", deserialize_with = "lenient_id")]
  pub object_id: Option<String>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub location: String,
  #[serde(default)]
  pub image: String,
  #[serde(default, rename = "rawLocationLat", deserialize_with = "lenient_f64")]
  pub raw_location_lat: f64,
  #[serde(default, rename = "rawLocationLng", deserialize_with = "lenient_f64")]
  pub raw_location_lng: f64,
}

impl ApiPost {
  /// Convert to a cache item. `fallback_id` is the mapping key, if any.
  pub fn into_post(self, fallback_id: Option<&str>) -> Option<Post> {
    let id = self
      .id
      .or(self.object_id)
      .or_else(|| fallback_id.map(String::from))?;

    Some(Post {
      id,
      title: self.title,
      location: self.location,
      image_url: self.image,
      latitude: self.raw_location_lat,
      longitude: self.raw_location_lng,
    })
  }
}

impl ApiPostsResponse {
  /// The posts of a list payload, or `None` if this is not a list payload.
  pub fn into_posts(self) -> Option<Vec<Post>> {
    let posts = match self.posts? {
      ApiPosts::ById(map) => map
        .into_iter()
        .filter_map(|(key, post)| post.into_post(Some(&key)))
        .collect(),
      ApiPosts::List(list) => list
        .into_iter()
        .filter_map(|post| post.into_post(None))
        .collect(),
    };
    Some(posts)
  }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
  Ok(match Value::deserialize(deserializer)? {
    Value::String(s) if !s.is_empty() => Some(s),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  })
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
  Ok(match Value::deserialize(deserializer)? {
    Value::Number(n) => n.as_f64().unwrap_or(0.0),
    Value::String(s) => s.trim().parse().unwrap_or(0.0),
    _ => 0.0,
  })
}
