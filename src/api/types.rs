use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FeedError, FeedResult};

/// A post as kept in the read cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
  pub id: String,
  pub title: String,
  pub location: String,
  #[serde(rename = "image")]
  pub image_url: String,
  #[serde(rename = "rawLocationLat")]
  pub latitude: f64,
  #[serde(rename = "rawLocationLng")]
  pub longitude: f64,
}

/// Post the user is about to submit
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
  pub title: String,
  pub location: String,
  pub image: Vec<u8>,
  pub latitude: f64,
  pub longitude: f64,
}

impl PostDraft {
  pub fn new(title: impl Into<String>, location: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      location: location.into(),
      ..Default::default()
    }
  }

  pub fn with_image(mut self, image: Vec<u8>) -> Self {
    self.image = image;
    self
  }

  pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
    self.latitude = latitude;
    self.longitude = longitude;
    self
  }

  /// Title and location are required
  pub fn validate(&self) -> FeedResult<()> {
    if self.title.trim().is_empty() {
      return Err(FeedError::InvalidDraft("title is empty".to_string()));
    }
    if self.location.trim().is_empty() {
      return Err(FeedError::InvalidDraft("location is empty".to_string()));
    }
    Ok(())
  }

  /// Stamp the draft with a client-generated id
  pub fn into_pending(self) -> PendingWrite {
    PendingWrite {
      id: PendingWrite::new_id(),
      title: self.title,
      location: self.location,
      image: self.image,
      latitude: self.latitude,
      longitude: self.longitude,
    }
  }
}

/// A post waiting in the write-ahead queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
  /// ISO-8601 timestamp of when the post was created on this device
  pub id: String,
  pub title: String,
  pub location: String,
  #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
  pub image: Vec<u8>,
  pub latitude: f64,
  pub longitude: f64,
}

impl PendingWrite {
  pub fn new_id() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
  }

  /// Local stand-in for the server record when the server echoed none
  pub fn to_post(&self) -> Post {
    Post {
      id: self.id.clone(),
      title: self.title.clone(),
      location: self.location.clone(),
      image_url: String::new(),
      latitude: self.latitude,
      longitude: self.longitude,
    }
  }
}

/// Push subscription of this device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub endpoint: String,
  pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
  pub auth: String,
  pub p256dh: String,
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_str(&STANDARD.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
  let encoded = String::deserialize(deserializer)?;
  STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}
