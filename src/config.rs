use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub caches: CachesConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub push: PushConfig,
  #[serde(default)]
  pub notifications: NotificationConfig,
  /// Where the local store, platform database and logs live
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Origin the app is served from, e.g. "http://localhost:3000"
  pub origin: String,
  pub posts_path: String,
  pub subscriptions_path: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      posts_path: "/api/posts".to_string(),
      subscriptions_path: "/api/subscriptions".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CachesConfig {
  pub static_version: u32,
  pub dynamic_version: u32,
  /// Soft cap for the dynamic partition
  pub max_dynamic_items: usize,
  /// Run the advisory trim after every dynamic insert
  pub trim_on_insert: bool,
  pub offline_page: String,
  /// App shell: same-origin paths and absolute CDN URLs
  pub static_files: Vec<String>,
}

impl Default for CachesConfig {
  fn default() -> Self {
    Self {
      static_version: 3,
      dynamic_version: 2,
      max_dynamic_items: 20,
      trim_on_insert: false,
      offline_page: "/offline.html".to_string(),
      static_files: [
        "/",
        "/index.html",
        "/offline.html",
        "/src/js/app.js",
        "/src/js/feed.js",
        "/src/js/material.min.js",
        "/src/css/app.css",
        "/src/css/feed.css",
        "/src/images/main-image.jpg",
        "https://fonts.googleapis.com/css?family=Roboto:400,700",
        "https://fonts.googleapis.com/icon?family=Material+Icons",
        "https://cdnjs.cloudflare.com/ajax/libs/material-design-lite/1.3.0/material.indigo-pink.min.css",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub name: String,
  pub version: u32,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      name: "posts-store".to_string(),
      version: 1,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub tag: String,
  /// Whether the platform offers retry triggers at all
  pub background_sync: bool,
  /// Queue writes without trying the network first
  pub prefer_deferred: bool,
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "sync-new-posts".to_string(),
      background_sync: true,
      prefer_deferred: false,
      probe_interval_secs: 5,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushConfig {
  /// Application server (VAPID) public key, URL-safe base64
  #[serde(default)]
  pub vapid_public_key: String,
  /// Subscription details handed out by the push service for this device
  pub endpoint: Option<String>,
  pub auth: Option<String>,
  pub p256dh: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub icon: String,
  pub badge: String,
  pub lang: String,
  pub dir: String,
  pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      icon: "/src/images/icons/app-icon-96x96.png".to_string(),
      badge: "/src/images/icons/app-icon-96x96.png".to_string(),
      lang: "en-US".to_string(),
      dir: "ltr".to_string(),
      vibrate: vec![100, 50, 200],
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./feedsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/feedsync/config.yaml
  ///
  /// Without any file the defaults are used. Environment overrides are
  /// applied last.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("feedsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("feedsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// FEEDSYNC_ORIGIN and FEEDSYNC_DATA_DIR take precedence over the file.
  fn with_env_overrides(mut self) -> Self {
    if let Ok(origin) = std::env::var("FEEDSYNC_ORIGIN") {
      self.api.origin = origin;
    }
    if let Ok(dir) = std::env::var("FEEDSYNC_DATA_DIR") {
      self.data_dir = Some(PathBuf::from(dir));
    }
    self
  }

  /// Resolve the data directory, creating it if needed.
  pub fn data_dir(&self) -> Result<PathBuf> {
    let dir = match &self.data_dir {
      Some(dir) => dir.clone(),
      None => dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
        .ok_or_else(|| eyre!("Could not determine data directory"))?
        .join("feedsync"),
    };

    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create data directory {}: {}", dir.display(), e))?;

    Ok(dir)
  }
}
