//! Command-line subcommands.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Precache the app shell into the static cache
  Install,
  /// Delete caches left over from earlier versions
  Activate,
  /// Send a GET through the request strategies
  Fetch {
    /// Absolute URL or a path on the origin
    url: String,
    /// Declare the request as a page navigation (Accept: text/html)
    #[arg(long)]
    html: bool,
  },
  /// Show the feed: cached posts first, then the network's
  Feed,
  /// Create a post, queueing it if the backend is unreachable
  Post {
    #[arg(long)]
    title: String,
    #[arg(long)]
    location: String,
    /// Picture to upload with the post
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
    /// Queue without trying the network first
    #[arg(long)]
    defer: bool,
  },
  /// List posts waiting to be submitted
  Queue,
  /// Replay queued posts for every pending sync registration
  Sync,
  /// Replay queued posts whenever the origin becomes reachable
  Watch,
  /// Trim the dynamic cache to its configured size
  Trim,
  /// Ask for notification permission and subscribe to push
  Subscribe,
  /// Deliver a push message and show the resulting notification
  Push {
    /// JSON payload: {"title", "content", "image", "openUrl"}
    payload: Option<String>,
    /// Click the notification's action button
    #[arg(long, conflicts_with = "click_body")]
    click: Option<String>,
    /// Click the notification itself
    #[arg(long)]
    click_body: bool,
  },
}
