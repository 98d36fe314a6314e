mod api;
mod app;
mod cache;
mod classify;
mod commands;
mod config;
mod db;
mod error;
mod fetch;
mod http;
mod logging;
mod notify;
mod page;
mod store;
mod strategy;
mod sync;
mod worker;

#[cfg(test)]
mod testing;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "feedsync")]
#[command(about = "Offline cache and background sync for a posts feed")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/feedsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin the app is served from
  #[arg(short, long)]
  origin: Option<String>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config {
      api: config::ApiConfig {
        origin,
        ..config.api
      },
      ..config
    }
  } else {
    config
  };

  let data_dir = config.data_dir()?;
  let _log_guard = logging::init(&data_dir)?;

  let app = app::App::new(config, &data_dir).await?;
  app.run(args.command).await?;

  Ok(())
}
