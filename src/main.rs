mod app;
mod cache;
mod config;
mod context;
mod error;
mod event;
mod logging;
mod posts;
mod query;
mod storage;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cache::Persister;
use crate::context::DataContext;
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "postq")]
#[command(about = "A terminal posts browser backed by a persistent local query cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/postq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the storage database
  #[arg(short, long, conflicts_with = "in_memory")]
  storage: Option<PathBuf>,

  /// Keep everything in memory; nothing survives a restart
  #[arg(long)]
  in_memory: bool,

  /// Clear stored posts and the cached queries before starting
  #[arg(long)]
  reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  // Open storage
  let (storage, label): (Arc<dyn KeyValueStore>, String) = if args.in_memory {
    (Arc::new(MemoryStore::new()), "in-memory".to_string())
  } else {
    let path = args
      .storage
      .or_else(|| config.storage.path.clone())
      .or_else(SqliteStore::default_path)
      .ok_or_else(|| eyre!("Could not determine storage location"))?;
    let store = SqliteStore::open(&path)?;
    (Arc::new(store), path.display().to_string())
  };
  info!(storage = %label, "starting");

  let persister = Persister::new(storage.clone())
    .with_max_age(config.cache.max_age()?)
    .with_buster(config.cache.buster.clone());

  // Restores the query cache synchronously, before the first frame
  let ctx = DataContext::new(storage, config.cache.options()?, persister);

  if args.reset {
    info!("resetting stored posts and query cache");
    ctx.posts.clear()?;
    ctx.client.clear();
  }

  let mut app = app::App::new(ctx, label);
  app.run().await?;

  Ok(())
}
