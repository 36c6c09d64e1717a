//! File logging. The terminal belongs to the UI, so logs go to a daily
//! rolling file instead of stdout.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Default log directory: `<data_dir>/postq/logs`.
fn default_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|dir| dir.join("postq").join("logs"))
}

/// Install the global subscriber.
///
/// The returned guard flushes buffered lines on drop and must be held for the
/// lifetime of the program.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
  let dir = config
    .dir
    .clone()
    .or_else(default_dir)
    .ok_or_else(|| eyre!("Could not determine log directory"))?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "postq.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  // RUST_LOG wins over the configured level
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(
      fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
