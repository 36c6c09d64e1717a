use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::CacheOptions;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite database path (defaults to <data_dir>/postq/storage.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// How long unused query results stay in memory
  pub gc_time_secs: i64,
  /// How long fetched data is considered fresh
  pub stale_time_secs: i64,
  /// Maximum age of the persisted snapshot restored at startup
  pub max_age_secs: i64,
  /// Snapshot version; changing it discards the persisted cache
  pub buster: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      gc_time_secs: 24 * 60 * 60,
      stale_time_secs: 0,
      max_age_secs: 24 * 60 * 60,
      buster: String::new(),
    }
  }
}

impl CacheConfig {
  pub fn options(&self) -> Result<CacheOptions> {
    Ok(CacheOptions {
      gc_time: seconds("gc_time_secs", self.gc_time_secs)?,
      stale_time: seconds("stale_time_secs", self.stale_time_secs)?,
    })
  }

  pub fn max_age(&self) -> Result<chrono::Duration> {
    seconds("max_age_secs", self.max_age_secs)
  }
}

fn seconds(field: &str, secs: i64) -> Result<chrono::Duration> {
  chrono::Duration::try_seconds(secs)
    .ok_or_else(|| eyre!("cache.{} is out of range: {}", field, secs))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is not set
  pub level: String,
  /// Log directory (defaults to <data_dir>/postq/logs)
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./postq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/postq/config.yaml
  ///
  /// With no file found, built-in defaults are used.
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("postq.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("postq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }
}
