use thiserror::Error;

/// Errors raised by storage, the post store and cache persistence.
#[derive(Error, Debug)]
pub enum Error {
  #[error("Failed to parse stored posts: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("No posts have been stored yet")]
  NoPosts,

  #[error("Storage error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Storage lock poisoned")]
  LockPoisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
