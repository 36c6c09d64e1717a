//! Synchronous key-value storage.
//!
//! This is the local persistence layer everything else sits on: the post
//! collection and the query cache snapshot each live under a single string key.
//! Reads and writes are plain blocking calls; callers that need a
//! read-modify-write sequence must bring their own lock.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;

/// A string-to-string store with local-storage semantics.
pub trait KeyValueStore: Send + Sync {
  /// Get the value stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}
