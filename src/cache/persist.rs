//! Snapshot persistence for the query cache.
//!
//! The whole cache is written to a single storage key after every change and
//! read back once at startup. Only successful entries are written.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::client::{CacheEntry, EntryStatus};
use crate::error::Result;
use crate::storage::KeyValueStore;

/// Storage key holding the cache snapshot.
pub const CACHE_KEY: &str = "query-cache";

/// Default maximum age of a snapshot, in seconds, before it is discarded on restore.
pub const DEFAULT_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Serialized form of the whole cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedClient {
  /// Version string; a snapshot with a different buster is discarded
  pub buster: String,
  /// When the snapshot was written
  pub timestamp: DateTime<Utc>,
  pub queries: Vec<PersistedQuery>,
}

/// A single persisted cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQuery {
  pub query_hash: String,
  pub data: Value,
  pub data_updated_at: DateTime<Utc>,
}

/// Writes and restores cache snapshots through a key-value store.
#[derive(Clone)]
pub struct Persister {
  storage: Arc<dyn KeyValueStore>,
  max_age: Duration,
  buster: String,
}

impl Persister {
  pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
    Self {
      storage,
      max_age: Duration::seconds(DEFAULT_MAX_AGE_SECS),
      buster: String::new(),
    }
  }

  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = max_age;
    self
  }

  pub fn with_buster(mut self, buster: impl Into<String>) -> Self {
    self.buster = buster.into();
    self
  }

  /// Write a snapshot of every successful entry.
  pub fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
    let mut queries: Vec<PersistedQuery> = entries
      .iter()
      .filter(|(_, entry)| entry.status == EntryStatus::Success)
      .filter_map(|(hash, entry)| {
        Some(PersistedQuery {
          query_hash: hash.clone(),
          data: entry.data.clone()?,
          data_updated_at: entry.data_updated_at?,
        })
      })
      .collect();
    queries.sort_by(|a, b| a.query_hash.cmp(&b.query_hash));

    let snapshot = PersistedClient {
      buster: self.buster.clone(),
      timestamp: Utc::now(),
      queries,
    };

    self
      .storage
      .set(CACHE_KEY, &serde_json::to_string(&snapshot)?)?;
    debug!(queries = snapshot.queries.len(), "persisted query cache");

    Ok(())
  }

  /// Read the snapshot back, discarding it if it is unreadable, too old, or
  /// written under a different buster.
  pub fn restore(&self, now: DateTime<Utc>) -> Result<Option<Vec<PersistedQuery>>> {
    let text = match self.storage.get(CACHE_KEY)? {
      Some(text) => text,
      None => return Ok(None),
    };

    let snapshot: PersistedClient = match serde_json::from_str(&text) {
      Ok(snapshot) => snapshot,
      Err(e) => {
        warn!(error = %e, "discarding unreadable query cache snapshot");
        self.remove()?;
        return Ok(None);
      }
    };

    if snapshot.buster != self.buster {
      debug!(
        found = %snapshot.buster,
        expected = %self.buster,
        "discarding query cache snapshot with different buster"
      );
      self.remove()?;
      return Ok(None);
    }

    if now - snapshot.timestamp > self.max_age {
      debug!(timestamp = %snapshot.timestamp, "discarding expired query cache snapshot");
      self.remove()?;
      return Ok(None);
    }

    Ok(Some(snapshot.queries))
  }

  /// Delete the stored snapshot.
  pub fn remove(&self) -> Result<()> {
    self.storage.remove(CACHE_KEY)
  }
}
