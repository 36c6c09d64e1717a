//! In-memory query cache shared by every query and mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::key::QueryKey;
use super::persist::Persister;

/// Status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  Pending,
  Success,
  Error,
}

/// A single cached query result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// Last successfully fetched data, kept across later errors
  pub data: Option<Value>,
  pub data_updated_at: Option<DateTime<Utc>>,
  pub status: EntryStatus,
  pub error: Option<String>,
  /// Number of live queries observing this entry
  pub observers: usize,
  /// When the last observer went away
  pub inactive_since: Option<DateTime<Utc>>,
}

impl CacheEntry {
  pub fn new() -> Self {
    Self {
      data: None,
      data_updated_at: None,
      status: EntryStatus::Pending,
      error: None,
      observers: 0,
      inactive_since: None,
    }
  }
}

impl Default for CacheEntry {
  fn default() -> Self {
    Self::new()
  }
}

/// Retention and freshness settings.
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
  /// How long an entry with no observers is kept
  pub gc_time: Duration,
  /// How long fetched data counts as fresh
  pub stale_time: Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      gc_time: Duration::hours(24),
      stale_time: Duration::zero(),
    }
  }
}

/// Shared handle to the query cache.
///
/// Every change to the cache contents is mirrored to the persister, if one is
/// configured. Observer bookkeeping is not persisted.
#[derive(Clone)]
pub struct QueryClient {
  entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
  options: CacheOptions,
  persister: Option<Persister>,
}

impl QueryClient {
  /// Create an empty, non-persistent cache.
  pub fn new(options: CacheOptions) -> Self {
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
      options,
      persister: None,
    }
  }

  /// Create a cache restored from the persister's snapshot.
  ///
  /// Restoration is synchronous; a missing or discarded snapshot yields an
  /// empty cache.
  pub fn restore(options: CacheOptions, persister: Persister) -> Self {
    Self::restore_at(options, persister, Utc::now())
  }

  pub fn restore_at(options: CacheOptions, persister: Persister, now: DateTime<Utc>) -> Self {
    let mut entries = HashMap::new();

    match persister.restore(now) {
      Ok(Some(queries)) => {
        for query in queries {
          entries.insert(
            query.query_hash,
            CacheEntry {
              data: Some(query.data),
              data_updated_at: Some(query.data_updated_at),
              status: EntryStatus::Success,
              error: None,
              observers: 0,
              inactive_since: Some(now),
            },
          );
        }
        info!(queries = entries.len(), "restored query cache");
      }
      Ok(None) => debug!("no query cache snapshot to restore"),
      Err(e) => warn!(error = %e, "failed to restore query cache"),
    }

    Self {
      entries: Arc::new(Mutex::new(entries)),
      options,
      persister: Some(persister),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn persist(&self, entries: &HashMap<String, CacheEntry>) {
    if let Some(persister) = &self.persister {
      if let Err(e) = persister.persist(entries) {
        warn!(error = %e, "failed to persist query cache");
      }
    }
  }

  /// Snapshot of the entry for `key`.
  pub fn get_entry(&self, key: &impl QueryKey) -> Option<CacheEntry> {
    self.lock().get(&key.cache_hash()).cloned()
  }

  /// Cached data for `key`, if present and of the expected shape.
  pub fn get_query_data<T: DeserializeOwned>(&self, key: &impl QueryKey) -> Option<T> {
    let entries = self.lock();
    let data = entries.get(&key.cache_hash())?.data.clone()?;
    serde_json::from_value(data).ok()
  }

  /// When the data for `key` was last written.
  pub fn data_updated_at(&self, key: &impl QueryKey) -> Option<DateTime<Utc>> {
    self.lock().get(&key.cache_hash())?.data_updated_at
  }

  /// Store fresh data for `key` and mark it successful.
  pub fn set_query_data<T: Serialize>(&self, key: &impl QueryKey, data: &T) {
    let value = match serde_json::to_value(data) {
      Ok(value) => value,
      Err(e) => {
        warn!(query = %key.description(), error = %e, "failed to serialize query data");
        return;
      }
    };

    let mut entries = self.lock();
    let entry = entries.entry(key.cache_hash()).or_default();
    entry.data = Some(value);
    entry.data_updated_at = Some(Utc::now());
    entry.status = EntryStatus::Success;
    entry.error = None;
    debug!(query = %key.description(), "updated query data");

    self.persist(&entries);
  }

  /// Apply `update` to the cached data for `key`.
  ///
  /// The updater receives the current data (or `None`). Returning `None`
  /// leaves the entry untouched. Returns whether the entry was updated.
  pub fn update_query_data<T, F>(&self, key: &impl QueryKey, update: F) -> bool
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Option<T>) -> Option<T>,
  {
    let current = self.get_query_data::<T>(key);
    match update(current) {
      Some(next) => {
        self.set_query_data(key, &next);
        true
      }
      None => false,
    }
  }

  /// Record a failed fetch for `key`, keeping any previous data.
  pub fn set_query_error(&self, key: &impl QueryKey, error: &str) {
    let mut entries = self.lock();
    let entry = entries.entry(key.cache_hash()).or_default();
    entry.status = EntryStatus::Error;
    entry.error = Some(error.to_string());
    debug!(query = %key.description(), error, "query failed");

    self.persist(&entries);
  }

  /// Whether `key` needs refetching: no data yet, or older than the stale time.
  pub fn is_stale(&self, key: &impl QueryKey) -> bool {
    match self.data_updated_at(key) {
      Some(updated_at) => Utc::now() - updated_at >= self.options.stale_time,
      None => true,
    }
  }

  /// Register an observer for `key`, creating a pending entry if needed.
  pub fn subscribe(&self, key: &impl QueryKey) {
    let mut entries = self.lock();
    let entry = entries.entry(key.cache_hash()).or_default();
    entry.observers += 1;
    entry.inactive_since = None;
  }

  /// Drop an observer for `key`; the entry becomes inactive when none remain.
  pub fn unsubscribe(&self, key: &impl QueryKey) {
    let mut entries = self.lock();
    if let Some(entry) = entries.get_mut(&key.cache_hash()) {
      entry.observers = entry.observers.saturating_sub(1);
      if entry.observers == 0 {
        entry.inactive_since = Some(Utc::now());
      }
    }
  }

  /// Remove entries that have been inactive for longer than the gc time.
  /// Returns the number of removed entries.
  pub fn collect_garbage(&self, now: DateTime<Utc>) -> usize {
    let gc_time = self.options.gc_time;
    let mut entries = self.lock();
    let before = entries.len();

    entries.retain(|_, entry| match entry.inactive_since {
      Some(since) if entry.observers == 0 => now - since <= gc_time,
      _ => true,
    });

    let removed = before - entries.len();
    if removed > 0 {
      info!(removed, "collected inactive queries");
      self.persist(&entries);
    }
    removed
  }

  /// Drop every entry and the persisted snapshot.
  pub fn clear(&self) {
    self.lock().clear();
    if let Some(persister) = &self.persister {
      if let Err(e) = persister.remove() {
        warn!(error = %e, "failed to remove query cache snapshot");
      }
    }
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::{KeyValueStore, MemoryStore};
  use crate::cache::persist::CACHE_KEY;

  struct TestKey(&'static str);

  impl QueryKey for TestKey {
    fn cache_hash(&self) -> String {
      format!("[\"{}\"]", self.0)
    }

    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  #[test]
  fn test_set_and_get_query_data() {
    let client = QueryClient::new(CacheOptions::default());
    assert_eq!(client.get_query_data::<Vec<i32>>(&TestKey("nums")), None);

    client.set_query_data(&TestKey("nums"), &vec![1, 2, 3]);

    assert_eq!(
      client.get_query_data::<Vec<i32>>(&TestKey("nums")),
      Some(vec![1, 2, 3])
    );
    let entry = client.get_entry(&TestKey("nums")).unwrap();
    assert_eq!(entry.status, EntryStatus::Success);
    assert!(entry.data_updated_at.is_some());
  }

  #[test]
  fn test_update_query_data() {
    let client = QueryClient::new(CacheOptions::default());

    // Nothing cached: updater declines
    let updated = client.update_query_data::<Vec<i32>, _>(&TestKey("nums"), |old| {
      old.map(|mut v| {
        v.push(4);
        v
      })
    });
    assert!(!updated);
    assert!(client.get_entry(&TestKey("nums")).is_none());

    client.set_query_data(&TestKey("nums"), &vec![1]);
    let updated = client.update_query_data::<Vec<i32>, _>(&TestKey("nums"), |old| {
      old.map(|mut v| {
        v.push(4);
        v
      })
    });
    assert!(updated);
    assert_eq!(
      client.get_query_data::<Vec<i32>>(&TestKey("nums")),
      Some(vec![1, 4])
    );
  }

  #[test]
  fn test_error_keeps_previous_data() {
    let client = QueryClient::new(CacheOptions::default());
    client.set_query_data(&TestKey("nums"), &vec![1]);
    client.set_query_error(&TestKey("nums"), "boom");

    let entry = client.get_entry(&TestKey("nums")).unwrap();
    assert_eq!(entry.status, EntryStatus::Error);
    assert_eq!(entry.error.as_deref(), Some("boom"));
    assert_eq!(
      client.get_query_data::<Vec<i32>>(&TestKey("nums")),
      Some(vec![1])
    );
  }

  #[test]
  fn test_staleness() {
    let client = QueryClient::new(CacheOptions::default());
    assert!(client.is_stale(&TestKey("a")));

    // Zero stale time: fresh data is immediately stale
    client.set_query_data(&TestKey("a"), &1);
    assert!(client.is_stale(&TestKey("a")));

    let client = QueryClient::new(CacheOptions {
      stale_time: Duration::minutes(5),
      ..CacheOptions::default()
    });
    client.set_query_data(&TestKey("a"), &1);
    assert!(!client.is_stale(&TestKey("a")));
  }

  #[test]
  fn test_gc_only_removes_long_inactive_entries() {
    let client = QueryClient::new(CacheOptions::default());

    client.subscribe(&TestKey("active"));
    client.set_query_data(&TestKey("active"), &1);

    client.subscribe(&TestKey("inactive"));
    client.set_query_data(&TestKey("inactive"), &2);
    client.unsubscribe(&TestKey("inactive"));

    let now = Utc::now();
    assert_eq!(client.collect_garbage(now + Duration::hours(23)), 0);
    assert_eq!(client.collect_garbage(now + Duration::hours(25)), 1);

    assert!(client.get_entry(&TestKey("inactive")).is_none());
    assert!(client.get_entry(&TestKey("active")).is_some());
  }

  #[test]
  fn test_resubscribe_clears_inactive_marker() {
    let client = QueryClient::new(CacheOptions::default());
    client.subscribe(&TestKey("a"));
    client.unsubscribe(&TestKey("a"));
    client.subscribe(&TestKey("a"));

    let entry = client.get_entry(&TestKey("a")).unwrap();
    assert_eq!(entry.observers, 1);
    assert!(entry.inactive_since.is_none());
    assert_eq!(client.collect_garbage(Utc::now() + Duration::days(30)), 0);
  }

  #[test]
  fn test_every_change_is_persisted_and_restored() {
    let storage = Arc::new(MemoryStore::new());

    let client = QueryClient::restore(CacheOptions::default(), Persister::new(storage.clone()));
    assert!(client.is_empty());

    client.set_query_data(&TestKey("nums"), &vec![1, 2]);
    assert!(storage.get(CACHE_KEY).unwrap().is_some());

    let restored = QueryClient::restore(CacheOptions::default(), Persister::new(storage.clone()));
    assert_eq!(
      restored.get_query_data::<Vec<i32>>(&TestKey("nums")),
      Some(vec![1, 2])
    );
    let entry = restored.get_entry(&TestKey("nums")).unwrap();
    assert_eq!(entry.observers, 0);
    assert_eq!(entry.status, EntryStatus::Success);
  }

  #[test]
  fn test_restored_entries_are_collected_after_gc_time() {
    let storage = Arc::new(MemoryStore::new());
    let client = QueryClient::restore(CacheOptions::default(), Persister::new(storage.clone()));
    client.set_query_data(&TestKey("nums"), &vec![1]);

    let now = Utc::now();
    let restored =
      QueryClient::restore_at(CacheOptions::default(), Persister::new(storage.clone()), now);
    assert_eq!(restored.collect_garbage(now + Duration::hours(25)), 1);

    // The collection is mirrored to storage too
    let again = QueryClient::restore(CacheOptions::default(), Persister::new(storage));
    assert!(again.is_empty());
  }

  #[test]
  fn test_clear_removes_snapshot() {
    let storage = Arc::new(MemoryStore::new());
    let client = QueryClient::restore(CacheOptions::default(), Persister::new(storage.clone()));
    client.set_query_data(&TestKey("nums"), &vec![1]);

    client.clear();

    assert!(client.is_empty());
    assert_eq!(storage.get(CACHE_KEY).unwrap(), None);
  }
}
