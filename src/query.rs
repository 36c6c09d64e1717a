//! Async query and mutation primitives backed by the shared query cache.
//!
//! Inspired by TanStack Query, `Query<T>` encapsulates async data fetching
//! under a cache key, loading states, and error handling; `Mutation<I, O>`
//! runs writes and reconciles the cache through an explicit success callback.
//!
//! # Example
//!
//! ```ignore
//! let store = ctx.posts.clone();
//! let mut query = Query::new(ctx.client.clone(), PostsQueryKey::All, move || {
//!     let store = store.clone();
//!     async move { store.load().map_err(|e| e.to_string()) }
//! });
//!
//! // Fetch if there is no cached data or it is stale
//! query.mount();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.status() {
//!     QueryStatus::Pending => render_spinner(),
//!     QueryStatus::Success => render_data(query.data()),
//!     QueryStatus::Error => render_error(query.error()),
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::{QueryClient, QueryKey};

/// The status of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// No data yet (not started, disabled, or first fetch in flight)
  Pending,
  /// Data is available
  Success,
  /// The last fetch failed
  Error,
}

/// A boxed future that returns a Result<T, String>
type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Async query for data fetching through the query cache.
///
/// Query<T> encapsulates:
/// - The fetching logic (via a closure)
/// - Pending/success/error status with an `is_fetching` overlay
/// - Async result handling via channels
/// - Hydration from, and write-back to, the cache entry for its key
pub struct Query<T> {
  client: QueryClient,
  key: Arc<dyn QueryKey + Send + Sync>,
  status: QueryStatus,
  data: Option<T>,
  error: Option<String>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, String>>>,
  data_updated_at: Option<DateTime<Utc>>,
  enabled: bool,
}

impl<T> Query<T>
where
  T: Serialize + DeserializeOwned + Send + 'static,
{
  /// Create a new query observing `key`.
  ///
  /// If the cache already holds data for the key the query starts out
  /// successful with that data; call `mount()` to revalidate it.
  pub fn new<K, F, Fut>(client: QueryClient, key: K, fetcher: F) -> Self
  where
    K: QueryKey + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    let key: Arc<dyn QueryKey + Send + Sync> = Arc::new(key);
    client.subscribe(&key);

    let mut query = Self {
      client,
      key,
      status: QueryStatus::Pending,
      data: None,
      error: None,
      fetcher: Box::new(move || Box::pin(fetcher())),
      receiver: None,
      data_updated_at: None,
      enabled: true,
    };
    query.sync_from_cache();
    query
  }

  /// Gate the query. A disabled query never runs its fetcher and stays
  /// pending, even when the cache holds data for its key.
  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    if enabled {
      self.sync_from_cache();
    } else {
      self.status = QueryStatus::Pending;
      self.data = None;
      self.error = None;
      self.data_updated_at = None;
    }
    self
  }

  pub fn status(&self) -> QueryStatus {
    self.status
  }

  /// Get the latest data, kept across failed refetches.
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  /// Get the error message if the query failed.
  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn is_pending(&self) -> bool {
    self.status == QueryStatus::Pending
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  /// Whether a fetch is in flight, including background refetches.
  pub fn is_fetching(&self) -> bool {
    self.receiver.is_some()
  }

  /// First load: no data yet and a fetch in flight.
  pub fn is_loading(&self) -> bool {
    self.is_pending() && self.is_fetching()
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Check if the cached data for this key is stale.
  pub fn is_stale(&self) -> bool {
    self.client.is_stale(&self.key)
  }

  /// Fetch if there is no data yet or the data is stale.
  pub fn mount(&mut self) {
    if self.data.is_none() || self.is_stale() {
      self.fetch();
    }
  }

  /// Start fetching data if enabled and not already fetching.
  pub fn fetch(&mut self) {
    if !self.is_enabled() || self.is_fetching() {
      return;
    }
    self.start_fetch();
  }

  /// Force a refetch, abandoning any in-flight fetch.
  pub fn refetch(&mut self) {
    if !self.is_enabled() {
      return;
    }
    // Cancel any pending fetch by dropping the receiver
    self.receiver = None;
    self.start_fetch();
  }

  /// Poll for results from a pending fetch and for newer data written to the
  /// cache by others (e.g. optimistic updates).
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    if let Some(receiver) = &mut self.receiver {
      // Try to receive without blocking
      match receiver.try_recv() {
        Ok(Ok(data)) => {
          self.receiver = None;
          self.client.set_query_data(&self.key, &data);
          self.data_updated_at = self.client.data_updated_at(&self.key);
          self.data = Some(data);
          self.status = QueryStatus::Success;
          self.error = None;
          return true;
        }
        Ok(Err(error)) => {
          self.receiver = None;
          self.fail(error);
          return true;
        }
        Err(mpsc::error::TryRecvError::Empty) => {}
        Err(mpsc::error::TryRecvError::Disconnected) => {
          // Sender dropped without sending - treat as error
          self.receiver = None;
          self.fail("Query was cancelled".to_string());
          return true;
        }
      }
    }

    self.sync_from_cache()
  }

  fn fail(&mut self, error: String) {
    self.client.set_query_error(&self.key, &error);
    self.status = QueryStatus::Error;
    self.error = Some(error);
  }

  /// Adopt the cached data if it was written after what we hold.
  fn sync_from_cache(&mut self) -> bool {
    if !self.is_enabled() {
      return false;
    }
    let updated_at = match self.client.data_updated_at(&self.key) {
      Some(updated_at) => updated_at,
      None => return false,
    };
    if self.data_updated_at == Some(updated_at) {
      return false;
    }

    match self.client.get_query_data::<T>(&self.key) {
      Some(data) => {
        self.data = Some(data);
        self.data_updated_at = Some(updated_at);
        self.status = QueryStatus::Success;
        self.error = None;
        true
      }
      None => false,
    }
  }

  /// Internal: start the fetch operation
  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);

    let future = (self.fetcher)();
    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    self.client.unsubscribe(&self.key);
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key.description())
      .field("status", &self.status)
      .field("data", &self.data)
      .field("error", &self.error)
      .field("fetching", &self.receiver.is_some())
      .field("enabled", &self.enabled)
      .finish_non_exhaustive()
  }
}

/// The status of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
  Idle,
  Pending,
  Success,
  Error,
}

type MutateFn<I, O> = Box<dyn Fn(I) -> BoxFuture<O> + Send + Sync>;

type SuccessFn<O> = Box<dyn Fn(&O) + Send + Sync>;

/// Async write operation with an explicit success callback.
///
/// Several mutations may be in flight at once; each one that succeeds runs
/// `on_success` exactly once, in completion order, on the polling thread.
pub struct Mutation<I, O> {
  status: MutationStatus,
  data: Option<O>,
  error: Option<String>,
  mutate_fn: MutateFn<I, O>,
  on_success: Option<SuccessFn<O>>,
  in_flight: Vec<mpsc::UnboundedReceiver<Result<O, String>>>,
}

impl<I, O> Mutation<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  pub fn new<F, Fut>(mutate_fn: F) -> Self
  where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, String>> + Send + 'static,
  {
    Self {
      status: MutationStatus::Idle,
      data: None,
      error: None,
      mutate_fn: Box::new(move |input| Box::pin(mutate_fn(input))),
      on_success: None,
      in_flight: Vec::new(),
    }
  }

  /// Run `callback` with the output of every successful mutation.
  pub fn on_success<F>(mut self, callback: F) -> Self
  where
    F: Fn(&O) + Send + Sync + 'static,
  {
    self.on_success = Some(Box::new(callback));
    self
  }

  /// Current status; pending while any mutation is in flight.
  pub fn status(&self) -> MutationStatus {
    if self.in_flight.is_empty() {
      self.status
    } else {
      MutationStatus::Pending
    }
  }

  /// Output of the last successful mutation.
  pub fn data(&self) -> Option<&O> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn is_pending(&self) -> bool {
    !self.in_flight.is_empty()
  }

  pub fn is_success(&self) -> bool {
    self.status() == MutationStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status() == MutationStatus::Error
  }

  /// Start a mutation with the given input.
  pub fn mutate(&mut self, input: I) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.in_flight.push(rx);

    let future = (self.mutate_fn)(input);
    tokio::spawn(async move {
      let result = future.await;
      let _ = tx.send(result);
    });
  }

  /// Poll every in-flight mutation. Returns `true` if any of them finished.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    let mut still_running = Vec::with_capacity(self.in_flight.len());

    for mut receiver in std::mem::take(&mut self.in_flight) {
      match receiver.try_recv() {
        Ok(Ok(output)) => {
          if let Some(callback) = &self.on_success {
            callback(&output);
          }
          self.data = Some(output);
          self.status = MutationStatus::Success;
          self.error = None;
          changed = true;
        }
        Ok(Err(error)) => {
          self.status = MutationStatus::Error;
          self.error = Some(error);
          changed = true;
        }
        Err(mpsc::error::TryRecvError::Empty) => still_running.push(receiver),
        Err(mpsc::error::TryRecvError::Disconnected) => {
          self.status = MutationStatus::Error;
          self.error = Some("Mutation was cancelled".to_string());
          changed = true;
        }
      }
    }

    self.in_flight = still_running;
    changed
  }
}

impl<I, O: std::fmt::Debug> std::fmt::Debug for Mutation<I, O> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Mutation")
      .field("status", &self.status)
      .field("data", &self.data)
      .field("error", &self.error)
      .field("in_flight", &self.in_flight.len())
      .finish_non_exhaustive()
  }
}
