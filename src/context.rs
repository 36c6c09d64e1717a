use std::sync::Arc;

use crate::cache::{CacheOptions, Persister, QueryClient};
use crate::posts::PostStore;
use crate::storage::KeyValueStore;

/// Everything the data hooks need, passed explicitly to views.
///
/// The post store and the query cache share one storage backend under
/// different keys.
#[derive(Clone)]
pub struct DataContext {
  pub posts: PostStore,
  pub client: QueryClient,
}

impl DataContext {
  /// Build a context over `storage`, restoring the query cache from it.
  pub fn new(storage: Arc<dyn KeyValueStore>, options: CacheOptions, persister: Persister) -> Self {
    Self {
      posts: PostStore::new(storage),
      client: QueryClient::restore(options, persister),
    }
  }

  /// Non-persistent context with default cache options.
  #[cfg(test)]
  pub fn in_memory() -> Self {
    let storage: Arc<dyn KeyValueStore> = Arc::new(crate::storage::MemoryStore::new());
    Self::new(
      storage.clone(),
      CacheOptions::default(),
      Persister::new(storage),
    )
  }
}
