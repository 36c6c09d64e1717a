//! Query key abstraction.

/// Logical identity of a cached query.
///
/// Implementors turn a key into a stable hash that the cache and its
/// persisted snapshot index entries by.
pub trait QueryKey {
  /// Stable identity used as the cache map key.
  fn cache_hash(&self) -> String;

  /// Human-readable description for logs.
  fn description(&self) -> String;
}

impl<K: QueryKey + ?Sized> QueryKey for std::sync::Arc<K> {
  fn cache_hash(&self) -> String {
    (**self).cache_hash()
  }

  fn description(&self) -> String {
    (**self).description()
  }
}
