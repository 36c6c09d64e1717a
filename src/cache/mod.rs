//! Query cache with snapshot persistence.
//!
//! This module provides a domain-agnostic cache that:
//! - Stores query results keyed by a `QueryKey` hash
//! - Tracks freshness (`data_updated_at`) and status per entry
//! - Counts observers and garbage-collects entries unused for the gc time
//! - Mirrors itself to storage on every change and restores synchronously at startup

mod client;
mod key;
mod persist;

pub use client::{CacheEntry, CacheOptions, EntryStatus, QueryClient};
pub use key::QueryKey;
pub use persist::{Persister, CACHE_KEY};
