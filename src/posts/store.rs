//! The local record store: one JSON array of posts under one storage key.

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::types::{Post, PostId};
use crate::error::{Error, Result};
use crate::storage::KeyValueStore;

/// Storage key holding the serialized post collection.
pub const POSTS_KEY: &str = "posts";

/// Serialized form of an empty collection.
const EMPTY_COLLECTION: &str = "[]";

/// Handle to the stored post collection.
///
/// Cloning is cheap; clones share the same storage and append lock.
#[derive(Clone)]
pub struct PostStore {
  storage: Arc<dyn KeyValueStore>,
  /// Serializes read-modify-write sequences within this process.
  append_lock: Arc<Mutex<()>>,
}

impl PostStore {
  pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
    Self {
      storage,
      append_lock: Arc::new(Mutex::new(())),
    }
  }

  /// Raw stored text, or `None` if nothing has ever been stored.
  pub fn read(&self) -> Result<Option<String>> {
    self.storage.get(POSTS_KEY)
  }

  /// Raw stored text, initializing the store to an empty collection first if absent.
  pub fn read_or_init(&self) -> Result<String> {
    match self.read()? {
      Some(text) => Ok(text),
      None => {
        info!("initializing empty post collection");
        self.write(EMPTY_COLLECTION)?;
        Ok(EMPTY_COLLECTION.to_string())
      }
    }
  }

  /// Replace the stored text.
  pub fn write(&self, serialized: &str) -> Result<()> {
    self.storage.set(POSTS_KEY, serialized)
  }

  /// Load every stored post in insertion order.
  pub fn load(&self) -> Result<Vec<Post>> {
    let text = self.read_or_init()?;
    Ok(serde_json::from_str(&text)?)
  }

  /// Find the first post with the given id.
  ///
  /// A missing id is `Ok(None)`; a store that was never initialized is an error.
  pub fn find(&self, id: PostId) -> Result<Option<Post>> {
    let text = self.read()?.ok_or(Error::NoPosts)?;
    let posts: Vec<Post> = serde_json::from_str(&text)?;
    Ok(posts.into_iter().find(|p| p.id == id))
  }

  /// Append a post and write the whole collection back.
  pub fn append(&self, post: &Post) -> Result<()> {
    let _guard = self.append_lock.lock().map_err(|_| Error::LockPoisoned)?;

    let mut posts: Vec<Post> = match self.read()? {
      Some(text) => serde_json::from_str(&text)?,
      None => Vec::new(),
    };

    if posts.iter().any(|p| p.id == post.id) {
      debug!(id = %post.id, "appending post with duplicate id");
    }

    posts.push(post.clone());
    self.write(&serde_json::to_string(&posts)?)?;
    debug!(id = %post.id, count = posts.len(), "appended post");

    Ok(())
  }

  /// Remove the stored collection entirely.
  pub fn clear(&self) -> Result<()> {
    self.storage.remove(POSTS_KEY)
  }
}
