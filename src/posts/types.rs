use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound (inclusive) for randomly generated post ids.
pub const MAX_RANDOM_ID: i64 = 99_999;

/// Post identifier.
///
/// Ids are expected to be unique but nothing checks it: randomly generated
/// posts can collide with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl fmt::Display for PostId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

/// A post record as stored under the `posts` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
  pub id: PostId,
  pub title: String,
  pub body: String,
}

impl Post {
  pub fn new(id: PostId, title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      id,
      title: title.into(),
      body: body.into(),
    }
  }

  /// Generate a post with a random id in `0..=99999`.
  pub fn random() -> Self {
    let id = PostId(rand::rng().random_range(0..=MAX_RANDOM_ID));
    Self::new(id, format!("hello {}", id), "yoo")
  }
}
