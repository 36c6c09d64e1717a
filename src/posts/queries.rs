//! Data access hooks for posts.
//!
//! Each read goes through the query cache under its own key. The list and the
//! per-id entries are independent: appending to the list never touches a
//! cached single post.

use tracing::info;

use super::types::{Post, PostId};
use crate::cache::{QueryClient, QueryKey};
use crate::context::DataContext;
use crate::error::Result;
use crate::query::{Mutation, Query};

// ============================================================================
// Query key types
// ============================================================================

/// Query keys for post reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostsQueryKey {
  /// Every stored post
  All,
  /// A single post by id
  Detail(PostId),
}

impl QueryKey for PostsQueryKey {
  fn cache_hash(&self) -> String {
    match self {
      Self::All => r#"["posts"]"#.to_string(),
      Self::Detail(id) => format!(r#"["post",{}]"#, id),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::All => "all posts".to_string(),
      Self::Detail(id) => format!("post {}", id),
    }
  }
}

// ============================================================================
// Hooks
// ============================================================================

/// Run a store call on the blocking pool; storage access may hit SQLite.
async fn blocking<T, F>(call: F) -> std::result::Result<T, String>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T> + Send + 'static,
{
  tokio::task::spawn_blocking(call)
    .await
    .map_err(|e| e.to_string())?
    .map_err(|e| e.to_string())
}

/// List every post, initializing the store on first run.
pub fn posts_query(ctx: &DataContext) -> Query<Vec<Post>> {
  let store = ctx.posts.clone();
  let mut query = Query::new(ctx.client.clone(), PostsQueryKey::All, move || {
    let store = store.clone();
    async move { blocking(move || store.load()).await }
  });
  query.mount();
  query
}

/// Get a single post. Disabled while `id` is `None`.
///
/// A missing post resolves to `Ok(None)`; only a store that was never
/// initialized is an error.
pub fn post_query(ctx: &DataContext, id: Option<PostId>) -> Query<Option<Post>> {
  let store = ctx.posts.clone();
  // A disabled query still needs a key; it never fetches under it.
  let key = PostsQueryKey::Detail(id.unwrap_or(PostId(0)));
  let mut query = Query::new(ctx.client.clone(), key, move || {
    let store = store.clone();
    async move {
      match id {
        Some(id) => blocking(move || store.find(id)).await,
        None => Ok(None),
      }
    }
  })
  .enabled(id.is_some());
  query.mount();
  query
}

/// Append a post to the store, then optimistically append it to the cached list.
pub fn add_post_mutation(ctx: &DataContext) -> Mutation<Post, Post> {
  let store = ctx.posts.clone();
  let client = ctx.client.clone();
  Mutation::new(move |post: Post| {
    let store = store.clone();
    async move {
      let written = post.clone();
      blocking(move || store.append(&written)).await?;
      Ok::<_, String>(post)
    }
  })
  .on_success(move |post| {
    apply_created_post(&client, post);
  })
}

/// Reconcile the cached post list with a post that was just written.
///
/// Appends to whatever list is cached without re-reading storage. When no list
/// is cached there is nothing to reconcile; the next list fetch reads storage.
pub fn apply_created_post(client: &QueryClient, post: &Post) -> bool {
  let updated = client.update_query_data::<Vec<Post>, _>(&PostsQueryKey::All, |old| {
    old.map(|mut posts| {
      posts.push(post.clone());
      posts
    })
  });
  info!(id = %post.id, cached = updated, "added post");
  updated
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::posts::store::POSTS_KEY;
  use crate::storage::{KeyValueStore, MemoryStore};
  use std::sync::Arc;
  use std::time::Duration;

  fn context() -> (Arc<MemoryStore>, DataContext) {
    let storage = Arc::new(MemoryStore::new());
    let ctx = DataContext {
      posts: crate::posts::PostStore::new(storage.clone()),
      client: QueryClient::new(Default::default()),
    };
    (storage, ctx)
  }

  async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
      if done() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  }

  #[test]
  fn test_query_key_hashes() {
    assert_eq!(PostsQueryKey::All.cache_hash(), r#"["posts"]"#);
    assert_eq!(PostsQueryKey::Detail(PostId(5)).cache_hash(), r#"["post",5]"#);
    assert_ne!(
      PostsQueryKey::Detail(PostId(1)).cache_hash(),
      PostsQueryKey::Detail(PostId(11)).cache_hash()
    );
  }

  #[tokio::test]
  async fn test_list_initializes_absent_store() {
    let (storage, ctx) = context();

    let mut query = posts_query(&ctx);
    settle(|| query.poll()).await;

    assert!(query.is_success());
    assert_eq!(query.data(), Some(&Vec::new()));
    assert_eq!(storage.get(POSTS_KEY).unwrap().as_deref(), Some("[]"));
  }

  #[tokio::test]
  async fn test_list_surfaces_parse_error() {
    let (storage, ctx) = context();
    storage.set(POSTS_KEY, "definitely not json").unwrap();

    let mut query = posts_query(&ctx);
    settle(|| query.poll()).await;

    assert!(query.is_error());
    assert!(!query.error().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_get_post_by_id() {
    let (storage, ctx) = context();
    storage
      .set(POSTS_KEY, r#"[{"id":1,"title":"a","body":"b"}]"#)
      .unwrap();

    let mut query = post_query(&ctx, Some(PostId(1)));
    settle(|| query.poll()).await;

    assert!(query.is_success());
    assert_eq!(query.data(), Some(&Some(Post::new(PostId(1), "a", "b"))));
  }

  #[tokio::test]
  async fn test_get_missing_post_is_success() {
    let (storage, ctx) = context();
    storage
      .set(POSTS_KEY, r#"[{"id":1,"title":"a","body":"b"}]"#)
      .unwrap();

    let mut query = post_query(&ctx, Some(PostId(2)));
    settle(|| query.poll()).await;

    assert!(query.is_success());
    assert_eq!(query.data(), Some(&None));
  }

  #[tokio::test]
  async fn test_get_post_without_store_is_error() {
    let (_storage, ctx) = context();

    let mut query = post_query(&ctx, Some(PostId(1)));
    settle(|| query.poll()).await;

    assert!(query.is_error());
    assert!(!query.error().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_post_query_disabled_without_id() {
    let (_storage, ctx) = context();

    let mut query = post_query(&ctx, None);
    tokio::time::sleep(Duration::from_millis(20)).await;
    query.poll();

    assert!(!query.is_enabled());
    assert!(query.is_pending());
    assert!(!query.is_fetching());
  }

  #[tokio::test]
  async fn test_post_query_without_id_ignores_cached_post_zero() {
    let (_storage, ctx) = context();
    let zero = Post::new(PostId(0), "zero", "");
    ctx
      .client
      .set_query_data(&PostsQueryKey::Detail(PostId(0)), &Some(zero));

    let mut query = post_query(&ctx, None);
    assert!(query.is_pending());
    assert_eq!(query.data(), None);

    query.poll();
    assert!(query.is_pending());
    assert_eq!(query.data(), None);
  }

  #[tokio::test]
  async fn test_post_query_id_zero_is_enabled() {
    let (storage, ctx) = context();
    storage
      .set(POSTS_KEY, r#"[{"id":0,"title":"zero","body":""}]"#)
      .unwrap();

    let mut query = post_query(&ctx, Some(PostId(0)));
    assert!(query.is_enabled());
    settle(|| query.poll()).await;

    assert_eq!(query.data().unwrap().as_ref().unwrap().title, "zero");
  }

  #[tokio::test]
  async fn test_add_post_updates_store_and_cached_list() {
    let (storage, ctx) = context();
    storage
      .set(POSTS_KEY, r#"[{"id":1,"title":"a","body":"b"}]"#)
      .unwrap();

    let mut list = posts_query(&ctx);
    settle(|| list.poll()).await;
    assert_eq!(list.data().unwrap().len(), 1);

    let mut add = add_post_mutation(&ctx);
    add.mutate(Post::new(PostId(2), "hello 2", "yoo"));
    settle(|| {
      add.poll();
      !add.is_pending()
    })
    .await;
    assert!(add.is_success());

    assert_eq!(
      storage.get(POSTS_KEY).unwrap().as_deref(),
      Some(r#"[{"id":1,"title":"a","body":"b"},{"id":2,"title":"hello 2","body":"yoo"}]"#)
    );

    // The list observer sees the optimistic update without fetching again
    assert!(list.poll());
    assert!(!list.is_fetching());
    assert_eq!(
      list.data().unwrap(),
      &vec![
        Post::new(PostId(1), "a", "b"),
        Post::new(PostId(2), "hello 2", "yoo")
      ]
    );
  }

  #[tokio::test]
  async fn test_n_adds_yield_n_posts() {
    let (_storage, ctx) = context();

    let mut add = add_post_mutation(&ctx);
    for _ in 0..10 {
      add.mutate(Post::random());
    }
    settle(|| {
      add.poll();
      !add.is_pending()
    })
    .await;

    assert_eq!(ctx.posts.load().unwrap().len(), 10);
  }

  #[tokio::test]
  async fn test_add_post_leaves_detail_entries_alone() {
    let (storage, ctx) = context();
    storage.set(POSTS_KEY, "[]").unwrap();

    let mut detail = post_query(&ctx, Some(PostId(3)));
    settle(|| detail.poll()).await;
    assert_eq!(detail.data(), Some(&None));

    let mut add = add_post_mutation(&ctx);
    add.mutate(Post::new(PostId(3), "hello 3", "yoo"));
    settle(|| {
      add.poll();
      !add.is_pending()
    })
    .await;

    // Not normalized: the cached detail entry still says "not found"
    assert_eq!(
      ctx
        .client
        .get_query_data::<Option<Post>>(&PostsQueryKey::Detail(PostId(3))),
      Some(None)
    );
  }

  #[tokio::test]
  async fn test_hooks_over_sqlite_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("posts.db");
    let storage = Arc::new(crate::storage::SqliteStore::open(&path).unwrap());
    let ctx = DataContext {
      posts: crate::posts::PostStore::new(storage.clone()),
      client: QueryClient::new(Default::default()),
    };

    let mut list = posts_query(&ctx);
    settle(|| list.poll()).await;
    assert_eq!(list.data(), Some(&Vec::new()));

    let mut add = add_post_mutation(&ctx);
    add.mutate(Post::new(PostId(9), "hello 9", "yoo"));
    settle(|| {
      add.poll();
      !add.is_pending()
    })
    .await;
    assert!(add.is_success());

    let mut detail = post_query(&ctx, Some(PostId(9)));
    settle(|| detail.poll()).await;
    assert_eq!(detail.data().unwrap().as_ref().unwrap().title, "hello 9");
  }

  #[test]
  fn test_apply_created_post_without_cached_list() {
    let client = QueryClient::new(Default::default());
    assert!(!apply_created_post(&client, &Post::new(PostId(1), "a", "b")));
    assert!(client.get_entry(&PostsQueryKey::All).is_none());
  }
}
