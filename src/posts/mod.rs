//! The post domain: records, their store, and the queries over them.

pub mod queries;
pub mod store;
pub mod types;

pub use queries::{add_post_mutation, apply_created_post, post_query, posts_query, PostsQueryKey};
pub use store::PostStore;
pub use types::{Post, PostId};
