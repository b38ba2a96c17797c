//! The two external-service ports the core consumes (`spec.md` §6).
//!
//! The core only ever sees these traits; the concrete HTTP adapters in
//! [`http`] are the pluggable, swappable "thin adapters" the spec calls out
//! as external collaborators, kept here only so the binary has something
//! real to wire up. Tests drive the traits directly with stubs.

pub mod http;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::PortError;
use crate::models::domain::{Post, User};

/// Result of one `analyze_entities` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAnalysis {
    pub entities: Vec<crate::models::wire::ExtractedEntity>,
}

/// Result of one `classify_text` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub categories: Vec<crate::models::wire::Category>,
}

/// Adapter over the external posts API.
#[async_trait]
pub trait PostsApiPort: Send + Sync {
    /// The `limit` most recent posts for `user_id`, newest first.
    async fn get_user_tweets(&self, user_id: &str, limit: u32) -> Result<Vec<Post>, PortError>;

    /// A lazy, finite sequence of accounts `user_id` follows. Implementations
    /// must paginate internally.
    fn iterate_following<'a>(&'a self, user_id: &'a str) -> BoxStream<'a, Result<User, PortError>>;

    /// Looks up a user by handle.
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, PortError>;
}

/// Adapter over the external NLP service.
#[async_trait]
pub trait NlpApiPort: Send + Sync {
    async fn analyze_entities(&self, text: &str) -> Result<EntityAnalysis, PortError>;
    async fn classify_text(&self, text: &str) -> Result<Classification, PortError>;
}
