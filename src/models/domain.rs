//! Relational data model: the six entities persisted by the [`crate::store::Store`].
//!
//! Field shapes follow `spec.md` §3 exactly; nothing here is inferred.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A social-media account known to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub verified: bool,
    pub protected: bool,
    pub last_scraped: Option<DateTime<Utc>>,
    pub scraped_following: bool,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            name: name.into(),
            url: None,
            description: None,
            verified: false,
            protected: false,
            last_scraped: None,
            scraped_following: false,
        }
    }
}

/// A single post by a [`User`], moving through `new -> scraped -> analyzed -> classified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub analyzed: bool,
    pub classified: bool,
}

impl Post {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, created_at: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            created_at,
            text: text.into(),
            analyzed: false,
            classified: false,
        }
    }
}

/// A named, typed entity extracted from post text. Deduplicated by (`name`, `entity_type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub entity_type: i16,
}

/// Many-to-many link row between a [`Post`] and an [`Entity`]. No further attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEntity {
    pub post_id: String,
    pub entity_id: i64,
}

/// A classification category a user has been associated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub name: String,
}

/// How many of a user's posts have been classified under a [`Topic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTopic {
    pub user_id: String,
    pub topic_id: i64,
    pub post_count: i64,
    pub user_declared: bool,
}
