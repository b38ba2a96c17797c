//! The coordinator-only writer (`spec.md` §4.2). All operations are idempotent.

pub mod memory;
pub mod postgres;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::domain::{Post, User};
use crate::models::wire::{AnalyzedPost, Category, ExtractedEntity};

pub use postgres::PgStore;

/// The relational store the coordinator reads and writes. Readers (the HTTP
/// query surface, tests) may read concurrently; only the coordinator writes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts `user` if absent by id; otherwise leaves the row unchanged.
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Inserts `post` if absent by id; no-op if already present.
    async fn add_post(&self, post: &Post) -> Result<(), StoreError>;

    /// Users where `last_scraped IS NULL OR last_scraped <= now - horizon`,
    /// excluding any id in `exclude_ids`.
    async fn users_due_for_scrape(
        &self,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
        exclude_ids: &HashSet<String>,
    ) -> Result<Vec<User>, StoreError>;

    /// Posts with `analyzed = false`, excluding any id in `exclude_ids`.
    async fn posts_pending_entity(&self, exclude_ids: &HashSet<String>) -> Result<Vec<Post>, StoreError>;

    /// `user_id -> [analyzed, unclassified posts]`, each post annotated with
    /// the entity names already recorded against it.
    async fn posts_pending_classify_by_user(&self) -> Result<HashMap<String, Vec<AnalyzedPost>>, StoreError>;

    /// Upserts `Entity` rows by (name, type), inserts `PostEntity` links, and
    /// sets `analyzed = true` for `post_id`. Single transaction.
    async fn record_entities(&self, post_id: &str, entities: &[ExtractedEntity]) -> Result<(), StoreError>;

    /// For each category: upserts `Topic` by name, upserts `UserTopic` (user,
    /// topic), accumulating `post_count` by `post_ids.len()`. Then marks every
    /// listed post `classified = true`. Single transaction.
    async fn record_classification(
        &self,
        user_id: &str,
        categories: &[Category],
        post_ids: &[String],
    ) -> Result<(), StoreError>;

    /// Sets `last_scraped := now` for `user_id`.
    async fn mark_scraped(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// One user with `scraped_following = false`, if any (`spec.md` §4.8).
    async fn next_user_pending_follow_scan(&self) -> Result<Option<User>, StoreError>;

    /// Sets `scraped_following` for `user_id`.
    async fn set_scraped_following(&self, user_id: &str, value: bool) -> Result<(), StoreError>;

    /// Looks up a user by username, for the "enqueue user by username" operator command.
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Clears `last_scraped` for `user_id`, forcing a re-scrape (`spec.md` §3 lifecycle).
    async fn clear_last_scraped(&self, user_id: &str) -> Result<(), StoreError>;
}
