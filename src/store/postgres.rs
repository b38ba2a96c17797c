//! Postgres-backed [`Store`], using runtime-checked `sqlx` queries.
//!
//! Grounded on the `other_examples` `scrape_jobs.rs` file's pattern of plain
//! async `sqlx` calls over a `PgPool`, rather than the teacher's file-backed
//! `StateManager` (which has no transactional multi-table story).

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::Store;
use crate::error::StoreError;
use crate::models::domain::{Post, User};
use crate::models::wire::{AnalyzedPost, Category, ExtractedEntity};

/// Thin wrapper over a connection pool. Every method here is a single
/// statement or a single transaction; the coordinator is the only caller.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, name, url, description, verified, protected, last_scraped, scraped_following)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.url)
        .bind(&user.description)
        .bind(user.verified)
        .bind(user.protected)
        .bind(user.last_scraped)
        .bind(user.scraped_following)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_post(&self, post: &Post) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, created_at, text, analyzed, classified)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(post.created_at)
        .bind(&post.text)
        .bind(post.analyzed)
        .bind(post.classified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn users_due_for_scrape(
        &self,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
        exclude_ids: &HashSet<String>,
    ) -> Result<Vec<User>, StoreError> {
        let cutoff = now - horizon;
        let rows: Vec<User> = sqlx::query_as(
            r#"
            SELECT id, username, name, url, description, verified, protected, last_scraped, scraped_following
            FROM users
            WHERE last_scraped IS NULL OR last_scraped <= $1
            ORDER BY id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|u| !exclude_ids.contains(&u.id))
            .collect())
    }

    async fn posts_pending_entity(&self, exclude_ids: &HashSet<String>) -> Result<Vec<Post>, StoreError> {
        let rows: Vec<Post> = sqlx::query_as(
            r#"
            SELECT id, user_id, created_at, text, analyzed, classified
            FROM posts
            WHERE analyzed = FALSE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|p| !exclude_ids.contains(&p.id))
            .collect())
    }

    async fn posts_pending_classify_by_user(&self) -> Result<HashMap<String, Vec<AnalyzedPost>>, StoreError> {
        let posts: Vec<Post> = sqlx::query_as(
            r#"
            SELECT p.id, p.user_id, p.created_at, p.text, p.analyzed, p.classified
            FROM posts p
            WHERE p.analyzed = TRUE AND p.classified = FALSE
            AND NOT EXISTS (
                SELECT 1 FROM posts p2
                WHERE p2.user_id = p.user_id AND p2.classified = FALSE AND p2.analyzed = FALSE
            )
            ORDER BY p.user_id, p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if posts.is_empty() {
            return Ok(HashMap::new());
        }

        let post_ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let entity_rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT pe.post_id, e.name
            FROM post_entities pe
            JOIN entities e ON e.id = pe.entity_id
            WHERE pe.post_id = ANY($1)
            "#,
        )
        .bind(&post_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut names_by_post: HashMap<String, Vec<String>> = HashMap::new();
        for (post_id, name) in entity_rows {
            names_by_post.entry(post_id).or_default().push(name);
        }

        let mut out: HashMap<String, Vec<AnalyzedPost>> = HashMap::new();
        for post in posts {
            let entity_names = names_by_post.get(&post.id).cloned().unwrap_or_default();
            out.entry(post.user_id.clone())
                .or_default()
                .push(AnalyzedPost { post, entity_names });
        }
        Ok(out)
    }

    async fn record_entities(&self, post_id: &str, entities: &[ExtractedEntity]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for entity in entities {
            sqlx::query(
                r#"
                INSERT INTO entities (name, entity_type)
                VALUES ($1, $2)
                ON CONFLICT (name, entity_type) DO NOTHING
                "#,
            )
            .bind(&entity.name)
            .bind(entity.entity_type)
            .execute(&mut *tx)
            .await?;

            let entity_id: (i64,) = sqlx::query_as(
                "SELECT id FROM entities WHERE name = $1 AND entity_type = $2",
            )
            .bind(&entity.name)
            .bind(entity.entity_type)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO post_entities (post_id, entity_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(post_id)
            .bind(entity_id.0)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE posts SET analyzed = TRUE WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_classification(
        &self,
        user_id: &str,
        categories: &[Category],
        post_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for category in categories {
            sqlx::query("INSERT INTO topics (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(&category.name)
                .execute(&mut *tx)
                .await?;

            let topic_id: (i64,) = sqlx::query_as("SELECT id FROM topics WHERE name = $1")
                .bind(&category.name)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO user_topics (user_id, topic_id, post_count, user_declared)
                VALUES ($1, $2, $3, FALSE)
                ON CONFLICT (user_id, topic_id)
                DO UPDATE SET post_count = user_topics.post_count + EXCLUDED.post_count
                "#,
            )
            .bind(user_id)
            .bind(topic_id.0)
            .bind(post_ids.len() as i64)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE posts SET classified = TRUE WHERE id = ANY($1)")
            .bind(post_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_scraped(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_scraped = $1 WHERE id = $2")
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn next_user_pending_follow_scan(&self) -> Result<Option<User>, StoreError> {
        let row: Option<User> = sqlx::query_as(
            r#"
            SELECT id, username, name, url, description, verified, protected, last_scraped, scraped_following
            FROM users
            WHERE scraped_following = FALSE
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_scraped_following(&self, user_id: &str, value: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET scraped_following = $1 WHERE id = $2")
            .bind(value)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<User> = sqlx::query_as(
            r#"
            SELECT id, username, name, url, description, verified, protected, last_scraped, scraped_following
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn clear_last_scraped(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_scraped = NULL WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
