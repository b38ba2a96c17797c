//! In-memory [`Store`] fake for tests. No partial writes: every method that
//! touches more than one table takes the same lock for its whole body, so
//! callers observe all-or-nothing updates just like the Postgres transactions.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Store;
use crate::error::StoreError;
use crate::models::domain::{Entity, Post, PostEntity, Topic, User, UserTopic};
use crate::models::wire::{AnalyzedPost, Category, ExtractedEntity};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    posts: HashMap<String, Post>,
    entities: Vec<Entity>,
    post_entities: Vec<PostEntity>,
    topics: Vec<Topic>,
    user_topics: HashMap<(String, i64), UserTopic>,
    next_entity_id: i64,
    next_topic_id: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only inspection hook: the post_count accumulated for (user, topic).
    /// Not part of the `Store` trait -- the real query surface is the
    /// out-of-scope read-only HTTP API, which reads the relational schema
    /// directly rather than through this trait.
    /// Test-only inspection hook: how many distinct `Entity` rows exist.
    pub fn entity_count(&self) -> usize {
        self.inner.lock().unwrap().entities.len()
    }

    pub fn user_topic_post_count(&self, user_id: &str, topic_name: &str) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        let topic_id = inner.topics.iter().find(|t| t.name == topic_name)?.id;
        inner
            .user_topics
            .get(&(user_id.to_string(), topic_id))
            .map(|ut| ut.post_count)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.users.entry(user.id.clone()).or_insert_with(|| user.clone());
        Ok(())
    }

    async fn add_post(&self, post: &Post) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.posts.entry(post.id.clone()).or_insert_with(|| post.clone());
        Ok(())
    }

    async fn users_due_for_scrape(
        &self,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
        exclude_ids: &HashSet<String>,
    ) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let cutoff = now - horizon;
        let mut due: Vec<User> = inner
            .users
            .values()
            .filter(|u| !exclude_ids.contains(&u.id))
            .filter(|u| u.last_scraped.map(|ts| ts <= cutoff).unwrap_or(true))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(due)
    }

    async fn posts_pending_entity(&self, exclude_ids: &HashSet<String>) -> Result<Vec<Post>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<Post> = inner
            .posts
            .values()
            .filter(|p| !p.analyzed && !exclude_ids.contains(&p.id))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pending)
    }

    async fn posts_pending_classify_by_user(&self) -> Result<HashMap<String, Vec<AnalyzedPost>>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: HashMap<String, Vec<AnalyzedPost>> = HashMap::new();

        let not_yet_analyzed: HashSet<&str> = inner
            .posts
            .values()
            .filter(|p| !p.classified && !p.analyzed)
            .map(|p| p.user_id.as_str())
            .collect();

        let mut posts: Vec<&Post> = inner
            .posts
            .values()
            .filter(|p| p.analyzed && !p.classified && !not_yet_analyzed.contains(p.user_id.as_str()))
            .collect();
        posts.sort_by(|a, b| a.id.cmp(&b.id));

        for post in posts {
            let entity_names: Vec<String> = inner
                .post_entities
                .iter()
                .filter(|pe| pe.post_id == post.id)
                .filter_map(|pe| inner.entities.iter().find(|e| e.id == pe.entity_id))
                .map(|e| e.name.clone())
                .collect();
            out.entry(post.user_id.clone()).or_default().push(AnalyzedPost {
                post: post.clone(),
                entity_names,
            });
        }
        Ok(out)
    }

    async fn record_entities(&self, post_id: &str, entities: &[ExtractedEntity]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for entity in entities {
            let existing = inner
                .entities
                .iter()
                .find(|e| e.name == entity.name && e.entity_type == entity.entity_type)
                .map(|e| e.id);
            let entity_id = match existing {
                Some(id) => id,
                None => {
                    let id = inner.next_entity_id;
                    inner.next_entity_id += 1;
                    inner.entities.push(Entity {
                        id,
                        name: entity.name.clone(),
                        entity_type: entity.entity_type,
                    });
                    id
                }
            };
            let already_linked = inner
                .post_entities
                .iter()
                .any(|pe| pe.post_id == post_id && pe.entity_id == entity_id);
            if !already_linked {
                inner.post_entities.push(PostEntity {
                    post_id: post_id.to_string(),
                    entity_id,
                });
            }
        }
        if let Some(post) = inner.posts.get_mut(post_id) {
            post.analyzed = true;
        }
        Ok(())
    }

    async fn record_classification(
        &self,
        user_id: &str,
        categories: &[Category],
        post_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for category in categories {
            let existing = inner.topics.iter().find(|t| t.name == category.name).map(|t| t.id);
            let topic_id = match existing {
                Some(id) => id,
                None => {
                    let id = inner.next_topic_id;
                    inner.next_topic_id += 1;
                    inner.topics.push(Topic {
                        id,
                        name: category.name.clone(),
                    });
                    id
                }
            };
            let key = (user_id.to_string(), topic_id);
            let entry = inner.user_topics.entry(key).or_insert_with(|| UserTopic {
                user_id: user_id.to_string(),
                topic_id,
                post_count: 0,
                user_declared: false,
            });
            entry.post_count += post_ids.len() as i64;
        }
        for post_id in post_ids {
            if let Some(post) = inner.posts.get_mut(post_id) {
                post.classified = true;
            }
        }
        Ok(())
    }

    async fn mark_scraped(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(user_id) {
            user.last_scraped = Some(now);
        }
        Ok(())
    }

    async fn next_user_pending_follow_scan(&self) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut candidates: Vec<&User> = inner.users.values().filter(|u| !u.scraped_following).collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(candidates.into_iter().next().cloned())
    }

    async fn set_scraped_following(&self, user_id: &str, value: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(user_id) {
            user.scraped_following = value;
        }
        Ok(())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn clear_last_scraped(&self, user_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(user_id) {
            user.last_scraped = None;
        }
        Ok(())
    }
}
