//! The coordinator (`spec.md` §4.4): the sole writer to the [`Store`],
//! draining results into it and enqueueing new requests from it. Modeled on
//! the teacher's `StateManager` as the single authority over persisted
//! progress, generalized from a single JSON file to the store/broker pair.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::broker::{
    Broker, POSTS_IN_FLIGHT, REQ_CLASSIFY, REQ_ENTITY, REQ_SCRAPE, RES_CLASSIFY, RES_ENTITY, RES_SCRAPE,
    USERS_IN_FLIGHT,
};
use crate::error::PipelineError;
use crate::models::wire::{ClassificationRequest, ClassificationResult, EntityResult, ScrapeResult};
use crate::store::Store;

/// Owns the store and broker handles and runs the drain/enqueue sub-protocols.
/// Never sharded: `spec.md` §5 requires exactly one of these per deployment.
pub struct Coordinator<S: Store, B: Broker> {
    store: Arc<S>,
    broker: Arc<B>,
    rescrape_after: Duration,
}

impl<S: Store, B: Broker> Coordinator<S, B> {
    pub fn new(store: Arc<S>, broker: Arc<B>, rescrape_after_days: i64) -> Self {
        Self {
            store,
            broker,
            rescrape_after: Duration::days(rescrape_after_days),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Drains `res.scrape` completely, applying each result in a single
    /// store transaction and releasing the user id from `users_in_flight`.
    pub async fn drain_scrape(&self) -> Result<usize, PipelineError> {
        let mut applied = 0usize;
        while let Some(raw) = self.broker.pop_head(RES_SCRAPE).await? {
            let result: ScrapeResult = serde_json::from_str(&raw).map_err(crate::error::BrokerError::from)?;
            for post in &result.posts {
                self.store.add_post(post).await?;
            }
            self.store.mark_scraped(&result.user_id, Utc::now()).await?;
            self.broker.set_remove(USERS_IN_FLIGHT, &result.user_id).await?;
            applied += 1;
        }
        if applied > 0 {
            debug!(applied, "drained scrape results");
        }
        Ok(applied)
    }

    /// Drains `res.entity` completely.
    pub async fn drain_entity(&self) -> Result<usize, PipelineError> {
        let mut applied = 0usize;
        while let Some(raw) = self.broker.pop_head(RES_ENTITY).await? {
            let result: EntityResult = serde_json::from_str(&raw).map_err(crate::error::BrokerError::from)?;
            self.store.record_entities(&result.post_id, &result.entities).await?;
            self.broker.set_remove(POSTS_IN_FLIGHT, &result.post_id).await?;
            applied += 1;
        }
        if applied > 0 {
            debug!(applied, "drained entity results");
        }
        Ok(applied)
    }

    /// Drains `res.classify` completely.
    pub async fn drain_classify(&self) -> Result<usize, PipelineError> {
        let mut applied = 0usize;
        while let Some(raw) = self.broker.pop_head(RES_CLASSIFY).await? {
            let result: ClassificationResult =
                serde_json::from_str(&raw).map_err(crate::error::BrokerError::from)?;
            self.store
                .record_classification(&result.user_id, &result.categories, &result.post_ids)
                .await?;
            for post_id in &result.post_ids {
                self.broker.set_remove(POSTS_IN_FLIGHT, post_id).await?;
            }
            applied += 1;
        }
        if applied > 0 {
            debug!(applied, "drained classify results");
        }
        Ok(applied)
    }

    /// Runs all three drains in the fixed order required by `spec.md` §4.4:
    /// scrape, then entity, then classify.
    pub async fn drain_all(&self) -> Result<(), PipelineError> {
        self.drain_scrape().await?;
        self.drain_entity().await?;
        self.drain_classify().await?;
        Ok(())
    }

    /// Step 1 of enqueue: push every user due for re-scrape onto `req.scrape`
    /// and `users_in_flight`.
    pub async fn enqueue_scrape(&self) -> Result<usize, PipelineError> {
        let in_flight = self.broker.set_members(USERS_IN_FLIGHT).await?;
        let due = self
            .store
            .users_due_for_scrape(Utc::now(), self.rescrape_after, &in_flight)
            .await?;
        for user in &due {
            self.broker.set_add(REQ_SCRAPE, &user.id).await?;
            self.broker.set_add(USERS_IN_FLIGHT, &user.id).await?;
        }
        if !due.is_empty() {
            info!(count = due.len(), "enqueued users for scrape");
        }
        Ok(due.len())
    }

    /// Step 2 of enqueue: push every un-analyzed post onto `req.entity`.
    pub async fn enqueue_entity(&self) -> Result<usize, PipelineError> {
        let in_flight = self.broker.set_members(POSTS_IN_FLIGHT).await?;
        let pending = self.store.posts_pending_entity(&in_flight).await?;
        for post in &pending {
            let payload = serde_json::to_string(post).map_err(crate::error::BrokerError::from)?;
            self.broker.push_tail(REQ_ENTITY, payload).await?;
            self.broker.set_add(POSTS_IN_FLIGHT, &post.id).await?;
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "enqueued posts for entity extraction");
        }
        Ok(pending.len())
    }

    /// Step 3 of enqueue: group analyzed, unclassified posts by
    /// (user, entity) and push one `ClassificationRequest` per partition.
    pub async fn enqueue_classify(&self) -> Result<usize, PipelineError> {
        let in_flight = self.broker.set_members(POSTS_IN_FLIGHT).await?;
        let by_user = self.store.posts_pending_classify_by_user().await?;
        let mut emitted = 0usize;

        for (user_id, posts) in by_user {
            let eligible: Vec<_> = posts
                .into_iter()
                .filter(|ap| !in_flight.contains(&ap.post.id))
                .collect();
            if eligible.is_empty() {
                continue;
            }

            let mut partitions: HashMap<String, (Vec<String>, Vec<String>)> = HashMap::new();
            for analyzed in eligible {
                let key = analyzed
                    .entity_names
                    .first()
                    .cloned()
                    .unwrap_or_else(|| String::from("__unentitied__"));
                let entry = partitions.entry(key).or_default();
                entry.0.push(analyzed.post.id.clone());
                entry.1.push(analyzed.post.text.clone());
            }

            for (entity_name, (post_ids, texts)) in partitions {
                let request = ClassificationRequest {
                    user_id: user_id.clone(),
                    entity_name,
                    post_ids: post_ids.clone(),
                    texts,
                };
                let payload = serde_json::to_string(&request).map_err(crate::error::BrokerError::from)?;
                self.broker.push_tail(REQ_CLASSIFY, payload).await?;
                for post_id in &post_ids {
                    self.broker.set_add(POSTS_IN_FLIGHT, post_id).await?;
                }
                emitted += 1;
            }
        }
        if emitted > 0 {
            info!(count = emitted, "enqueued classification requests");
        }
        Ok(emitted)
    }

    /// Runs all three enqueue steps in the fixed order required by §4.4.
    pub async fn enqueue_all(&self) -> Result<(), PipelineError> {
        self.enqueue_scrape().await?;
        self.enqueue_entity().await?;
        self.enqueue_classify().await?;
        Ok(())
    }

    /// One full coordinator pass: drain, then enqueue. Reversing this order
    /// would risk re-enqueueing a record whose result is already sitting in
    /// a result queue (`spec.md` §9).
    pub async fn process(&self) -> Result<(), PipelineError> {
        self.drain_all().await?;
        self.enqueue_all().await?;
        Ok(())
    }

    /// Operator recovery tool for a record stuck in an in-flight set after a
    /// non-rate-limit worker error (`spec.md` §9 open question 1): drops the
    /// id so it can be re-enqueued on the next scan.
    pub async fn release_stuck_user(&self, user_id: &str) -> Result<(), PipelineError> {
        self.broker.set_remove(USERS_IN_FLIGHT, user_id).await?;
        warn!(user_id, "released stuck user from in-flight set");
        Ok(())
    }

    pub async fn release_stuck_post(&self, post_id: &str) -> Result<(), PipelineError> {
        self.broker.set_remove(POSTS_IN_FLIGHT, post_id).await?;
        warn!(post_id, "released stuck post from in-flight set");
        Ok(())
    }
}
