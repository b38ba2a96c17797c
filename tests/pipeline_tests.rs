//! End-to-end coverage of the scenarios and testable properties the pipeline
//! must satisfy, driven entirely against the in-memory store/broker fakes
//! and stub ports -- no network, no database.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream};
use topic_pipeline::broker::memory::InMemoryBroker;
use topic_pipeline::broker::{Broker, REQ_CLASSIFY, REQ_ENTITY, USERS_IN_FLIGHT};
use topic_pipeline::coordinator::Coordinator;
use topic_pipeline::error::PortError;
use topic_pipeline::models::domain::{Post, User};
use topic_pipeline::models::wire::{Category, ExtractedEntity};
use topic_pipeline::ports::{Classification, EntityAnalysis, NlpApiPort, PostsApiPort};
use topic_pipeline::store::memory::InMemoryStore;
use topic_pipeline::store::Store;
use topic_pipeline::workers::classify::ClassifyWorker;
use topic_pipeline::workers::entity::EntityWorker;
use topic_pipeline::workers::scrape::ScrapeWorker;
use topic_pipeline::workers::WorkerStatus;
use topic_pipeline::ratelimit::{FakeClock, RateLimitRegistry};

/// A posts-API stub whose per-user responses are configured up front.
struct StubPostsApi {
    tweets: Mutex<std::collections::HashMap<String, Result<Vec<Post>, PortError>>>,
}

impl StubPostsApi {
    fn new() -> Self {
        Self {
            tweets: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn set_tweets(&self, user_id: &str, result: Result<Vec<Post>, PortError>) {
        self.tweets.lock().unwrap().insert(user_id.to_string(), result);
    }
}

#[async_trait]
impl PostsApiPort for StubPostsApi {
    async fn get_user_tweets(&self, user_id: &str, _limit: u32) -> Result<Vec<Post>, PortError> {
        match self.tweets.lock().unwrap().remove(user_id) {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    fn iterate_following<'a>(&'a self, _user_id: &'a str) -> BoxStream<'a, Result<User, PortError>> {
        Box::pin(stream::empty())
    }

    async fn get_user_by_username(&self, _username: &str) -> Result<Option<User>, PortError> {
        Ok(None)
    }
}

/// An NLP stub that tags every post with entity `E1` and classifies any text
/// containing "cats" as `Animals`, everything else as `General`.
struct StubNlpApi;

#[async_trait]
impl NlpApiPort for StubNlpApi {
    async fn analyze_entities(&self, text: &str) -> Result<EntityAnalysis, PortError> {
        let name = if text.contains("cats") { "cats" } else { "dogs" };
        Ok(EntityAnalysis {
            entities: vec![ExtractedEntity {
                name: name.to_string(),
                entity_type: 0,
            }],
        })
    }

    async fn classify_text(&self, text: &str) -> Result<Classification, PortError> {
        if text.trim().is_empty() {
            return Err(PortError::InvalidArgument("empty text".to_string()));
        }
        let name = if text.contains("cats") { "Animals" } else { "General" };
        Ok(Classification {
            categories: vec![Category {
                name: name.to_string(),
                confidence: 0.9,
            }],
        })
    }
}

fn seed_user(id: &str) -> User {
    User::new(id, format!("{id}_handle"), format!("{id} display name"))
}

fn post(id: &str, user_id: &str, text: &str) -> Post {
    Post::new(id, user_id, Utc::now(), text)
}

#[tokio::test]
async fn s1_user_with_no_posts_still_gets_marked_scraped() {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    store.upsert_user(&seed_user("u1")).await.unwrap();

    let coordinator = Coordinator::new(store.clone(), broker.clone(), 7);
    coordinator.enqueue_scrape().await.unwrap();

    let posts_api = Arc::new(StubPostsApi::new());
    posts_api.set_tweets("u1", Ok(Vec::new()));
    let rate_limits = RateLimitRegistry::new();
    let clock = Arc::new(FakeClock::new(0));
    let worker = ScrapeWorker::new(broker.clone(), posts_api, rate_limits, clock, 10);
    assert_eq!(worker.tick().await.unwrap(), WorkerStatus::Progressed);

    coordinator.drain_scrape().await.unwrap();

    let user = store.user_by_username("u1_handle").await.unwrap().unwrap();
    assert!(user.last_scraped.is_some());
    assert_eq!(broker.len(REQ_ENTITY).await.unwrap(), 0);
    assert_eq!(broker.len(REQ_CLASSIFY).await.unwrap(), 0);
}

#[tokio::test]
async fn s2_two_posts_flow_through_to_classified_with_topics() {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    store.upsert_user(&seed_user("u1")).await.unwrap();

    let coordinator = Coordinator::new(store.clone(), broker.clone(), 7);
    let rate_limits = RateLimitRegistry::new();
    let clock = Arc::new(FakeClock::new(0));

    let posts_api = Arc::new(StubPostsApi::new());
    posts_api.set_tweets(
        "u1",
        Ok(vec![post("p1", "u1", "I love cats"), post("p2", "u1", "dogs are great")]),
    );
    let nlp_api = Arc::new(StubNlpApi);

    let scrape_worker = ScrapeWorker::new(broker.clone(), posts_api, rate_limits.clone(), clock.clone(), 10);
    let entity_worker = EntityWorker::new(broker.clone(), nlp_api.clone(), rate_limits.clone(), clock.clone(), 900);
    let classify_worker = ClassifyWorker::new(broker.clone(), nlp_api, rate_limits.clone(), clock.clone(), 900);

    coordinator.enqueue_scrape().await.unwrap();
    assert_eq!(scrape_worker.tick().await.unwrap(), WorkerStatus::Progressed);
    coordinator.drain_scrape().await.unwrap();

    coordinator.enqueue_entity().await.unwrap();
    assert_eq!(entity_worker.tick().await.unwrap(), WorkerStatus::Progressed);
    assert_eq!(entity_worker.tick().await.unwrap(), WorkerStatus::Progressed);
    assert_eq!(entity_worker.tick().await.unwrap(), WorkerStatus::Idle);
    coordinator.drain_entity().await.unwrap();

    coordinator.enqueue_classify().await.unwrap();
    loop {
        match classify_worker.tick().await.unwrap() {
            WorkerStatus::Idle => break,
            _ => continue,
        }
    }
    coordinator.drain_classify().await.unwrap();

    let pending = store.posts_pending_classify_by_user().await.unwrap();
    assert!(pending.is_empty(), "no posts should remain pending classification");
}

#[tokio::test]
async fn s3_rate_limit_blocks_then_recovers() {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    store.upsert_user(&seed_user("u1")).await.unwrap();

    let coordinator = Coordinator::new(store.clone(), broker.clone(), 7);
    coordinator.enqueue_scrape().await.unwrap();

    let posts_api = Arc::new(StubPostsApi::new());
    posts_api.set_tweets("u1", Err(PortError::RateLimited(60)));
    let rate_limits = RateLimitRegistry::new();
    let clock = Arc::new(FakeClock::new(0));
    let worker = ScrapeWorker::new(broker.clone(), posts_api.clone(), rate_limits.clone(), clock.clone(), 10);

    assert_eq!(worker.tick().await.unwrap(), WorkerStatus::Wait);
    assert!(broker.set_is_member(topic_pipeline::broker::REQ_SCRAPE, "u1").await.unwrap());

    clock.advance(60);
    posts_api.set_tweets("u1", Ok(vec![post("p1", "u1", "hello")]));
    assert_eq!(worker.tick().await.unwrap(), WorkerStatus::Progressed);
    coordinator.drain_scrape().await.unwrap();

    let user = store.user_by_username("u1_handle").await.unwrap().unwrap();
    assert!(user.last_scraped.is_some());
}

#[tokio::test]
async fn s4_classification_requests_partition_by_entity() {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    store.upsert_user(&seed_user("u1")).await.unwrap();

    for i in 0..5 {
        let p = post(&format!("cat{i}"), "u1", "text");
        store.add_post(&p).await.unwrap();
        store
            .record_entities(
                &p.id,
                &[ExtractedEntity {
                    name: "E1".to_string(),
                    entity_type: 0,
                }],
            )
            .await
            .unwrap();
    }
    for i in 0..5 {
        let p = post(&format!("dog{i}"), "u1", "text");
        store.add_post(&p).await.unwrap();
        store
            .record_entities(
                &p.id,
                &[ExtractedEntity {
                    name: "E2".to_string(),
                    entity_type: 0,
                }],
            )
            .await
            .unwrap();
    }

    let coordinator = Coordinator::new(store.clone(), broker.clone(), 7);
    let emitted = coordinator.enqueue_classify().await.unwrap();
    assert_eq!(emitted, 2);

    let mut sizes = Vec::new();
    while let Some(raw) = broker.pop_head(REQ_CLASSIFY).await.unwrap() {
        let req: topic_pipeline::models::wire::ClassificationRequest = serde_json::from_str(&raw).unwrap();
        sizes.push(req.post_ids.len());
    }
    sizes.sort();
    assert_eq!(sizes, vec![5, 5]);
}

#[tokio::test]
async fn s5_invalid_argument_still_marks_posts_classified_with_no_topic() {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    store.upsert_user(&seed_user("u1")).await.unwrap();
    let p = post("p1", "u1", "");
    store.add_post(&p).await.unwrap();
    store.record_entities(&p.id, &[]).await.unwrap();

    let coordinator = Coordinator::new(store.clone(), broker.clone(), 7);
    coordinator.enqueue_classify().await.unwrap();

    let rate_limits = RateLimitRegistry::new();
    let clock = Arc::new(FakeClock::new(0));
    let nlp_api = Arc::new(StubNlpApi);
    let worker = ClassifyWorker::new(broker.clone(), nlp_api, rate_limits, clock, 900);
    assert_eq!(worker.tick().await.unwrap(), WorkerStatus::Progressed);
    coordinator.drain_classify().await.unwrap();

    let by_user = store.posts_pending_classify_by_user().await.unwrap();
    assert!(by_user.is_empty());
}

#[tokio::test]
async fn s6_two_consecutive_enqueue_phases_do_not_duplicate() {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    store.upsert_user(&seed_user("u1")).await.unwrap();
    let p = post("p1", "u1", "text");
    store.add_post(&p).await.unwrap();

    let coordinator = Coordinator::new(store.clone(), broker.clone(), 7);
    coordinator.enqueue_entity().await.unwrap();
    let first_len = broker.len(REQ_ENTITY).await.unwrap();
    coordinator.enqueue_entity().await.unwrap();
    let second_len = broker.len(REQ_ENTITY).await.unwrap();

    assert_eq!(first_len, 1);
    assert_eq!(second_len, 1, "second enqueue must not duplicate the in-flight post");
}

#[tokio::test]
async fn property_rescrape_horizon_respects_seven_days() {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());

    let mut fresh = seed_user("fresh");
    fresh.last_scraped = Some(Utc::now() - chrono::Duration::days(3));
    store.upsert_user(&fresh).await.unwrap();

    let mut stale = seed_user("stale");
    stale.last_scraped = Some(Utc::now() - chrono::Duration::days(8));
    store.upsert_user(&stale).await.unwrap();

    let coordinator = Coordinator::new(store.clone(), broker.clone(), 7);
    let enqueued = coordinator.enqueue_scrape().await.unwrap();
    assert_eq!(enqueued, 1);
    assert!(broker.set_members(USERS_IN_FLIGHT).await.unwrap().contains("stale"));
}

#[tokio::test]
async fn property_entity_dedup_across_two_posts() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user("u1");
    store.upsert_user(&user).await.unwrap();

    let p1 = post("p1", "u1", "cats");
    let p2 = post("p2", "u1", "cats again");
    store.add_post(&p1).await.unwrap();
    store.add_post(&p2).await.unwrap();

    let shared_entity = ExtractedEntity {
        name: "cats".to_string(),
        entity_type: 0,
    };
    store.record_entities("p1", &[shared_entity.clone()]).await.unwrap();
    store.record_entities("p2", &[shared_entity]).await.unwrap();

    let by_user = store.posts_pending_classify_by_user().await.unwrap();
    let posts = &by_user["u1"];
    assert_eq!(posts.len(), 2);
    for analyzed in posts {
        assert_eq!(analyzed.entity_names, vec!["cats".to_string()]);
    }
    assert_eq!(store.entity_count(), 1, "one Entity row shared by both posts");
}

#[tokio::test]
async fn property_classification_accumulates_post_count() {
    let store = Arc::new(InMemoryStore::new());
    store.upsert_user(&seed_user("u1")).await.unwrap();

    let category = Category {
        name: "Animals".to_string(),
        confidence: 0.8,
    };
    store
        .record_classification("u1", std::slice::from_ref(&category), &["p1".to_string(), "p2".to_string()])
        .await
        .unwrap();
    store
        .record_classification("u1", &[category], &["p3".to_string()])
        .await
        .unwrap();

    assert_eq!(store.user_topic_post_count("u1", "Animals"), Some(3));
}
