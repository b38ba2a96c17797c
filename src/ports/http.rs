//! Concrete HTTP adapters for [`super::PostsApiPort`] and [`super::NlpApiPort`].
//!
//! These are the "thin adapters" `spec.md` names as external collaborators:
//! the core only depends on the traits in [`super`]. The client shape
//! (builder, brotli/gzip client, governor-paced requests) is lifted directly
//! from the teacher's `api::client::ApiClient`.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use typed_builder::TypedBuilder;

use super::{Classification, EntityAnalysis, NlpApiPort, PostsApiPort};
use crate::error::PortError;
use crate::models::domain::{Post, User};
use crate::models::wire::{Category, ExtractedEntity};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP client for the posts API, paced client-side with `governor` on top of
/// the worker-level rate-limit registry the coordinator honours.
#[derive(Clone, TypedBuilder)]
pub struct HttpPostsApiPort {
    #[builder(default)]
    client: reqwest::Client,
    #[builder(setter(into))]
    base_url: String,
    #[builder(setter(into))]
    api_key: String,
    #[builder(default = default_limiter())]
    limiter: Arc<DirectRateLimiter>,
}

fn default_limiter() -> Arc<DirectRateLimiter> {
    Arc::new(RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(5).expect("nonzero"),
    )))
}

#[derive(Debug, Deserialize)]
struct WirePost {
    id: String,
    user_id: String,
    created_at: chrono::DateTime<Utc>,
    text: String,
}

impl From<WirePost> for Post {
    fn from(value: WirePost) -> Self {
        Post::new(value.id, value.user_id, value.created_at, value.text)
    }
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    username: String,
    name: String,
    url: Option<String>,
    description: Option<String>,
    verified: bool,
    protected: bool,
}

impl From<WireUser> for User {
    fn from(value: WireUser) -> Self {
        User {
            id: value.id,
            username: value.username,
            name: value.name,
            url: value.url,
            description: value.description,
            verified: value.verified,
            protected: value.protected,
            last_scraped: None,
            scraped_following: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FollowingPage {
    users: Vec<WireUser>,
    next_cursor: Option<String>,
}

/// Maps an HTTP response status into the spec's rate-limited/generic-error split.
async fn map_response_error(response: reqwest::Response) -> PortError {
    let status = response.status();
    if status.as_u16() == 429 {
        let reset_epoch = response
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or_else(|| Utc::now().timestamp() + 60);
        return PortError::RateLimited(reset_epoch);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    PortError::Request {
        status: Some(status.as_u16()),
        message,
    }
}

impl HttpPostsApiPort {
    async fn get(&self, path: &str) -> Result<reqwest::Response, PortError> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl PostsApiPort for HttpPostsApiPort {
    async fn get_user_tweets(&self, user_id: &str, limit: u32) -> Result<Vec<Post>, PortError> {
        let response = self
            .get(&format!("/users/{user_id}/tweets?limit={limit}"))
            .await?;
        if !response.status().is_success() {
            return Err(map_response_error(response).await);
        }
        let posts: Vec<WirePost> = response.json().await?;
        Ok(posts.into_iter().map(Post::from).collect())
    }

    fn iterate_following<'a>(&'a self, user_id: &'a str) -> BoxStream<'a, Result<User, PortError>> {
        Box::pin(async_stream::try_stream! {
            let mut cursor: Option<String> = None;
            loop {
                let path = match &cursor {
                    Some(c) => format!("/users/{user_id}/following?cursor={c}"),
                    None => format!("/users/{user_id}/following"),
                };
                let response = self.get(&path).await?;
                if !response.status().is_success() {
                    Err(map_response_error(response).await)?;
                }
                let page: FollowingPage = response.json().await?;
                for user in page.users {
                    yield User::from(user);
                }
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
        })
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, PortError> {
        let response = self.get(&format!("/users/by-username/{username}")).await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(map_response_error(response).await);
        }
        let user: WireUser = response.json().await?;
        Ok(Some(User::from(user)))
    }
}

/// HTTP client for the NLP service (entity extraction + classification).
#[derive(Clone, TypedBuilder)]
pub struct HttpNlpApiPort {
    #[builder(default)]
    client: reqwest::Client,
    #[builder(setter(into))]
    base_url: String,
    #[builder(setter(into))]
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    entities: Vec<ExtractedEntity>,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    categories: Vec<Category>,
}

#[async_trait]
impl NlpApiPort for HttpNlpApiPort {
    async fn analyze_entities(&self, text: &str) -> Result<EntityAnalysis, PortError> {
        let response = self
            .client
            .post(format!("{}/entities", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(map_response_error(response).await);
        }
        let parsed: EntitiesResponse = response.json().await?;
        Ok(EntityAnalysis {
            entities: parsed.entities,
        })
    }

    async fn classify_text(&self, text: &str) -> Result<Classification, PortError> {
        let response = self
            .client
            .post(format!("{}/classify", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        if response.status().as_u16() == 400 {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unclassifiable text".to_string());
            return Err(PortError::InvalidArgument(message));
        }
        if !response.status().is_success() {
            return Err(map_response_error(response).await);
        }
        let parsed: ClassifyResponse = response.json().await?;
        Ok(Classification {
            categories: parsed.categories,
        })
    }
}
