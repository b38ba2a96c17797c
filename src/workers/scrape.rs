//! Scrape worker (`spec.md` §4.5).

use std::sync::Arc;

use tracing::error;

use super::WorkerStatus;
use crate::broker::{Broker, REQ_SCRAPE, RES_SCRAPE};
use crate::error::{BrokerError, PortError};
use crate::models::wire::ScrapeResult;
use crate::ports::PostsApiPort;
use crate::ratelimit::{Clock, RateLimitKey, RateLimitRegistry};

pub struct ScrapeWorker<B: Broker, P: PostsApiPort> {
    broker: Arc<B>,
    port: Arc<P>,
    rate_limits: Arc<RateLimitRegistry>,
    clock: Arc<dyn Clock>,
    posts_per_fetch: u32,
}

impl<B: Broker, P: PostsApiPort> ScrapeWorker<B, P> {
    pub fn new(
        broker: Arc<B>,
        port: Arc<P>,
        rate_limits: Arc<RateLimitRegistry>,
        clock: Arc<dyn Clock>,
        posts_per_fetch: u32,
    ) -> Self {
        Self {
            broker,
            port,
            rate_limits,
            clock,
            posts_per_fetch,
        }
    }

    pub async fn tick(&self) -> Result<WorkerStatus, BrokerError> {
        if self.rate_limits.time_until_reset(RateLimitKey::PostsApi, self.clock.as_ref()) > 0 {
            return Ok(WorkerStatus::Wait);
        }

        let Some(user_id) = self.broker.pop_arbitrary(REQ_SCRAPE).await? else {
            return Ok(WorkerStatus::Idle);
        };

        match self.port.get_user_tweets(&user_id, self.posts_per_fetch).await {
            Ok(posts) => {
                let result = ScrapeResult {
                    user_id: user_id.clone(),
                    posts,
                };
                let payload = serde_json::to_string(&result)?;
                self.broker.push_tail(RES_SCRAPE, payload).await?;
                Ok(WorkerStatus::Progressed)
            }
            Err(PortError::RateLimited(reset_epoch)) => {
                self.rate_limits.set_reset(RateLimitKey::PostsApi, reset_epoch);
                self.broker.set_add(REQ_SCRAPE, &user_id).await?;
                Ok(WorkerStatus::Wait)
            }
            Err(other) => {
                // user_id stays in `users_in_flight`; operator must release it
                // (Coordinator::release_stuck_user) before it is scanned again.
                error!(user_id, error = %other, "scrape failed, dropping request");
                Ok(WorkerStatus::Progressed)
            }
        }
    }
}
