//! Entity worker (`spec.md` §4.6).

use std::sync::Arc;

use tracing::error;

use super::WorkerStatus;
use crate::broker::{Broker, REQ_ENTITY, RES_ENTITY};
use crate::error::{BrokerError, PortError};
use crate::models::domain::Post;
use crate::models::wire::EntityResult;
use crate::ports::NlpApiPort;
use crate::ratelimit::{Clock, RateLimitKey, RateLimitRegistry};

/// Conservative fallback backoff when the NLP service rate-limits without a
/// precise reset time. Surfaced as `nlp.rate_limit_backoff_secs` config.
pub struct EntityWorker<B: Broker, N: NlpApiPort> {
    broker: Arc<B>,
    port: Arc<N>,
    rate_limits: Arc<RateLimitRegistry>,
    clock: Arc<dyn Clock>,
    rate_limit_backoff_secs: i64,
}

impl<B: Broker, N: NlpApiPort> EntityWorker<B, N> {
    pub fn new(
        broker: Arc<B>,
        port: Arc<N>,
        rate_limits: Arc<RateLimitRegistry>,
        clock: Arc<dyn Clock>,
        rate_limit_backoff_secs: i64,
    ) -> Self {
        Self {
            broker,
            port,
            rate_limits,
            clock,
            rate_limit_backoff_secs,
        }
    }

    pub async fn tick(&self) -> Result<WorkerStatus, BrokerError> {
        if self.rate_limits.time_until_reset(RateLimitKey::NlpApi, self.clock.as_ref()) > 0 {
            return Ok(WorkerStatus::Wait);
        }

        let Some(raw) = self.broker.pop_head(REQ_ENTITY).await? else {
            return Ok(WorkerStatus::Idle);
        };
        let post: Post = serde_json::from_str(&raw)?;

        match self.port.analyze_entities(&post.text).await {
            Ok(analysis) => {
                let result = EntityResult {
                    post_id: post.id.clone(),
                    entities: analysis.entities,
                };
                let payload = serde_json::to_string(&result)?;
                self.broker.push_tail(RES_ENTITY, payload).await?;
                Ok(WorkerStatus::Progressed)
            }
            Err(PortError::RateLimited(_)) => {
                self.broker.push_head(REQ_ENTITY, raw).await?;
                self.rate_limits.bump(RateLimitKey::NlpApi, self.rate_limit_backoff_secs, self.clock.as_ref());
                Ok(WorkerStatus::Wait)
            }
            Err(other) => {
                // post.id stays in `posts_in_flight`; operator must release it.
                error!(post_id = %post.id, error = %other, "entity extraction failed, dropping request");
                Ok(WorkerStatus::Progressed)
            }
        }
    }
}
