//! Discoverer (`spec.md` §4.8): walks one user's follow-graph per tick to
//! seed new accounts into the store, under the same posts-API rate limit the
//! scrape worker honours.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info};

use crate::error::{PipelineError, PortError};
use crate::models::domain::User;
use crate::ports::PostsApiPort;
use crate::ratelimit::{Clock, RateLimitKey, RateLimitRegistry};
use crate::store::Store;
use crate::workers::WorkerStatus;

pub struct Discoverer<S: Store, P: PostsApiPort> {
    store: Arc<S>,
    port: Arc<P>,
    rate_limits: Arc<RateLimitRegistry>,
    clock: Arc<dyn Clock>,
}

impl<S: Store, P: PostsApiPort> Discoverer<S, P> {
    pub fn new(store: Arc<S>, port: Arc<P>, rate_limits: Arc<RateLimitRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            port,
            rate_limits,
            clock,
        }
    }

    pub async fn tick(&self) -> Result<WorkerStatus, PipelineError> {
        if self.rate_limits.time_until_reset(RateLimitKey::PostsApi, self.clock.as_ref()) > 0 {
            return Ok(WorkerStatus::Wait);
        }

        let Some(user) = self.store.next_user_pending_follow_scan().await? else {
            return Ok(WorkerStatus::Idle);
        };

        let mut stream = self.port.iterate_following(&user.id);
        let mut discovered = 0usize;
        loop {
            match stream.next().await {
                Some(Ok(followed)) => {
                    self.upsert_if_unknown(&followed).await?;
                    discovered += 1;
                }
                Some(Err(PortError::RateLimited(reset_epoch))) => {
                    self.rate_limits.set_reset(RateLimitKey::PostsApi, reset_epoch);
                    return Ok(WorkerStatus::Wait);
                }
                Some(Err(other)) => {
                    // Pagination did not complete cleanly: leave scraped_following
                    // unset so this user is retried on a later tick.
                    error!(user_id = %user.id, error = %other, "follow-graph scan failed, will retry later");
                    return Ok(WorkerStatus::Progressed);
                }
                None => break,
            }
        }

        self.store.set_scraped_following(&user.id, true).await?;
        info!(user_id = %user.id, discovered, "completed follow-graph scan");
        Ok(WorkerStatus::Progressed)
    }

    async fn upsert_if_unknown(&self, candidate: &User) -> Result<(), PipelineError> {
        self.store.upsert_user(candidate).await?;
        Ok(())
    }
}
