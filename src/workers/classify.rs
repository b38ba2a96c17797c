//! Classify worker (`spec.md` §4.7). Same shape as the entity worker, with
//! one extra case: an `InvalidArgument` from the NLP port is not an error at
//! the pipeline level, it's an empty classification, so the posts still
//! advance to `classified = true` instead of looping forever.

use std::sync::Arc;

use tracing::error;

use super::WorkerStatus;
use crate::broker::{Broker, REQ_CLASSIFY, RES_CLASSIFY};
use crate::error::{BrokerError, PortError};
use crate::models::wire::{ClassificationRequest, ClassificationResult};
use crate::ports::NlpApiPort;
use crate::ratelimit::{Clock, RateLimitKey, RateLimitRegistry};

pub struct ClassifyWorker<B: Broker, N: NlpApiPort> {
    broker: Arc<B>,
    port: Arc<N>,
    rate_limits: Arc<RateLimitRegistry>,
    clock: Arc<dyn Clock>,
    rate_limit_backoff_secs: i64,
}

impl<B: Broker, N: NlpApiPort> ClassifyWorker<B, N> {
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

        let Some(raw) = self.broker.pop_head(REQ_CLASSIFY).await? else {
            return Ok(WorkerStatus::Idle);
        };
        let request: ClassificationRequest = serde_json::from_str(&raw)?;

        match self.port.classify_text(&request.combined_text()).await {
            Ok(classification) => {
                self.push_result(&request, classification.categories).await?;
                Ok(WorkerStatus::Progressed)
            }
            Err(PortError::InvalidArgument(_)) => {
                self.push_result(&request, Vec::new()).await?;
                Ok(WorkerStatus::Progressed)
            }
            Err(PortError::RateLimited(_)) => {
                self.broker.push_head(REQ_CLASSIFY, raw).await?;
                self.rate_limits.bump(RateLimitKey::NlpApi, self.rate_limit_backoff_secs, self.clock.as_ref());
                Ok(WorkerStatus::Wait)
            }
            Err(other) => {
                error!(user_id = %request.user_id, error = %other, "classification failed, dropping request");
                Ok(WorkerStatus::Progressed)
            }
        }
    }

    async fn push_result(
        &self,
        request: &ClassificationRequest,
        categories: Vec<crate::models::wire::Category>,
    ) -> Result<(), BrokerError> {
        let result = ClassificationResult {
            user_id: request.user_id.clone(),
            post_ids: request.post_ids.clone(),
            categories,
        };
        let payload = serde_json::to_string(&result)?;
        self.broker.push_tail(RES_CLASSIFY, payload).await
    }
}
