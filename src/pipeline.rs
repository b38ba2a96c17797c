//! Top-level pipeline (`spec.md` §4.9): wires the coordinator, the three
//! workers and the discoverer together under one of the two scheduling
//! disciplines.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::Broker;
use crate::coordinator::Coordinator;
use crate::discoverer::Discoverer;
use crate::error::PipelineError;
use crate::ports::{NlpApiPort, PostsApiPort};
use crate::ratelimit::{Clock, RateLimitKey, RateLimitRegistry, SystemClock};
use crate::store::Store;
use crate::workers::classify::ClassifyWorker;
use crate::workers::entity::EntityWorker;
use crate::workers::scrape::ScrapeWorker;
use crate::workers::WorkerStatus;

pub struct Pipeline<S: Store, B: Broker, P: PostsApiPort, N: NlpApiPort> {
    coordinator: Coordinator<S, B>,
    scrape: ScrapeWorker<B, P>,
    entity: EntityWorker<B, N>,
    classify: ClassifyWorker<B, N>,
    discoverer: Discoverer<S, P>,
    rate_limits: Arc<RateLimitRegistry>,
    clock: Arc<dyn Clock>,
}

impl<S: Store, B: Broker, P: PostsApiPort, N: NlpApiPort> Pipeline<S, B, P, N> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        broker: Arc<B>,
        posts_api: Arc<P>,
        nlp_api: Arc<N>,
        rescrape_after_days: i64,
        posts_per_fetch: u32,
        nlp_rate_limit_backoff_secs: i64,
    ) -> Self {
        let rate_limits = RateLimitRegistry::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let coordinator = Coordinator::new(store.clone(), broker.clone(), rescrape_after_days);
        let scrape = ScrapeWorker::new(
            broker.clone(),
            posts_api.clone(),
            rate_limits.clone(),
            clock.clone(),
            posts_per_fetch,
        );
        let entity = EntityWorker::new(
            broker.clone(),
            nlp_api.clone(),
            rate_limits.clone(),
            clock.clone(),
            nlp_rate_limit_backoff_secs,
        );
        let classify = ClassifyWorker::new(
            broker.clone(),
            nlp_api.clone(),
            rate_limits.clone(),
            clock.clone(),
            nlp_rate_limit_backoff_secs,
        );
        let discoverer = Discoverer::new(store, posts_api, rate_limits.clone(), clock.clone());

        Self {
            coordinator,
            scrape,
            entity,
            classify,
            discoverer,
            rate_limits,
            clock,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<S, B> {
        &self.coordinator
    }

    /// One drain-then-enqueue cycle, then run every worker stage to
    /// exhaustion (IDLE), honouring WAIT by sleeping until the relevant
    /// rate-limit reset. Terminates, per `spec.md` §4.9's batch semantics.
    pub async fn run_batch(&self) -> Result<(), PipelineError> {
        self.coordinator.drain_all().await?;
        self.coordinator.enqueue_all().await?;

        self.run_stage_to_idle("scrape", RateLimitKey::PostsApi, || self.scrape.tick())
            .await?;
        self.coordinator.drain_scrape().await?;
        self.coordinator.enqueue_entity().await?;

        self.run_stage_to_idle("entity", RateLimitKey::NlpApi, || self.entity.tick())
            .await?;
        self.coordinator.drain_entity().await?;
        self.coordinator.enqueue_classify().await?;

        self.run_stage_to_idle("classify", RateLimitKey::NlpApi, || self.classify.tick())
            .await?;
        self.coordinator.drain_classify().await?;

        info!("batch run complete");
        Ok(())
    }

    async fn run_stage_to_idle<F, Fut>(
        &self,
        stage: &str,
        key: RateLimitKey,
        mut tick: F,
    ) -> Result<(), PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<WorkerStatus, crate::error::BrokerError>>,
    {
        loop {
            match tick().await? {
                WorkerStatus::Idle => return Ok(()),
                WorkerStatus::Progressed => continue,
                WorkerStatus::Wait => {
                    let wait_secs = self.rate_limits.time_until_reset(key, self.clock.as_ref());
                    info!(stage, wait_secs, "stage waiting on rate limit");
                    sleep(StdDuration::from_secs(wait_secs.max(0) as u64)).await;
                }
            }
        }
    }

    /// Round-robin tick of every role with a small fixed sleep between
    /// rounds, until `cancel` fires.
    pub async fn run_continuous(&self, tick_millis: u64, cancel: CancellationToken) -> Result<(), PipelineError> {
        loop {
            if cancel.is_cancelled() {
                info!("continuous run cancelled");
                return Ok(());
            }

            self.coordinator.process().await?;
            self.scrape.tick().await?;
            self.entity.tick().await?;
            self.classify.tick().await?;
            self.discoverer.tick().await?;

            tokio::select! {
                _ = sleep(StdDuration::from_millis(tick_millis)) => {}
                _ = cancel.cancelled() => {
                    info!("continuous run cancelled");
                    return Ok(());
                }
            }
        }
    }
}
