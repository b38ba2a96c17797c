use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use topic_pipeline::broker::RedisBroker;
use topic_pipeline::cli::{Cli, Commands, RunMode};
use topic_pipeline::config::{PipelineMode, Settings};
use topic_pipeline::coordinator::Coordinator;
use topic_pipeline::pipeline::Pipeline;
use topic_pipeline::ports::http::{HttpNlpApiPort, HttpPostsApiPort};
use topic_pipeline::ports::PostsApiPort;
use topic_pipeline::store::{PgStore, Store};
use topic_pipeline::telemetry;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let store = Arc::new(PgStore::connect(&settings.store.path).await?);
    store.migrate().await?;
    let broker = Arc::new(RedisBroker::connect(&settings.broker.redis_url()).await?);

    match cli.command {
        Commands::EnqueueUser { username } => {
            let posts_api = build_posts_api(&settings);
            enqueue_user_by_username(store.as_ref(), posts_api.as_ref(), &username).await?;
        }
        Commands::ReleaseUser { user_id } => {
            let coordinator = Coordinator::new(store.clone(), broker.clone(), settings.scrape.rescrape_after_days);
            coordinator.release_stuck_user(&user_id).await?;
        }
        Commands::ReleasePost { post_id } => {
            let coordinator = Coordinator::new(store.clone(), broker.clone(), settings.scrape.rescrape_after_days);
            coordinator.release_stuck_post(&post_id).await?;
        }
        Commands::Run { mode } => {
            let posts_api = build_posts_api(&settings);
            let nlp_api = Arc::new(
                HttpNlpApiPort::builder()
                    .base_url(settings.nlp_api.base_url.clone())
                    .api_key(settings.nlp_api.api_key.expose_secret().to_string())
                    .build(),
            );

            let pipeline = Pipeline::new(
                store,
                broker,
                posts_api,
                nlp_api,
                settings.scrape.rescrape_after_days,
                settings.scrape.posts_per_fetch,
                settings.nlp.rate_limit_backoff_secs,
            );

            let effective_mode = mode.unwrap_or(match settings.pipeline.mode {
                PipelineMode::Batch => RunMode::Batch,
                PipelineMode::Continuous => RunMode::Continuous,
            });

            match effective_mode {
                RunMode::Batch => pipeline.run_batch().await?,
                RunMode::Continuous => {
                    let cancel = CancellationToken::new();
                    let shutdown = cancel.clone();
                    tokio::spawn(async move {
                        let _ = tokio::signal::ctrl_c().await;
                        info!("shutdown signal received");
                        shutdown.cancel();
                    });
                    pipeline
                        .run_continuous(settings.pipeline.continuous_tick_millis, cancel)
                        .await?;
                }
            }
        }
    }

    Ok(())
}

fn build_posts_api(settings: &Settings) -> Arc<HttpPostsApiPort> {
    Arc::new(
        HttpPostsApiPort::builder()
            .base_url(settings.posts_api.base_url.clone())
            .api_key(settings.posts_api.api_key.expose_secret().to_string())
            .build(),
    )
}

async fn enqueue_user_by_username<S: Store, P: PostsApiPort>(
    store: &S,
    posts_api: &P,
    username: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(existing) = store.user_by_username(username).await? {
        store.clear_last_scraped(&existing.id).await?;
        info!(username, "user already known, forcing re-scrape");
        return Ok(());
    }

    match posts_api.get_user_by_username(username).await? {
        Some(user) => {
            store.upsert_user(&user).await?;
            info!(username, user_id = %user.id, "enqueued new user");
        }
        None => {
            error!(username, "user not found via posts API");
        }
    }
    Ok(())
}
