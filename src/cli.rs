//! Operator surface (`spec.md` §6): two commands, plus the stuck-record
//! release tool from the open question in §9. Built with `clap`, the same
//! derive style the teacher's own scraper binary used for its few flags.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "topic-pipeline", about = "Staged work-queue topic pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum RunMode {
    Batch,
    Continuous,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Looks up `username` via the posts API and enqueues it as a known user
    /// (the discoverer path, reachable without waiting for a follow-scan).
    EnqueueUser { username: String },

    /// Runs the pipeline. `--mode` overrides `pipeline.mode` from config.
    Run {
        #[arg(long, value_enum)]
        mode: Option<RunMode>,
    },

    /// Clears a user id stuck in `users_in_flight` after a non-rate-limit
    /// scrape failure, so it is picked up on the next scan.
    ReleaseUser { user_id: String },

    /// Clears a post id stuck in `posts_in_flight` after a non-rate-limit
    /// entity/classify failure.
    ReleasePost { post_id: String },
}
