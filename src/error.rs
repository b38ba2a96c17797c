//! Crate-wide error taxonomy, mirroring the transient/fatal split in `spec.md` §7.

use thiserror::Error;

/// Errors raised by the two external ports (posts-API, NLP). Mirrors the
/// teacher's `ApiError` (`Reqwest`/`Serde`/`Other`), extended with the two
/// variants the spec requires the core to distinguish.
#[derive(Debug, Error)]
pub enum PortError {
    /// The external service is throttling us; retry no sooner than this epoch second.
    #[error("rate limited until epoch {0}")]
    RateLimited(i64),

    /// `classify_text` could not classify the given text (too short / unclassifiable).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other request failure. Logged and dropped by the worker, not retried.
    #[error("request failed (status {status:?}): {message}")]
    Request {
        status: Option<u16>,
        message: String,
    },
}

impl From<reqwest::Error> for PortError {
    fn from(err: reqwest::Error) -> Self {
        PortError::Request {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PortError {
    fn from(err: serde_json::Error) -> Self {
        PortError::Request {
            status: None,
            message: err.to_string(),
        }
    }
}

/// Errors raised by the [`crate::store::Store`]. All are fatal to the
/// coordinator's current operation but not to the process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised by the [`crate::broker::Broker`].
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Top-level error the coordinator and the binaries surface. Per `spec.md` §7,
/// only store/broker-level faults propagate out of the pipeline; port errors are
/// translated to `WAIT` / `IDLE` / log-and-drop inside each worker and never reach here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("user {0:?} not found via posts-API port")]
    UserNotFound(String),

    #[error(transparent)]
    Port(#[from] PortError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
