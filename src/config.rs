//! Application configuration, layered the way the example pack's CMS config
//! module does it: a `config/default.toml` base, overridden by environment
//! variables. Credentials are held in [`SecretString`] so they never leak
//! into `Debug` output or logs.

use secrecy::SecretString;
use serde::Deserialize;

/// The scheduling discipline the pipeline runs under (`spec.md` §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    Batch,
    Continuous,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub db: u8,
}

impl BrokerSettings {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Relational store location, e.g. a `postgres://` connection string.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    pub mode: PipelineMode,
    /// Sleep between rounds in continuous mode, in milliseconds.
    #[serde(default = "default_continuous_tick_millis")]
    pub continuous_tick_millis: u64,
}

fn default_continuous_tick_millis() -> u64 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeSettings {
    #[serde(default = "default_posts_per_fetch")]
    pub posts_per_fetch: u32,
    #[serde(default = "default_rescrape_after_days")]
    pub rescrape_after_days: i64,
}

fn default_posts_per_fetch() -> u32 {
    10
}

fn default_rescrape_after_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpSettings {
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: i64,
}

fn default_rate_limit_backoff_secs() -> i64 {
    15 * 60
}

/// Opaque-to-the-core credentials for one external service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCredentials {
    pub base_url: String,
    pub api_key: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub store: StoreSettings,
    pub pipeline: PipelineSettings,
    pub scrape: ScrapeSettings,
    pub nlp: NlpSettings,
    pub posts_api: ApiCredentials,
    pub nlp_api: ApiCredentials,
}

impl Settings {
    /// Loads `config/default.toml`, then `config/local.toml` if present, then
    /// environment variables prefixed `PIPELINE__` (double underscore separated,
    /// e.g. `PIPELINE__BROKER__HOST=broker.internal`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let cfg = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("PIPELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}
