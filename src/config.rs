//! Configuration management for the scoring service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the optional configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Prefix for environment overrides, e.g. `FRAUD_SCORING__SERVER__BIND`
pub const ENV_PREFIX: &str = "FRAUD_SCORING";

/// Main application configuration.
///
/// The decision threshold is deliberately absent: it is resolved by
/// [`crate::threshold::ThresholdLoader`] so its source stays visible.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub nats: NatsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Model and threshold artifact locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Trained model artifact (JSON)
    pub artifact_path: PathBuf,
    /// Threshold artifact; first source in the threshold fallback chain
    pub threshold_path: Option<PathBuf>,
    /// Environment variable consulted when the threshold file is unusable
    pub threshold_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("models/fraud_model.json"),
            threshold_path: Some(PathBuf::from("models/threshold.json")),
            threshold_env: crate::threshold::DEFAULT_THRESHOLD_ENV.to_string(),
        }
    }
}

/// NATS streaming lane configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Run the streaming lane next to the HTTP surface
    pub enabled: bool,
    /// NATS server URL
    pub url: String,
    /// Subject for incoming scoring events
    pub transaction_subject: String,
    /// Subject for outgoing decisions
    pub decision_subject: String,
    /// Publish every decision instead of flagged ones only
    pub publish_all: bool,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "nats://localhost:4222".to_string(),
            transaction_subject: "transactions".to_string(),
            decision_subject: "fraud.decisions".to_string(),
            publish_all: false,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent scoring tasks on the streaming lane
    pub workers: usize,
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
    /// Seconds a transaction id is remembered for redelivery suppression
    pub dedup_ttl_secs: u64,
    /// Transaction ids remembered at most
    pub dedup_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 30,
            dedup_ttl_secs: 600,
            dedup_capacity: 100_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path. A missing file is not an
    /// error; every setting has a default.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }
        if self.pipeline.metrics_interval_secs == 0 {
            anyhow::bail!("pipeline.metrics_interval_secs must be at least 1");
        }
        if self.pipeline.dedup_capacity == 0 {
            anyhow::bail!("pipeline.dedup_capacity must be at least 1");
        }
        Ok(())
    }
}
