//! Operating threshold artifact and its startup fallback chain.
//!
//! Precedence: persisted threshold file, then environment variable, then the
//! hard-coded default. A broken source is logged and skipped, never surfaced.

use crate::error::ThresholdError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Threshold used when neither file nor environment provide one
pub const DEFAULT_THRESHOLD: f64 = 0.98;

/// Environment variable consulted when no threshold file is usable
pub const DEFAULT_THRESHOLD_ENV: &str = "MODEL_THRESHOLD";

/// Persisted threshold record. Only `threshold` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdArtifact {
    pub threshold: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_precision: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_precision: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_recall: Option<f64>,

    /// False when no cut point met the target and the fallback was used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub met_target: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_at: Option<DateTime<Utc>>,
}

impl ThresholdArtifact {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            target_precision: None,
            validation_precision: None,
            validation_recall: None,
            met_target: None,
            selected_at: None,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        use anyhow::Context;

        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write threshold file {}", path.display()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ThresholdError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ThresholdError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: Self = serde_json::from_str(&text).map_err(|source| ThresholdError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        check_range(artifact.threshold)?;
        Ok(artifact)
    }
}

/// Where the active threshold came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdSource {
    File { path: PathBuf },
    Environment { variable: String },
    Default,
}

impl fmt::Display for ThresholdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdSource::File { path } => write!(f, "file:{}", path.display()),
            ThresholdSource::Environment { variable } => write!(f, "env:{variable}"),
            ThresholdSource::Default => write!(f, "default"),
        }
    }
}

/// The single active threshold of a running service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    value: f64,
    source: ThresholdSource,
}

impl ThresholdConfig {
    /// Build a threshold from an explicit value, e.g. in tests.
    pub fn new(value: f64, source: ThresholdSource) -> Result<Self, ThresholdError> {
        check_range(value)?;
        Ok(Self { value, source })
    }

    pub fn default_fallback() -> Self {
        Self {
            value: DEFAULT_THRESHOLD,
            source: ThresholdSource::Default,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn source(&self) -> &ThresholdSource {
        &self.source
    }
}

fn check_range(value: f64) -> Result<f64, ThresholdError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ThresholdError::OutOfRange(value))
    }
}

fn parse_env_value(raw: &str) -> Result<f64, ThresholdError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ThresholdError::NotANumber(raw.to_string()))?;
    check_range(value)
}

/// Resolves the active threshold once at startup.
pub struct ThresholdLoader {
    file: Option<PathBuf>,
    env_var: String,
}

impl ThresholdLoader {
    pub fn new(file: Option<PathBuf>, env_var: impl Into<String>) -> Self {
        Self {
            file,
            env_var: env_var.into(),
        }
    }

    /// Resolve against the process environment.
    pub fn load(&self) -> ThresholdConfig {
        self.resolve(std::env::var(&self.env_var).ok())
    }

    /// Resolve with an explicit environment value; `load` delegates here.
    pub fn resolve(&self, env_value: Option<String>) -> ThresholdConfig {
        if let Some(path) = &self.file {
            if path.exists() {
                match ThresholdArtifact::load(path) {
                    Ok(artifact) => {
                        let config = ThresholdConfig {
                            value: artifact.threshold,
                            source: ThresholdSource::File { path: path.clone() },
                        };
                        info!(threshold = config.value, source = %config.source, "Threshold loaded");
                        return config;
                    }
                    Err(e) => {
                        warn!(error = %e, "Ignoring threshold file, falling back");
                    }
                }
            }
        }

        if let Some(raw) = env_value {
            match parse_env_value(&raw) {
                Ok(value) => {
                    let config = ThresholdConfig {
                        value,
                        source: ThresholdSource::Environment {
                            variable: self.env_var.clone(),
                        },
                    };
                    info!(threshold = config.value, source = %config.source, "Threshold loaded");
                    return config;
                }
                Err(e) => {
                    warn!(
                        variable = %self.env_var,
                        error = %e,
                        "Ignoring threshold environment variable, falling back"
                    );
                }
            }
        }

        info!(threshold = DEFAULT_THRESHOLD, "Using default threshold");
        ThresholdConfig::default_fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_threshold(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("threshold.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_default_when_nothing_configured() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ThresholdLoader::new(Some(dir.path().join("threshold.json")), "UNUSED");

        let config = loader.resolve(None);

        assert_eq!(config.value(), DEFAULT_THRESHOLD);
        assert_eq!(config.source(), &ThresholdSource::Default);
    }

    #[test]
    fn test_load_reads_process_environment() {
        let variable = "FRAUD_SCORING_TEST_THRESHOLD_LOAD";
        std::env::set_var(variable, "0.91");
        let loader = ThresholdLoader::new(None, variable);

        let config = loader.load();
        std::env::remove_var(variable);

        assert_eq!(config.value(), 0.91);
        assert_eq!(
            config.source(),
            &ThresholdSource::Environment {
                variable: variable.to_string()
            }
        );
        assert_eq!(loader.load().source(), &ThresholdSource::Default);
    }

    #[test]
    fn test_environment_used_without_file() {
        let loader = ThresholdLoader::new(None, "MODEL_THRESHOLD");

        let config = loader.resolve(Some("0.87".to_string()));

        assert_eq!(config.value(), 0.87);
        assert_eq!(
            config.source(),
            &ThresholdSource::Environment {
                variable: "MODEL_THRESHOLD".to_string()
            }
        );
    }

    #[test]
    fn test_file_takes_precedence_over_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_threshold(dir.path(), r#"{"threshold": 0.42}"#);
        let loader = ThresholdLoader::new(Some(path.clone()), "MODEL_THRESHOLD");

        let config = loader.resolve(Some("0.87".to_string()));

        assert_eq!(config.value(), 0.42);
        assert_eq!(config.source(), &ThresholdSource::File { path });
    }

    #[test]
    fn test_malformed_file_falls_back_to_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_threshold(dir.path(), "threshold = high");
        let loader = ThresholdLoader::new(Some(path), "MODEL_THRESHOLD");

        assert_eq!(loader.resolve(Some("0.9".to_string())).value(), 0.9);
        assert_eq!(loader.resolve(None).value(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_out_of_range_sources_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_threshold(dir.path(), r#"{"threshold": 1.5}"#);
        let loader = ThresholdLoader::new(Some(path), "MODEL_THRESHOLD");

        let config = loader.resolve(Some("-0.1".to_string()));

        assert_eq!(config.value(), DEFAULT_THRESHOLD);
        assert_eq!(config.source(), &ThresholdSource::Default);
    }

    #[test]
    fn test_unparseable_environment_is_skipped() {
        let loader = ThresholdLoader::new(None, "MODEL_THRESHOLD");

        assert_eq!(loader.resolve(Some("lots".to_string())).value(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_artifact_round_trip_keeps_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("threshold.json");
        let artifact = ThresholdArtifact {
            target_precision: Some(0.9),
            validation_precision: Some(0.93),
            validation_recall: Some(0.41),
            met_target: Some(true),
            ..ThresholdArtifact::new(0.73)
        };

        artifact.save(&path).unwrap();

        assert_eq!(ThresholdArtifact::load(&path).unwrap(), artifact);
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["threshold"], 0.73);
    }

    #[test]
    fn test_explicit_config_validates_range() {
        assert!(ThresholdConfig::new(0.5, ThresholdSource::Default).is_ok());
        assert!(ThresholdConfig::new(f64::NAN, ThresholdSource::Default).is_err());
    }
}
