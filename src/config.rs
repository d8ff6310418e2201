//! Application configuration: an optional TOML file layered with
//! `FRAUD_ASSISTANT__*` environment variables.

use crate::models::Algorithm;
use crate::rules::DecisionThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const ENV_PREFIX: &str = "FRAUD_ASSISTANT";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub models: ModelsConfig,
    pub decision: DecisionThresholds,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

/// Training dataset location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Labelled CSV with a `Class` column
    pub path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/creditcard.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding `{algorithm}_model.json` bundles
    pub dir: PathBuf,
    /// Algorithm activated at startup
    pub default_algorithm: Algorithm,
    /// Reported with every decision
    pub model_version: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            default_algorithm: Algorithm::Ann,
            model_version: "v1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// SQLite users database; without one the chatbot knows no accounts
    pub accounts_db: Option<PathBuf>,
}

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

impl AppConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] (if present) and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file, which may be missing, then apply
    /// environment overrides such as `FRAUD_ASSISTANT__MODELS__DIR`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let d = &self.decision;
        if !(0.0..=1.0).contains(&d.allow) || !(0.0..=1.0).contains(&d.challenge) || d.allow > d.challenge {
            anyhow::bail!(
                "decision thresholds must satisfy 0 <= allow <= challenge <= 1 (got allow={}, challenge={})",
                d.allow,
                d.challenge
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.data.path, PathBuf::from("data/creditcard.csv"));
        assert_eq!(config.models.dir, PathBuf::from("models"));
        assert_eq!(config.models.default_algorithm, Algorithm::Ann);
        assert_eq!(config.models.model_version, "v1.0");
        assert_eq!(config.decision, DecisionThresholds::default());
        assert!(config.chat.accounts_db.is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::load_from_path("/definitely/not/here.toml").unwrap();
        assert_eq!(config.models.model_version, "v1.0");
    }

    #[test]
    fn test_partial_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[models]\ndefault_algorithm = \"knn\"\n\n[decision]\nchallenge = 0.2\n"
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.models.default_algorithm, Algorithm::Knn);
        assert_eq!(config.models.dir, PathBuf::from("models"));
        assert_eq!(config.decision.allow, 0.01);
        assert_eq!(config.decision.challenge, 0.2);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[decision]\nallow = 0.5\nchallenge = 0.1\n").unwrap();
        assert!(AppConfig::load_from_path(file.path()).is_err());
    }
}
