use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use weft_database::{resolve_database_path, TASK_DB_PATH_ENV};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Store file path. Defaults to `{cwd}/.tasks/tasks.db`; the
    /// `TASK_DB_PATH` environment variable takes precedence over the
    /// default but not over an explicit config value.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GitConfig {
    /// Repository root. When unset the repository is discovered from the
    /// working directory.
    pub repo_root: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Config {
    /// Load configuration: embedded defaults, then an optional config
    /// file, then `WEFT_*` environment overrides, then the standard
    /// environment variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder.add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("WEFT")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Self::apply_standard_env_vars(&mut result);
        Ok(result)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(
                include_str!("../config/default.toml"),
                FileFormat::Toml,
            ))
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("WEFT")
                    .separator("_")
                    .try_parsing(true),
            );

        let config = builder
            .build()
            .context("Failed to build configuration from file")?;
        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration from file")?;

        Self::apply_standard_env_vars(&mut result);
        Ok(result)
    }

    /// Standard environment variables recognized independently of the
    /// WEFT_* prefix scheme
    fn apply_standard_env_vars(config: &mut Config) {
        if config.database.path.is_none() {
            if let Ok(path) = env::var(TASK_DB_PATH_ENV) {
                if !path.trim().is_empty() {
                    config.database.path = Some(path);
                }
            }
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
    }

    /// Effective store path
    pub fn database_path(&self) -> PathBuf {
        match &self.database.path {
            Some(path) => PathBuf::from(path),
            None => resolve_database_path(),
        }
    }

    /// Validate the configuration before startup
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(anyhow::anyhow!(
                    "Invalid log level: {other}. Must be one of: trace, debug, info, warn, error"
                ));
            }
        }

        if let Some(root) = &self.git.repo_root {
            if !PathBuf::from(root).is_dir() {
                return Err(anyhow::anyhow!(
                    "Configured repo_root is not a directory: {root}"
                ));
            }
        }

        Ok(())
    }
}
