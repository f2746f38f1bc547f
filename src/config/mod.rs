//! Configuration loading for the assistant.
//!
//! ## Design
//! - TOML file, every section optional (`#[serde(default)]`)
//! - Default location: `<config dir>/dolmetscher/config.toml`
//! - A few secrets and deployment knobs can be overridden from the environment
//! - `validate` catches table inconsistencies at startup; hot reload is not supported

pub mod schema;

pub use schema::{
    AccessConfig, Config, GeneralConfig, LogLevel, LoggingConfig, PipelineConfig,
    ServicesConfig, StorageBackend, StorageConfig, SynthesisEncoding, TierConfig,
};

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::Catalogs;

/// Environment variable overriding `services.google_api_key`.
pub const ENV_GOOGLE_API_KEY: &str = "DOLMETSCHER_GOOGLE_API_KEY";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "DOLMETSCHER_LOG_LEVEL";
/// Environment variable overriding `storage.sqlite_path` (and selecting sqlite).
pub const ENV_STORAGE_PATH: &str = "DOLMETSCHER_STORAGE_PATH";

impl Config {
    /// Default config file path.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "dolmetscher")
            .context("Could not determine the user config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// when present and built-in defaults otherwise. Environment overrides
    /// are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path()?;
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    tracing::debug!(
                        path = %default.display(),
                        "No config file found, using built-in defaults"
                    );
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse without overrides or validation.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_GOOGLE_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.services.google_api_key = Some(key.trim().to_string());
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            match LogLevel::parse(&level) {
                Some(level) => self.logging.level = level,
                None => tracing::warn!("Ignoring invalid {ENV_LOG_LEVEL}={level}"),
            }
        }

        if let Some(path) = lookup(ENV_STORAGE_PATH).filter(|v| !v.trim().is_empty()) {
            self.storage.backend = StorageBackend::Sqlite;
            self.storage.sqlite_path = path;
        }
    }

    /// Check cross-table consistency: catalogs build, time zone parses,
    /// overrides are well-formed.
    pub fn validate(&self) -> Result<()> {
        Catalogs::from_config(self)?;
        self.timezone()?;

        if self.pipeline.stage_timeout_secs == 0 {
            bail!("pipeline.stage_timeout_secs must be greater than zero");
        }
        if self.pipeline.recognition_sample_rate == 0 {
            bail!("pipeline.recognition_sample_rate must be greater than zero");
        }
        if self.ui_languages.iter().any(|l| l.trim().is_empty()) {
            bail!("ui_languages must not contain empty entries");
        }
        if self
            .access
            .unlimited_users
            .iter()
            .chain(&self.access.admins)
            .any(|u| u.trim().is_empty())
        {
            bail!("[access] user lists must not contain empty ids");
        }

        Ok(())
    }

    /// Time zone that defines the quota day.
    pub fn timezone(&self) -> Result<Tz> {
        self.general
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid general.timezone '{}': {e}", self.general.timezone))
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.stage_timeout_secs)
    }

    /// SQLite path with `~` and environment variables expanded.
    pub fn sqlite_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.storage.sqlite_path).with_context(|| {
            format!("Failed to expand storage.sqlite_path '{}'", self.storage.sqlite_path)
        })?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}
