//! TOML-based application configuration for TopicsGit.
//!
//! This covers where the host store lives and how the tool logs. The backup
//! settings themselves (repository, committer identity) are host data and are
//! persisted through [`crate::host::SettingsStore`], not here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Directory name used when no default repository is configured.
pub const DEFAULT_REPOSITORY_DIR: &str = "TopicsBackup";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging and data directory.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Host store location and scope.
    #[serde(default)]
    pub host: HostConfig,

    /// Install-time defaults.
    #[serde(default)]
    pub install: InstallConfig,
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for persistent data.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/topicsgit")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// SQLite file holding topics, languages, and settings.
    /// Defaults to `<data_dir>/host.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Store whose topics are backed up; 0 means every store.
    #[serde(default)]
    pub store_id: i64,
}

// ---------------------------------------------------------------------------
// Install
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Repository created by `install` when no path is given.
    /// Defaults to `<data_dir>/TopicsBackup`.
    #[serde(default)]
    pub default_repository: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.general.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        if self.general.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "general.data_dir".into(),
                detail: "data directory must not be empty".into(),
            });
        }
        if self.host.store_id < 0 {
            return Err(ConfigError::InvalidValue {
                field: "host.store_id".into(),
                detail: "store id must be >= 0".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.host
            .database
            .clone()
            .unwrap_or_else(|| self.general.data_dir.join("host.db"))
    }

    pub fn default_repository(&self) -> PathBuf {
        self.install
            .default_repository
            .clone()
            .unwrap_or_else(|| self.general.data_dir.join(DEFAULT_REPOSITORY_DIR))
    }
}
