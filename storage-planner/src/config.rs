// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default capacity of the apply progress channel
pub const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// Environment variable holding the session secret unless configured otherwise
pub const DEFAULT_SECRET_ENV: &str = "STORAGE_PLANNER_SECRET";

const CONFIG_DIR: &str = "storage-planner";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    pub log_level: LoggingLevel,
    pub log_to_disk: bool,
    pub progress_channel_capacity: usize,
    /// Name of the environment variable carrying the session secret
    pub secret_env: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            log_level: LoggingLevel::Info,
            log_to_disk: true,
            progress_channel_capacity: PROGRESS_CHANNEL_CAPACITY,
            secret_env: DEFAULT_SECRET_ENV.to_string(),
        }
    }
}

impl PlannerConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        Self::parse(&raw).map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Load `$XDG_CONFIG_HOME/storage-planner/config.toml`
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let mut config: Self = toml::from_str(raw).map_err(|error| error.to_string())?;

        if config.progress_channel_capacity == 0 {
            return Err("progress_channel_capacity must be at least 1".to_string());
        }
        if config.secret_env.trim().is_empty() {
            config.secret_env = DEFAULT_SECRET_ENV.to_string();
        }

        Ok(config)
    }
}

fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config) = std::env::var_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join(CONFIG_DIR).join(CONFIG_FILE));
    }

    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR)
            .join(CONFIG_FILE)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(PlannerConfig::parse("").expect("parse"), PlannerConfig::default());
    }

    #[test]
    fn partial_file_overrides_fields() {
        let config = PlannerConfig::parse(
            r#"
log_level = "debug"
log_to_disk = false
"#,
        )
        .expect("parse");

        assert_eq!(config.log_level, LoggingLevel::Debug);
        assert!(!config.log_to_disk);
        assert_eq!(config.progress_channel_capacity, PROGRESS_CHANNEL_CAPACITY);
        assert_eq!(config.secret_env, DEFAULT_SECRET_ENV);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(PlannerConfig::parse("progress_channel_capacity = 0").is_err());
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(PlannerConfig::parse(r#"log_level = "chatty""#).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = Path::new("/nonexistent/storage-planner/config.toml");
        assert_eq!(
            PlannerConfig::load(path).expect("load"),
            PlannerConfig::default()
        );
    }
}
