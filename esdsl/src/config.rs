//! Configuration management for esdsl
//!
//! Default config location: ~/.esdsl/config.toml

use crate::query::TimeZone;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub datasource: DatasourceConfig,
    #[serde(default)]
    pub timezone: TimezoneConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasourceConfig {
    /// Document field holding the event timestamp
    #[serde(default = "default_time_field")]
    pub time_field: String,
    /// Elasticsearch major version; 2 and later use epoch_millis date formats
    #[serde(default = "default_es_version")]
    pub es_version: u32,
}

fn default_time_field() -> String {
    "@timestamp".to_string()
}

fn default_es_version() -> u32 {
    2
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            time_field: default_time_field(),
            es_version: default_es_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimezoneConfig {
    /// "browser" buckets in the viewer's zone, anything else in UTC
    #[serde(default = "default_tz_preference")]
    pub preference: String,
    /// Resolved zone name for the browser preference, e.g. "Europe/Oslo"
    #[serde(default)]
    pub name: Option<String>,
}

fn default_tz_preference() -> String {
    "browser".to_string()
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            preference: default_tz_preference(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_level")]
    pub level: String,

    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_log_format(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".esdsl")
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Default config file path (~/.esdsl/config.toml)
    pub fn default_path() -> PathBuf {
        default_config_dir().join("config.toml")
    }

    /// Load config from default location, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from a file path; a missing file yields defaults
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_path = expand_tilde(config_path)?;
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            tracing::debug!("No config at {:?}, using defaults", config_path);
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        let config_path = expand_tilde(config_path)?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            if let Err(e) = config.save(&config_path) {
                tracing::warn!("Could not write default config to {:?}: {}", config_path, e);
            }
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.datasource.time_field.trim().is_empty() {
            return Err(anyhow!("datasource.time_field must not be empty"));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(anyhow!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                other
            )),
        }
    }

    /// Timezone handling for date histograms
    pub fn time_zone(&self) -> TimeZone {
        if self.timezone.preference == "browser" {
            TimeZone::Browser {
                name: self.timezone.name.clone(),
            }
        } else {
            TimeZone::Utc
        }
    }
}
