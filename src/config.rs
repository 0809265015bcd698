use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::error::DrivePulseError;

/// Bounded retry schedule for the storage plane at startup.
pub const STARTUP_RETRY_ATTEMPTS: u32 = 30;
pub const STARTUP_RETRY_DELAY_SECS: u64 = 10;

/// Server configuration, loaded once at startup from an optional TOML file
/// merged with `DRIVEPULSE_`-prefixed environment variables. A missing config
/// file falls back to defaults; a malformed one is fatal.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web: WebConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub notify: NotifyConfig,
    pub smart: SmartConfig,
    pub failures: FailuresConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Relational store (devices, pools, overrides, settings).
    pub path: Option<PathBuf>,
    /// Time-series store (SMART, temperature, performance, pool metrics).
    pub metrics_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmartConfig {
    /// Raw override entries from the config file. Decoded leniently by
    /// `overrides::parse_config`; undecodable content yields an empty list
    /// rather than an error.
    pub attribute_overrides: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FailuresConfig {
    pub transient: TransientFailures,
    pub ignored: IgnoredFailures,
}

/// ATA attribute ids whose failures are considered transient and are never
/// propagated into the aggregated device status.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransientFailures {
    pub ata: Vec<i32>,
}

/// Device-statistics ids excluded from device status propagation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IgnoredFailures {
    pub devstat: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            web: WebConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            notify: NotifyConfig::default(),
            smart: SmartConfig::default(),
            failures: FailuresConfig::default(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        WebConfig {
            host: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: None,
            metrics_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig { urls: Vec::new() }
    }
}

impl Default for SmartConfig {
    fn default() -> Self {
        SmartConfig {
            attribute_overrides: serde_json::Value::Null,
        }
    }
}

impl Default for FailuresConfig {
    fn default() -> Self {
        FailuresConfig {
            transient: TransientFailures::default(),
            ignored: IgnoredFailures::default(),
        }
    }
}

impl Default for TransientFailures {
    fn default() -> Self {
        TransientFailures { ata: Vec::new() }
    }
}

impl Default for IgnoredFailures {
    fn default() -> Self {
        IgnoredFailures {
            devstat: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the given file (or the default location under
    /// the project config directory) merged with environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Config, DrivePulseError> {
        let mut figment = Figment::new();

        let path = match config_path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed("DRIVEPULSE_").split("__"))
            .extract()
            .map_err(|e| DrivePulseError::ConfigError(format!("could not load configuration: {e}")))
    }

    pub fn transient_ata_attribute(&self, attribute_id: i32) -> bool {
        self.failures.transient.ata.contains(&attribute_id)
    }

    pub fn ignored_devstat_attribute(&self, attribute_id: &str) -> bool {
        self.failures
            .ignored
            .devstat
            .iter()
            .any(|id| id == attribute_id)
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "drivepulse")
        .map(|dirs| dirs.config_dir().join("drivepulse.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("nope.toml");
        let config = Config::load(Some(&missing)).expect("defaults should apply");
        assert_eq!(config.web.port, 9090);
        assert!(config.notify.urls.is_empty());
    }

    #[test]
    fn test_load_reads_values() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("drivepulse.toml");
        fs::write(
            &path,
            r#"
[web]
host = "127.0.0.1"
port = 8080

[notify]
urls = ["discord://token@channel"]

[failures.transient]
ata = [187]

[failures.ignored]
devstat = ["devstat_5_88"]
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).expect("config should load");
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.notify.urls.len(), 1);
        assert!(config.transient_ata_attribute(187));
        assert!(!config.transient_ata_attribute(5));
        assert!(config.ignored_devstat_attribute("devstat_5_88"));
    }

    #[test]
    fn test_load_malformed_file_is_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("drivepulse.toml");
        fs::write(&path, "[web\nport = not a number").unwrap();

        let result = Config::load(Some(&path));
        assert!(result.is_err(), "malformed config must be rejected");
    }
}
