//! Configuration, layered with figment: built-in defaults, then the YAML
//! file, then `STEWARD_` environment variables (`__` separates sections,
//! e.g. `STEWARD_DAEMON__TICK_SECS=5`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub log_level: String,
    /// Seconds between scheduler ticks.
    pub tick_secs: u64,
    /// Run period for continuous audits that carry no interval.
    pub default_interval_secs: u64,
    pub audit_store: PathBuf,
    /// Cluster model read by the `compute` collector on every audit run.
    pub model_file: PathBuf,
    /// Execute planned actions instead of only validating them.
    pub apply: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            tick_secs: 10,
            default_interval_secs: 3600,
            audit_store: data_dir().join("audits.json"),
            model_file: config_dir().join("cluster.yaml"),
            apply: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("steward")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("steward")
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("steward").join("config.yaml"))
    }

    /// Load from `path`, or from the default location. A missing file means
    /// defaults plus environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::path()?,
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(&path))
            .merge(Env::prefixed("STEWARD_").split("__"))
            .extract()
            .with_context(|| format!("loading configuration from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.yaml").as_path())).unwrap();
        assert_eq!(config.daemon.tick_secs, 10);
        assert_eq!(config.daemon.default_interval_secs, 3600);
        assert!(!config.daemon.apply);
        assert!(config.notifications.enabled);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "daemon:\n  tick_secs: 2\n  apply: true\n  model_file: /srv/cluster.yaml\nnotifications:\n  webhook_url: http://hooks.local/steward\n",
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.daemon.tick_secs, 2);
        assert!(config.daemon.apply);
        assert_eq!(config.daemon.model_file, PathBuf::from("/srv/cluster.yaml"));
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(
            config.notifications.webhook_url.as_deref(),
            Some("http://hooks.local/steward")
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "daemon:\n  tick_secs: soon\n").unwrap();
        assert!(Config::load(Some(path.as_path())).is_err());
    }
}
