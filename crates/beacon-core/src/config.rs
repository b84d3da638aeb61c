//! beacon.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid beacon.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    /// Services registered at startup. Existing URLs are left untouched.
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tick_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub tick_policy: TickPolicy,
    pub user_agent: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 30_000,
            probe_timeout_ms: 10_000,
            tick_policy: TickPolicy::Overlap,
            user_agent: concat!("beacon-monitor/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl MonitorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// What to do when a tick fires while the previous one is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TickPolicy {
    /// Start the new tick anyway; ticks may run concurrently.
    #[default]
    Overlap,
    /// Skip the new tick until the running one completes.
    SkipIfBusy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/beacon"),
        }
    }
}

impl StorageSettings {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("beacon.redb")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

impl BeaconConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BeaconConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.monitor.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor.probe_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(entry) = self
            .services
            .iter()
            .find(|s| s.url.trim().is_empty() || s.name.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "service entry '{}' needs both a name and a url",
                entry.name
            )));
        }
        Ok(())
    }

    /// Scaffold a config with one example service.
    pub fn scaffold(data_dir: &Path) -> Self {
        BeaconConfig {
            monitor: MonitorSettings::default(),
            storage: StorageSettings {
                data_dir: data_dir.to_path_buf(),
            },
            services: vec![ServiceEntry {
                name: "Main Portal".to_string(),
                url: "https://example.edu".to_string(),
                description: Some("Public website".to_string()),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = BeaconConfig::from_toml_str("").unwrap();
        assert_eq!(config.monitor.tick_interval(), Duration::from_secs(30));
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.monitor.tick_policy, TickPolicy::Overlap);
        assert!(config.services.is_empty());
        assert_eq!(
            config.storage.db_path(),
            PathBuf::from("/var/lib/beacon/beacon.redb")
        );
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[monitor]
tick_interval_ms = 15000
tick_policy = "skip-if-busy"

[storage]
data_dir = "/tmp/beacon"

[[services]]
name = "Library"
url = "https://lib.example.edu"

[[services]]
name = "ERP"
url = "https://erp.example.edu:8443"
description = "Student information system"
"#;
        let config = BeaconConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.monitor.tick_interval_ms, 15_000);
        assert_eq!(config.monitor.probe_timeout_ms, 10_000);
        assert_eq!(config.monitor.tick_policy, TickPolicy::SkipIfBusy);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/beacon"));
        assert_eq!(config.services.len(), 2);
        assert_eq!(
            config.services[1].description.as_deref(),
            Some("Student information system")
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = BeaconConfig::from_toml_str("[monitor]\ntick_interval_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_service_without_url_rejected() {
        let toml_str = r#"
[[services]]
name = "Broken"
url = ""
"#;
        assert!(matches!(
            BeaconConfig::from_toml_str(toml_str),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_scaffold_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = BeaconConfig::scaffold(dir.path());
        let path = dir.path().join("beacon.toml");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = BeaconConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = BeaconConfig::from_file(Path::new("/nonexistent/beacon.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/beacon.toml"));
    }
}
