//! Store configuration
//!
//! JSON file, e.g.
//!
//! ```json
//! { "data_dir": "/var/lib/aerokv", "sync_mode": "fsync" }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{BackendConfig, SyncMode};
use crate::fault::{points, FaultInjector};
use crate::observability::{log_event_with_fields, Event};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// Commit log file name inside `data_dir` (default "aerokv.db")
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// "fsync" (default) or "nosync"
    #[serde(default = "default_sync_mode")]
    pub sync_mode: String,

    /// Fault point armed at open. Test use only.
    #[serde(default)]
    pub fault_point: Option<String>,
}

fn default_db_file() -> String {
    "aerokv.db".to_string()
}
fn default_sync_mode() -> String {
    "fsync".to_string()
}

impl Config {
    /// Config with every optional field at its default.
    pub fn new(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            db_file: default_db_file(),
            sync_mode: default_sync_mode(),
            fault_point: None,
        }
    }

    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config = Self::from_json(&content)?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("data_dir", config.data_dir.as_str()),
                ("path", path.display().to_string().as_str()),
                ("sync_mode", config.sync_mode.as_str()),
            ],
        );

        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }

        if self.db_file.is_empty() {
            return Err(ConfigError::Invalid("db_file must not be empty".into()));
        }

        self.parsed_sync_mode()?;

        if let Some(point) = &self.fault_point {
            if !points::is_known(point) {
                return Err(ConfigError::Invalid(format!(
                    "Unknown fault_point: '{}'. Must be one of: {}",
                    point,
                    points::all().join(", ")
                )));
            }
        }

        Ok(())
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    /// Full path of the commit log
    pub fn db_path(&self) -> PathBuf {
        self.data_path().join(&self.db_file)
    }

    fn parsed_sync_mode(&self) -> ConfigResult<SyncMode> {
        match self.sync_mode.as_str() {
            "fsync" => Ok(SyncMode::Fsync),
            "nosync" => Ok(SyncMode::NoSync),
            other => Err(ConfigError::Invalid(format!(
                "Invalid sync_mode: '{}'. Must be 'fsync' or 'nosync'.",
                other
            ))),
        }
    }

    /// Backend settings, with `fault_point` armed if set.
    pub fn backend_config(&self) -> ConfigResult<BackendConfig> {
        let faults = FaultInjector::new();
        if let Some(point) = &self.fault_point {
            faults.arm(point);
        }
        Ok(BackendConfig {
            sync_mode: self.parsed_sync_mode()?,
            faults,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_json(r#"{"data_dir": "/tmp/kv"}"#).unwrap();
        assert_eq!(config, Config::new("/tmp/kv"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/kv/aerokv.db"));
        assert_eq!(config.backend_config().unwrap().sync_mode, SyncMode::Fsync);
    }

    #[test]
    fn test_missing_data_dir_rejected() {
        assert!(matches!(Config::from_json("{}"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for json in [
            r#"{"data_dir": ""}"#,
            r#"{"data_dir": "/d", "db_file": ""}"#,
            r#"{"data_dir": "/d", "sync_mode": "sometimes"}"#,
            r#"{"data_dir": "/d", "fault_point": "nowhere"}"#,
        ] {
            assert!(
                matches!(Config::from_json(json), Err(ConfigError::Invalid(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_fault_point_is_armed() {
        let config = Config::from_json(
            r#"{"data_dir": "/d", "sync_mode": "nosync", "fault_point": "backend_commit_before_fsync"}"#,
        )
        .unwrap();
        let backend = config.backend_config().unwrap();
        assert_eq!(backend.sync_mode, SyncMode::NoSync);
        assert!(backend.faults.should_fail(points::BACKEND_COMMIT_BEFORE_FSYNC));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/aerokv.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
