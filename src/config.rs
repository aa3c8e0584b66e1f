//! Store configuration, loaded from TOML

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub retry: RetryPolicy,
    pub backend: BackendConfig,
}

/// Which persistence backend to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Volatile in-process storage
    Memory,
    /// Append-only log file
    File {
        path: PathBuf,
        #[serde(default = "default_sync_on_commit")]
        sync_on_commit: bool,
    },
}

fn default_sync_on_commit() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory
    }
}

impl StoreConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Use a file backend in `dir`, replacing whatever backend was configured
    pub fn with_data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let sync_on_commit = match &self.backend {
            BackendConfig::File { sync_on_commit, .. } => *sync_on_commit,
            BackendConfig::Memory => default_sync_on_commit(),
        };
        self.backend = BackendConfig::File {
            path: dir.as_ref().join("records.wal"),
            sync_on_commit,
        };
        self
    }
}
