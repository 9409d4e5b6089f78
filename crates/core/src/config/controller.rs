// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller configuration
//!
//! Loaded once at startup from a TOML file. Every field has a default so an
//! empty file is a valid configuration.

use crate::retry::Backoff;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root for run directories, the plugin cache, git mirrors and run history
    pub data_root: PathBuf,
    /// Object store holding modules, secrets and config maps; defaults under `data_root`
    pub cluster_root: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub min_interval_between_runs: Duration,
    /// How long active runs may continue after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub termination_grace_period: Duration,
    /// Full re-evaluation of every module
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,
    pub queue_capacity: usize,
    pub plugin_cache: bool,
    pub terraform_path: PathBuf,
    pub strongbox_path: PathBuf,
    pub git_path: PathBuf,
    /// Log file; stderr when unset
    pub log_path: Option<PathBuf>,
    /// Env passed to every run; module env overrides it
    pub global_env: BTreeMap<String, String>,
    pub retry: Backoff,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: std::env::temp_dir().join("terraform-applier"),
            cluster_root: None,
            min_interval_between_runs: Duration::from_secs(60),
            termination_grace_period: Duration::from_secs(60),
            resync_interval: Duration::from_secs(300),
            queue_capacity: 64,
            plugin_cache: true,
            terraform_path: PathBuf::from("terraform"),
            strongbox_path: PathBuf::from("strongbox"),
            git_path: PathBuf::from("git"),
            log_path: None,
            global_env: BTreeMap::new(),
            retry: Backoff::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.data_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_root must be set".to_string()));
        }
        Ok(())
    }

    pub fn cluster_root(&self) -> PathBuf {
        self.cluster_root
            .clone()
            .unwrap_or_else(|| self.data_root.join("cluster"))
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_root.join("runs")
    }

    pub fn plugin_cache_dir(&self) -> PathBuf {
        self.data_root.join("plugin-cache")
    }

    pub fn mirrors_dir(&self) -> PathBuf {
        self.data_root.join("mirrors")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.data_root.join("history")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_root.join("tfad.pid")
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
