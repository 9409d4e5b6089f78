// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run history
//!
//! Each module keeps its last default-branch run, its last applied run and
//! one record per planned pull-request commit. PR records expire after
//! [`PR_RUN_TTL`].

mod json;

pub use json::JsonRunStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryRunStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tfa_core::{ModuleKey, Run};
use thiserror::Error;

pub const PR_RUN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("run history io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt run record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("run of {0} has no pull request context")]
    NotPullRequest(ModuleKey),
    #[error("run history unavailable: {0}")]
    Unavailable(String),
}

/// A run as persisted, stamped with its save time for expiry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRun {
    pub saved_at: DateTime<Utc>,
    pub run: Run,
}

impl StoredRun {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(PR_RUN_TTL) {
            Ok(ttl) => self.saved_at + ttl <= now,
            Err(_) => false,
        }
    }
}

#[async_trait]
pub trait RunStore: Clone + Send + Sync + 'static {
    /// Last run on the module's own ref, whatever its outcome
    async fn default_last_run(&self, key: &ModuleKey) -> Result<Option<Run>, HistoryError>;

    /// Last run that applied changes
    async fn default_apply(&self, key: &ModuleKey) -> Result<Option<Run>, HistoryError>;

    /// Plan of a pull request at a given commit
    async fn pr_run(
        &self,
        key: &ModuleKey,
        pr_number: u64,
        commit_hash: &str,
    ) -> Result<Option<Run>, HistoryError>;

    /// Every live record of a module, newest first
    async fn runs(&self, key: &ModuleKey) -> Result<Vec<Run>, HistoryError>;

    async fn set_default_last_run(&self, run: &Run) -> Result<(), HistoryError>;

    async fn set_default_apply(&self, run: &Run) -> Result<(), HistoryError>;

    async fn set_pr_run(&self, run: &Run) -> Result<(), HistoryError>;
}

fn sort_newest_first(runs: &mut [Run]) {
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
}
