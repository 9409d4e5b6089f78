// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Historical record of one execution attempt

use crate::module::{ModuleKey, State};
use crate::request::Request;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of a completed run, persisted to run history once
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub module: ModuleKey,
    pub request: Request,
    pub state: State,
    #[serde(default)]
    pub reason: String,
    pub plan_only: bool,
    pub repo_ref: String,
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde", default)]
    pub duration: Duration,
    #[serde(default)]
    pub commit_hash: String,
    #[serde(default)]
    pub commit_msg: String,
    #[serde(default)]
    pub diff_detected: bool,
    #[serde(default)]
    pub applied: bool,
    /// Parsed plan or apply summary line
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub init_output: String,
    /// Plan output, followed by apply output when applied
    #[serde(default)]
    pub output: String,
}

impl Run {
    pub fn new(
        module: ModuleKey,
        request: Request,
        started_at: DateTime<Utc>,
        plan_only: bool,
        repo_ref: impl Into<String>,
    ) -> Self {
        Self {
            module,
            request,
            state: State::Running,
            reason: String::new(),
            plan_only,
            repo_ref: repo_ref.into(),
            started_at,
            duration: Duration::ZERO,
            commit_hash: String::new(),
            commit_msg: String::new(),
            diff_detected: false,
            applied: false,
            summary: String::new(),
            init_output: String::new(),
            output: String::new(),
        }
    }

    /// Seal the record with its final state
    pub fn finish(mut self, state: State, reason: &str, finished_at: DateTime<Utc>) -> Self {
        self.state = state;
        self.reason = reason.to_string();
        self.duration = (finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        let elapsed =
            chrono::Duration::from_std(self.duration).unwrap_or_else(|_| chrono::Duration::zero());
        self.started_at + elapsed
    }

    pub fn append_output(&mut self, output: &str) {
        if output.is_empty() {
            return;
        }
        if !self.output.is_empty() && !self.output.ends_with('\n') {
            self.output.push('\n');
        }
        self.output.push_str(output);
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
