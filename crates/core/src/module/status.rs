// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observed module status

use crate::request::RequestType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest status message kept on the resource
const MAX_STATE_MESSAGE_CHARS: usize = 256;

/// Overall state of the latest run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Running,
    Ready,
    Errored,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Running => "Running",
            State::Ready => "Ready",
            State::Errored => "Errored",
        };
        f.write_str(s)
    }
}

/// Captured terraform output tied to the commit it ran against
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

impl OutputStats {
    pub fn new(timestamp: DateTime<Utc>, commit_hash: &str, output: impl Into<String>) -> Self {
        Self {
            timestamp: Some(timestamp),
            commit_hash: commit_hash.to_string(),
            output: output.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none() && self.commit_hash.is_empty() && self.output.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<State>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_type: Option<RequestType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_finished_at: Option<DateTime<Utc>>,
    /// Commit of the latest default-branch run; compared against the repo head
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_commit_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_commit_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_applied_commit_hash: String,
    #[serde(default, skip_serializing_if = "OutputStats::is_empty")]
    pub last_drift_info: OutputStats,
    #[serde(default, skip_serializing_if = "OutputStats::is_empty")]
    pub last_apply_info: OutputStats,
}

impl ModuleStatus {
    /// Record a state transition with a normalised message
    pub fn set_state(&mut self, state: State, reason: &str, message: &str) {
        self.current_state = Some(state);
        self.state_reason = reason.to_string();
        self.state_message = normalise_state_message(message);
    }
}

/// Collapse a message onto one line and bound its length
pub fn normalise_state_message(msg: &str) -> String {
    let single: String = msg.split_whitespace().collect::<Vec<_>>().join(" ");
    if single.chars().count() <= MAX_STATE_MESSAGE_CHARS {
        return single;
    }
    let mut truncated: String = single.chars().take(MAX_STATE_MESSAGE_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
