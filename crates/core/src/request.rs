// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run requests: the single pending trigger attached to a module

use crate::module::Module;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// What caused a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    /// Cron schedule fired
    ScheduledRun,
    /// New commit on the module path
    PollingRun,
    ForcedPlan,
    ForcedApply,
    /// Plan of a pull request head branch
    PullRequestPlan,
    /// Anything this version does not understand
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestType::ScheduledRun => "ScheduledRun",
            RequestType::PollingRun => "PollingRun",
            RequestType::ForcedPlan => "ForcedPlan",
            RequestType::ForcedApply => "ForcedApply",
            RequestType::PullRequestPlan => "PullRequestPlan",
            RequestType::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Pull request context of a `PullRequestPlan`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    #[serde(rename = "num")]
    pub number: u64,
    pub head_branch: String,
    #[serde(default, rename = "commentID", skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("valid timestamp is required for 'requestedAt'")]
    MissingRequestedAt,
    #[error("unknown request type provided")]
    UnknownType,
    #[error("pull request context is required for {0}")]
    MissingPullRequest(RequestType),
}

/// A trigger descriptor stored on the module until its run starts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(default, rename = "reqAt", skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PullRequest>,
}

impl Request {
    pub fn new(id: impl Into<String>, kind: RequestType, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            requested_at: Some(requested_at),
            kind,
            pr: None,
        }
    }

    pub fn with_pr(mut self, pr: PullRequest) -> Self {
        self.pr = Some(pr);
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.requested_at.is_none() {
            return Err(RequestError::MissingRequestedAt);
        }
        match self.kind {
            RequestType::Unknown => Err(RequestError::UnknownType),
            RequestType::PullRequestPlan if self.pr.is_none() => {
                Err(RequestError::MissingPullRequest(self.kind))
            }
            _ => Ok(()),
        }
    }

    pub fn is_pr(&self) -> bool {
        self.kind == RequestType::PullRequestPlan
    }

    /// Scheduled and polling runs follow the module; overrides decide for themselves
    pub fn is_plan_only(&self, module: &Module) -> bool {
        match self.kind {
            RequestType::ScheduledRun | RequestType::PollingRun => module.spec.plan_only,
            RequestType::ForcedApply => false,
            RequestType::ForcedPlan | RequestType::PullRequestPlan | RequestType::Unknown => true,
        }
    }

    /// Revision to check out for this run
    pub fn repo_ref<'a>(&'a self, module: &'a Module) -> &'a str {
        match (&self.kind, &self.pr) {
            (RequestType::PullRequestPlan, Some(pr)) => &pr.head_branch,
            _ => module.repo_ref(),
        }
    }

    /// JSON form stored in the module annotation
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Mints the request the reconciler writes onto a module when it triggers a run
pub trait RequestIssuer: Clone + Send + Sync + 'static {
    fn issue(&self, kind: RequestType, at: DateTime<Utc>) -> Request;
}

/// Random 32-hex-digit request ids
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomRequests;

impl RequestIssuer for RandomRequests {
    fn issue(&self, kind: RequestType, at: DateTime<Utc>) -> Request {
        Request::new(uuid::Uuid::new_v4().simple().to_string(), kind, at)
    }
}

/// Request ids `<prefix>-1`, `<prefix>-2`, ... shared across clones
#[derive(Clone, Debug)]
pub struct NumberedRequests {
    prefix: String,
    issued: Arc<AtomicU64>,
}

impl NumberedRequests {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl RequestIssuer for NumberedRequests {
    fn issue(&self, kind: RequestType, at: DateTime<Utc>) -> Request {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Request::new(format!("{}-{}", self.prefix, n), kind, at)
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
