// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declared terraform module resources
//!
//! A [`Module`] is the unit of reconciliation: a repository path holding a
//! terraform root module plus the policy (schedule, poll interval, plan-only)
//! that decides when it runs. Status is written back by the reconciler and
//! the runner only.

pub mod reason;
mod status;

pub use status::{normalise_state_message, ModuleStatus, OutputStats, State};

use crate::request::Request;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Annotation holding the single pending run request of a module
pub const RUN_REQUEST_ANNOTATION: &str = "terraform-applier.uw.systems/run-request";

pub const DEFAULT_REPO_REF: &str = "HEAD";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_DELEGATE_SECRET: &str = "terraform-applier-delegate-token";

/// Namespaced identity of a module
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    pub namespace: String,
    pub name: String,
}

impl ModuleKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse the `namespace/name` form
    pub fn parse(s: &str) -> Option<Self> {
        let (namespace, name) = s.split_once('/')?;
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Object metadata shared by every stored resource
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub generation: i64,
    /// Bumped on every write; writes presenting a stale version are rejected
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Reference to a key inside a config map or secret of the module namespace
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    pub name: String,
    pub key: String,
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.key)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<KeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<KeyRef>,
}

/// A backend, env or var declaration: a literal or a reference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    pub fn from_secret(name: impl Into<String>, secret: &str, key: &str) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(EnvVarSource {
                config_map_key_ref: None,
                secret_key_ref: Some(KeyRef {
                    name: secret.to_string(),
                    key: key.to_string(),
                }),
            }),
        }
    }

    pub fn from_config_map(name: impl Into<String>, config_map: &str, key: &str) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(KeyRef {
                    name: config_map.to_string(),
                    key: key.to_string(),
                }),
                secret_key_ref: None,
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwsCredentialType {
    IamUser,
    #[default]
    AssumedRole,
    FederationToken,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentialRequest {
    pub vault_role: String,
    #[serde(default)]
    pub credential_type: AwsCredentialType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpCredentialRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roleset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_account: Option<String>,
}

/// Cloud credentials to mint for the run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRequests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsCredentialRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp: Option<GcpCredentialRequest>,
}

impl CredentialRequests {
    pub fn is_empty(&self) -> bool {
        self.aws.is_none() && self.gcp.is_none()
    }
}

fn default_repo_ref() -> String {
    DEFAULT_REPO_REF.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_run_timeout() -> u64 {
    DEFAULT_RUN_TIMEOUT_SECS
}

fn default_delegate_secret() -> String {
    DEFAULT_DELEGATE_SECRET.to_string()
}

fn default_true() -> bool {
    true
}

/// Desired state of a module
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    #[serde(default = "default_repo_ref")]
    pub repo_ref: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default)]
    pub suspend: bool,
    #[serde(default)]
    pub plan_only: bool,
    #[serde(default = "default_true", rename = "planOnPR")]
    pub plan_on_pr: bool,
    /// Seconds between git polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Seconds allowed for a complete init/plan/apply
    #[serde(default = "default_run_timeout")]
    pub run_timeout: u64,
    #[serde(default = "default_delegate_secret")]
    pub delegate_service_account_secret_ref: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub var: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_requests: Option<CredentialRequests>,
}

impl Default for ModuleSpec {
    fn default() -> Self {
        Self {
            repo_url: String::new(),
            repo_ref: default_repo_ref(),
            path: String::new(),
            schedule: None,
            suspend: false,
            plan_only: false,
            plan_on_pr: true,
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
            run_timeout: DEFAULT_RUN_TIMEOUT_SECS,
            delegate_service_account_secret_ref: default_delegate_secret(),
            backend: Vec::new(),
            env: Vec::new(),
            var: Vec::new(),
            credential_requests: None,
        }
    }
}

/// A declared terraform module with its observed status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub metadata: ObjectMeta,
    pub spec: ModuleSpec,
    #[serde(default)]
    pub status: ModuleStatus,
}

impl Module {
    pub fn new(metadata: ObjectMeta, spec: ModuleSpec) -> Self {
        Self {
            metadata,
            spec,
            status: ModuleStatus::default(),
        }
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.status.current_state == Some(State::Running)
    }

    /// Cron schedule, treating an empty expression as unset
    pub fn schedule(&self) -> Option<&str> {
        self.spec
            .schedule
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn repo_ref(&self) -> &str {
        if self.spec.repo_ref.is_empty() {
            DEFAULT_REPO_REF
        } else {
            &self.spec.repo_ref
        }
    }

    pub fn poll_interval(&self) -> Duration {
        let secs = if self.spec.poll_interval == 0 {
            DEFAULT_POLL_INTERVAL_SECS
        } else {
            self.spec.poll_interval
        };
        Duration::from_secs(secs)
    }

    pub fn run_timeout(&self) -> Duration {
        let secs = if self.spec.run_timeout == 0 {
            DEFAULT_RUN_TIMEOUT_SECS
        } else {
            self.spec.run_timeout
        };
        Duration::from_secs(secs)
    }

    pub fn delegate_secret_name(&self) -> &str {
        if self.spec.delegate_service_account_secret_ref.is_empty() {
            DEFAULT_DELEGATE_SECRET
        } else {
            &self.spec.delegate_service_account_secret_ref
        }
    }

    /// The pending run request, if one is stored and decodes
    pub fn pending_request(&self) -> Option<Request> {
        let raw = self.metadata.annotations.get(RUN_REQUEST_ANNOTATION)?;
        match serde_json::from_str::<Request>(raw) {
            Ok(req) => Some(req),
            Err(e) => {
                tracing::warn!(module = %self.key(), error = %e, "ignoring undecodable run request");
                None
            }
        }
    }

    pub fn has_request_annotation(&self) -> bool {
        self.metadata
            .annotations
            .contains_key(RUN_REQUEST_ANNOTATION)
    }
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
