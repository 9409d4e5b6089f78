// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster resource API
//!
//! Modules, secrets and config maps live in a namespaced object store. Every
//! write is optimistic: it carries the `resource_version` it was read at and
//! fails with [`ClusterError::Conflict`] if the object moved on since.

mod json;

pub use json::JsonCluster;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ClusterCall, FakeCluster};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tfa_core::{Module, ModuleKey, ObjectMeta};
use thiserror::Error;

/// Secret type required for delegate identities
pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn new(namespace: &str, name: &str, kind: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            kind: kind.to_string(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }
}

/// Errors from the cluster API
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("conflict writing {0}: the object has been modified")]
    Conflict(String),
    #[error("access to {0} is forbidden")]
    Forbidden(String),
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("too many requests: {0}")]
    Throttled(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ClusterError {
    /// Transient failures worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::Conflict(_)
                | ClusterError::Unavailable(_)
                | ClusterError::Timeout(_)
                | ClusterError::Throttled(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Read access to the objects a run may reference
#[async_trait]
pub trait ObjectReader: Send + Sync + 'static {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError>;
}

/// Controller access to module resources
#[async_trait]
pub trait ClusterApi: ObjectReader + Clone {
    async fn get_module(&self, key: &ModuleKey) -> Result<Module, ClusterError>;

    async fn list_modules(&self) -> Result<Vec<Module>, ClusterError>;

    /// Write metadata and spec; status is left as stored
    async fn update_module(&self, module: &Module) -> Result<Module, ClusterError>;

    /// Write the status sub-resource only
    async fn patch_status(&self, module: &Module) -> Result<Module, ClusterError>;
}
