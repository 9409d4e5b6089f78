// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory cluster for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ClusterApi, ClusterError, ConfigMap, ObjectReader, Secret};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tfa_core::{Module, ModuleKey, ModuleStatus};

/// Recorded cluster call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    GetModule(ModuleKey),
    ListModules,
    UpdateModule(ModuleKey),
    PatchStatus(ModuleKey),
    GetSecret { namespace: String, name: String },
    GetConfigMap { namespace: String, name: String },
}

#[derive(Default)]
struct FakeClusterState {
    modules: BTreeMap<ModuleKey, Module>,
    secrets: BTreeMap<(String, String), Secret>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    calls: Vec<ClusterCall>,
    /// Writes that will fail with a conflict before succeeding
    pending_conflicts: u32,
    status_error: Option<ClusterError>,
    status_history: BTreeMap<ModuleKey, Vec<ModuleStatus>>,
}

/// Fake cluster API for testing
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeClusterState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeClusterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a module as-is, defaulting its version and creation time
    pub fn insert_module(&self, mut module: Module) {
        if module.metadata.resource_version == 0 {
            module.metadata.resource_version = 1;
        }
        if module.metadata.creation_timestamp.is_none() {
            module.metadata.creation_timestamp = Some(chrono::Utc::now());
        }
        self.lock().modules.insert(module.key(), module);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let id = (
            secret.metadata.namespace.clone(),
            secret.metadata.name.clone(),
        );
        self.lock().secrets.insert(id, secret);
    }

    pub fn insert_config_map(&self, config_map: ConfigMap) {
        let id = (
            config_map.metadata.namespace.clone(),
            config_map.metadata.name.clone(),
        );
        self.lock().config_maps.insert(id, config_map);
    }

    pub fn module(&self, key: &ModuleKey) -> Option<Module> {
        self.lock().modules.get(key).cloned()
    }

    pub fn remove_module(&self, key: &ModuleKey) -> Option<Module> {
        self.lock().modules.remove(key)
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.lock().calls.clone()
    }

    /// Fail the next `n` writes with a conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.lock().pending_conflicts = n;
    }

    /// Fail every status patch with `err` until cleared with `None`
    pub fn fail_status_patches(&self, err: Option<ClusterError>) {
        self.lock().status_error = err;
    }

    /// Every status successfully written for a module, oldest first
    pub fn status_history(&self, key: &ModuleKey) -> Vec<ModuleStatus> {
        self.lock()
            .status_history
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn check_write(state: &mut FakeClusterState, module: &Module) -> Result<Module, ClusterError> {
        let key = module.key();
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(ClusterError::Conflict(key.to_string()));
        }
        let current = state
            .modules
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "module",
                name: key.to_string(),
            })?;
        if current.metadata.resource_version != module.metadata.resource_version {
            return Err(ClusterError::Conflict(key.to_string()));
        }
        Ok(current)
    }
}

#[async_trait]
impl ObjectReader for FakeCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::GetSecret {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "secret",
                name: format!("{}/{}", namespace, name),
            })
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::GetConfigMap {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "configmap",
                name: format!("{}/{}", namespace, name),
            })
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_module(&self, key: &ModuleKey) -> Result<Module, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::GetModule(key.clone()));
        state
            .modules
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "module",
                name: key.to_string(),
            })
    }

    async fn list_modules(&self) -> Result<Vec<Module>, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::ListModules);
        Ok(state.modules.values().cloned().collect())
    }

    async fn update_module(&self, module: &Module) -> Result<Module, ClusterError> {
        let mut state = self.lock();
        let key = module.key();
        state.calls.push(ClusterCall::UpdateModule(key.clone()));
        let current = Self::check_write(&mut state, module)?;

        let mut next = module.clone();
        next.status = current.status;
        next.metadata.resource_version += 1;
        state.modules.insert(key, next.clone());
        Ok(next)
    }

    async fn patch_status(&self, module: &Module) -> Result<Module, ClusterError> {
        let mut state = self.lock();
        let key = module.key();
        state.calls.push(ClusterCall::PatchStatus(key.clone()));
        if let Some(err) = state.status_error.clone() {
            return Err(err);
        }
        let mut next = Self::check_write(&mut state, module)?;

        next.status = module.status.clone();
        next.metadata.resource_version += 1;
        state
            .status_history
            .entry(key.clone())
            .or_default()
            .push(next.status.clone());
        state.modules.insert(key, next.clone());
        Ok(next)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
