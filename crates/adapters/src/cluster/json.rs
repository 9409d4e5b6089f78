// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed object store
//!
//! Layout: `<root>/<kind>/<namespace>/<name>.json`. Writes go through a
//! process-wide lock and an atomic rename, so readers never see a partial
//! object and version checks are race free within one controller.

use super::{ClusterApi, ClusterError, ConfigMap, ObjectReader, Secret};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfa_core::{Module, ModuleKey};
use tokio::sync::Mutex;

const MODULES: &str = "modules";
const SECRETS: &str = "secrets";
const CONFIG_MAPS: &str = "configmaps";

#[derive(Clone)]
pub struct JsonCluster {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonCluster {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ClusterError> {
        let root = root.into();
        for kind in [MODULES, SECRETS, CONFIG_MAPS] {
            std::fs::create_dir_all(root.join(kind)).map_err(|e| storage(&root, e))?;
        }
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, kind: &str, namespace: &str, name: &str) -> PathBuf {
        self.root
            .join(kind)
            .join(namespace)
            .join(format!("{}.json", name))
    }

    async fn read<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        namespace: &str,
        name: &str,
    ) -> Result<T, ClusterError> {
        let path = self.path_for(kind, namespace, name);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClusterError::NotFound {
                    kind,
                    name: format!("{}/{}", namespace, name),
                })
            }
            Err(e) => return Err(storage(&path, e)),
        };
        serde_json::from_str(&json)
            .map_err(|e| ClusterError::Storage(format!("{}: {}", path.display(), e)))
    }

    async fn write<T: Serialize>(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        value: &T,
    ) -> Result<(), ClusterError> {
        let path = self.path_for(kind, namespace, name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage(parent, e))?;
        }
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| ClusterError::Storage(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage(&path, e))
    }

    /// Create or replace a module as its owner would, bumping the generation on spec change
    pub async fn put_module(&self, module: &Module) -> Result<Module, ClusterError> {
        let _lock = self.write_lock.lock().await;
        let key = module.key();
        let mut next = module.clone();
        match self
            .read::<Module>(MODULES, &key.namespace, &key.name)
            .await
        {
            Ok(current) => {
                next.metadata.resource_version = current.metadata.resource_version + 1;
                next.metadata.creation_timestamp = current.metadata.creation_timestamp;
                next.metadata.generation = if current.spec == next.spec {
                    current.metadata.generation
                } else {
                    current.metadata.generation + 1
                };
                next.status = current.status;
            }
            Err(e) if e.is_not_found() => {
                next.metadata.resource_version = 1;
                next.metadata.generation = 1;
                if next.metadata.creation_timestamp.is_none() {
                    next.metadata.creation_timestamp = Some(chrono::Utc::now());
                }
            }
            Err(e) => return Err(e),
        }
        self.write(MODULES, &key.namespace, &key.name, &next)
            .await?;
        Ok(next)
    }

    pub async fn put_secret(&self, secret: &Secret) -> Result<(), ClusterError> {
        let _lock = self.write_lock.lock().await;
        let meta = &secret.metadata;
        self.write(SECRETS, &meta.namespace, &meta.name, secret)
            .await
    }

    pub async fn put_config_map(&self, config_map: &ConfigMap) -> Result<(), ClusterError> {
        let _lock = self.write_lock.lock().await;
        let meta = &config_map.metadata;
        self.write(CONFIG_MAPS, &meta.namespace, &meta.name, config_map)
            .await
    }

    /// Read-compare-write under the write lock
    async fn replace_module<F>(&self, module: &Module, merge: F) -> Result<Module, ClusterError>
    where
        F: FnOnce(Module, &Module) -> Module + Send,
    {
        let _lock = self.write_lock.lock().await;
        let key = module.key();
        let current: Module = self.read(MODULES, &key.namespace, &key.name).await?;
        if current.metadata.resource_version != module.metadata.resource_version {
            return Err(ClusterError::Conflict(key.to_string()));
        }
        let mut next = merge(current, module);
        next.metadata.resource_version += 1;
        self.write(MODULES, &key.namespace, &key.name, &next)
            .await?;
        Ok(next)
    }
}

fn storage(path: &Path, e: std::io::Error) -> ClusterError {
    ClusterError::Storage(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl ObjectReader for JsonCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError> {
        self.read(SECRETS, namespace, name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError> {
        self.read(CONFIG_MAPS, namespace, name).await
    }
}

#[async_trait]
impl ClusterApi for JsonCluster {
    async fn get_module(&self, key: &ModuleKey) -> Result<Module, ClusterError> {
        self.read(MODULES, &key.namespace, &key.name).await
    }

    async fn list_modules(&self) -> Result<Vec<Module>, ClusterError> {
        let base = self.root.join(MODULES);
        let mut modules = Vec::new();
        let mut namespaces = tokio::fs::read_dir(&base)
            .await
            .map_err(|e| storage(&base, e))?;
        while let Some(ns) = namespaces
            .next_entry()
            .await
            .map_err(|e| storage(&base, e))?
        {
            if !ns.path().is_dir() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(ns.path())
                .await
                .map_err(|e| storage(&ns.path(), e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| storage(&ns.path(), e))?
            {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let json = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| storage(&path, e))?;
                match serde_json::from_str::<Module>(&json) {
                    Ok(module) => modules.push(module),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable module")
                    }
                }
            }
        }
        modules.sort_by_key(|m| m.key());
        Ok(modules)
    }

    async fn update_module(&self, module: &Module) -> Result<Module, ClusterError> {
        self.replace_module(module, |current, update| {
            let mut next = update.clone();
            next.status = current.status;
            next.metadata.creation_timestamp = current.metadata.creation_timestamp;
            next.metadata.generation = if current.spec == update.spec {
                current.metadata.generation
            } else {
                current.metadata.generation + 1
            };
            next
        })
        .await
    }

    async fn patch_status(&self, module: &Module) -> Result<Module, ClusterError> {
        self.replace_module(module, |mut current, update| {
            current.status = update.status.clone();
            current
        })
        .await
    }
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
