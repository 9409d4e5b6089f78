// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Working directory preparation for a run

use crate::error::PrepareError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tfa_core::ModuleKey;

/// Variables file terraform loads automatically
pub const TFVARS_FILE: &str = "terraform-applier-generated.auto.tfvars.json";

/// A private checkout root, removed when dropped.
///
/// The root is created with mode 0700 under the runs directory and named
/// `<namespace>-<name>-<random>`; terraform runs in `root/<module path>`.
#[derive(Debug)]
pub struct WorkDir {
    root: TempDir,
    working_dir: PathBuf,
}

impl WorkDir {
    pub fn create(runs_dir: &Path, key: &ModuleKey) -> Result<Self, PrepareError> {
        fs::create_dir_all(runs_dir).map_err(PrepareError::io(runs_dir))?;
        let root = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", key.namespace, key.name))
            .tempdir_in(runs_dir)
            .map_err(PrepareError::io(runs_dir))?;
        let working_dir = root.path().to_path_buf();
        Ok(Self { root, working_dir })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Point the working dir at the module path inside the checkout
    pub fn enter(&mut self, module_path: &str) -> Result<(), PrepareError> {
        let relative = Path::new(module_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(PrepareError::MissingPath(module_path.to_string()));
        }
        let dir = self.root.path().join(relative);
        if !dir.is_dir() {
            return Err(PrepareError::MissingPath(module_path.to_string()));
        }
        self.working_dir = dir;
        Ok(())
    }

    /// Write resolved vars where terraform auto-loads them
    pub fn write_vars(&self, vars: &BTreeMap<String, String>) -> Result<PathBuf, PrepareError> {
        let path = self.working_dir.join(TFVARS_FILE);
        let json = serde_json::to_vec(vars)?;
        fs::write(&path, json).map_err(PrepareError::io(&path))?;
        Ok(path)
    }

    /// Environment terraform runs with; `HOME` is scoped to the working dir
    /// so git credential helpers never read host configuration
    pub fn run_env(
        &self,
        env: &BTreeMap<String, String>,
        plugin_cache: Option<&Path>,
    ) -> Vec<(String, String)> {
        let dir = self.working_dir.display().to_string();
        let mut run_env = env.clone();
        run_env.insert("HOME".to_string(), dir.clone());
        run_env.insert("STRONGBOX_HOME".to_string(), dir);
        run_env.insert("TF_IN_AUTOMATION".to_string(), "1".to_string());
        if let Some(cache) = plugin_cache {
            run_env.insert(
                "TF_PLUGIN_CACHE_DIR".to_string(),
                cache.display().to_string(),
            );
        }
        run_env.into_iter().collect()
    }

    /// Remove the checkout now, reporting failures
    pub fn close(self) -> Result<(), PrepareError> {
        let path = self.root.path().to_path_buf();
        self.root.close().map_err(PrepareError::io(path))
    }
}

#[cfg(test)]
#[path = "workdir_tests.rs"]
mod tests;
