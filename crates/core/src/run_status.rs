// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Set of modules currently executing
//!
//! Owned by the engine and shared with the reconciler. Holding a key is the
//! only way a run may proceed, so two runs of one module never overlap.

use crate::module::ModuleKey;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, Default)]
pub struct RunStatus {
    running: Arc<RwLock<HashSet<ModuleKey>>>,
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the key; `None` if a run already holds it
    pub fn try_acquire(&self, key: &ModuleKey) -> Option<RunGuard> {
        let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
        if !running.insert(key.clone()) {
            return None;
        }
        Some(RunGuard {
            status: self.clone(),
            key: key.clone(),
        })
    }

    /// Returns whether the key was held
    pub fn release(&self, key: &ModuleKey) -> bool {
        self.running
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }

    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.running
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.running.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its key when dropped
#[derive(Debug)]
pub struct RunGuard {
    status: RunStatus,
    key: ModuleKey,
}

impl RunGuard {
    pub fn key(&self) -> &ModuleKey {
        &self.key
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.status.release(&self.key);
    }
}

#[cfg(test)]
#[path = "run_status_tests.rs"]
mod tests;
