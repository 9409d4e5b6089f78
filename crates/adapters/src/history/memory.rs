// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory run history for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{sort_newest_first, HistoryError, RunStore, StoredRun};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tfa_core::{Clock, ModuleKey, Run, SystemClock};

#[derive(Default)]
struct MemoryState {
    last_run: BTreeMap<ModuleKey, Run>,
    last_apply: BTreeMap<ModuleKey, Run>,
    pr_runs: BTreeMap<(ModuleKey, u64, String), StoredRun>,
    unavailable: bool,
}

#[derive(Clone, Default)]
pub struct MemoryRunStore<C = SystemClock> {
    clock: C,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRunStore<SystemClock> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Clock> MemoryRunStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: Arc::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every operation fail with [`HistoryError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn check(&self, state: &MemoryState) -> Result<(), HistoryError> {
        if state.unavailable {
            return Err(HistoryError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: Clock> RunStore for MemoryRunStore<C> {
    async fn default_last_run(&self, key: &ModuleKey) -> Result<Option<Run>, HistoryError> {
        let state = self.lock();
        self.check(&state)?;
        Ok(state.last_run.get(key).cloned())
    }

    async fn default_apply(&self, key: &ModuleKey) -> Result<Option<Run>, HistoryError> {
        let state = self.lock();
        self.check(&state)?;
        Ok(state.last_apply.get(key).cloned())
    }

    async fn pr_run(
        &self,
        key: &ModuleKey,
        pr_number: u64,
        commit_hash: &str,
    ) -> Result<Option<Run>, HistoryError> {
        let now = self.clock.now();
        let mut state = self.lock();
        self.check(&state)?;
        let id = (key.clone(), pr_number, commit_hash.to_string());
        let expired = state
            .pr_runs
            .get(&id)
            .is_some_and(|stored| stored.is_expired(now));
        if expired {
            state.pr_runs.remove(&id);
            return Ok(None);
        }
        Ok(state.pr_runs.get(&id).map(|stored| stored.run.clone()))
    }

    async fn runs(&self, key: &ModuleKey) -> Result<Vec<Run>, HistoryError> {
        let now = self.clock.now();
        let mut state = self.lock();
        self.check(&state)?;
        state.pr_runs.retain(|_, stored| !stored.is_expired(now));

        let mut runs: Vec<Run> = state
            .last_run
            .get(key)
            .into_iter()
            .chain(state.last_apply.get(key))
            .cloned()
            .collect();
        runs.extend(
            state
                .pr_runs
                .iter()
                .filter(|((k, _, _), _)| k == key)
                .map(|(_, stored)| stored.run.clone()),
        );
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    async fn set_default_last_run(&self, run: &Run) -> Result<(), HistoryError> {
        let mut state = self.lock();
        self.check(&state)?;
        state.last_run.insert(run.module.clone(), run.clone());
        Ok(())
    }

    async fn set_default_apply(&self, run: &Run) -> Result<(), HistoryError> {
        let mut state = self.lock();
        self.check(&state)?;
        state.last_apply.insert(run.module.clone(), run.clone());
        Ok(())
    }

    async fn set_pr_run(&self, run: &Run) -> Result<(), HistoryError> {
        let saved_at = self.clock.now();
        let mut state = self.lock();
        self.check(&state)?;
        let pr = run
            .request
            .pr
            .as_ref()
            .ok_or_else(|| HistoryError::NotPullRequest(run.module.clone()))?;
        state.pr_runs.insert(
            (run.module.clone(), pr.number, run.commit_hash.clone()),
            StoredRun {
                saved_at,
                run: run.clone(),
            },
        );
        Ok(())
    }
}
