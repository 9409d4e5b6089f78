// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake repositories for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{RepoError, Repositories};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Recorded repository call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    Hash {
        remote: String,
        reference: String,
        path: String,
    },
    LogMessage {
        remote: String,
        reference: String,
    },
    Clone {
        remote: String,
        dest: PathBuf,
        reference: String,
    },
    ChangedFiles {
        remote: String,
        reference: String,
    },
}

#[derive(Default)]
struct FakeRepoState {
    /// (remote, ref) -> (commit, subject)
    heads: BTreeMap<(String, String), (String, String)>,
    /// remote -> relative path -> contents
    files: BTreeMap<String, BTreeMap<String, String>>,
    changed: BTreeMap<(String, String), Vec<String>>,
    error: Option<RepoError>,
    calls: Vec<RepoCall>,
}

/// Fake repositories for testing
#[derive(Clone, Default)]
pub struct FakeRepositories {
    state: Arc<Mutex<FakeRepoState>>,
}

impl FakeRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeRepoState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Point `reference` of `remote` at a commit
    pub fn set_head(&self, remote: &str, reference: &str, commit: &str, subject: &str) {
        self.lock().heads.insert(
            (remote.to_string(), reference.to_string()),
            (commit.to_string(), subject.to_string()),
        );
    }

    /// File materialised by every clone of `remote`
    pub fn add_file(&self, remote: &str, path: &str, contents: &str) {
        self.lock()
            .files
            .entry(remote.to_string())
            .or_default()
            .insert(path.to_string(), contents.to_string());
    }

    pub fn set_changed_files(&self, remote: &str, reference: &str, files: &[&str]) {
        self.lock().changed.insert(
            (remote.to_string(), reference.to_string()),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }

    /// Fail every call with `err` until cleared with `None`
    pub fn fail_with(&self, err: Option<RepoError>) {
        self.lock().error = err;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<RepoCall> {
        self.lock().calls.clone()
    }

    fn head(
        state: &FakeRepoState,
        remote: &str,
        reference: &str,
    ) -> Result<(String, String), RepoError> {
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        state
            .heads
            .get(&(remote.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| RepoError::UnknownRef {
                remote: remote.to_string(),
                reference: reference.to_string(),
            })
    }
}

#[async_trait]
impl Repositories for FakeRepositories {
    async fn hash(&self, remote: &str, reference: &str, path: &str) -> Result<String, RepoError> {
        let mut state = self.lock();
        state.calls.push(RepoCall::Hash {
            remote: remote.to_string(),
            reference: reference.to_string(),
            path: path.to_string(),
        });
        Self::head(&state, remote, reference).map(|(commit, _)| commit)
    }

    async fn log_message(
        &self,
        remote: &str,
        reference: &str,
        _path: &str,
    ) -> Result<String, RepoError> {
        let mut state = self.lock();
        state.calls.push(RepoCall::LogMessage {
            remote: remote.to_string(),
            reference: reference.to_string(),
        });
        Self::head(&state, remote, reference).map(|(_, subject)| subject)
    }

    async fn clone_into(
        &self,
        remote: &str,
        dest: &Path,
        reference: &str,
        _pathspecs: &[String],
        _remove_git_dir: bool,
    ) -> Result<String, RepoError> {
        let (commit, files) = {
            let mut state = self.lock();
            state.calls.push(RepoCall::Clone {
                remote: remote.to_string(),
                dest: dest.to_path_buf(),
                reference: reference.to_string(),
            });
            let (commit, _) = Self::head(&state, remote, reference)?;
            (commit, state.files.get(remote).cloned().unwrap_or_default())
        };

        std::fs::create_dir_all(dest).map_err(|e| RepoError::Io(e.to_string()))?;
        for (rel, contents) in files {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RepoError::Io(e.to_string()))?;
            }
            std::fs::write(&path, contents).map_err(|e| RepoError::Io(e.to_string()))?;
        }
        Ok(commit)
    }

    async fn changed_files(&self, remote: &str, reference: &str) -> Result<Vec<String>, RepoError> {
        let mut state = self.lock();
        state.calls.push(RepoCall::ChangedFiles {
            remote: remote.to_string(),
            reference: reference.to_string(),
        });
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        Ok(state
            .changed
            .get(&(remote.to_string(), reference.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
