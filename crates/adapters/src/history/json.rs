// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed run history
//!
//! Layout: `<root>/<namespace>/<name>/{default-last-run,default-last-apply,pr-<num>-<hash>}.json`.

use super::{sort_newest_first, HistoryError, RunStore, StoredRun};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tfa_core::{Clock, ModuleKey, Run};

const LAST_RUN: &str = "default-last-run.json";
const LAST_APPLY: &str = "default-last-apply.json";
const PR_PREFIX: &str = "pr-";

#[derive(Clone)]
pub struct JsonRunStore<C> {
    root: PathBuf,
    clock: C,
}

impl<C: Clock> JsonRunStore<C> {
    pub fn new(root: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    fn module_dir(&self, key: &ModuleKey) -> PathBuf {
        self.root.join(&key.namespace).join(&key.name)
    }

    fn pr_file(pr_number: u64, commit_hash: &str) -> String {
        format!("{}{}-{}.json", PR_PREFIX, pr_number, commit_hash)
    }

    async fn load(&self, path: &Path) -> Result<Option<StoredRun>, HistoryError> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| HistoryError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Load a PR record, deleting it once expired
    async fn load_pr(&self, path: &Path) -> Result<Option<Run>, HistoryError> {
        match self.load(path).await? {
            Some(stored) if stored.is_expired(self.clock.now()) => {
                tracing::debug!(path = %path.display(), "removing expired pr run");
                if let Err(e) = tokio::fs::remove_file(path).await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove expired pr run");
                }
                Ok(None)
            }
            other => Ok(other.map(|stored| stored.run)),
        }
    }

    async fn save(&self, path: PathBuf, run: &Run) -> Result<(), HistoryError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| HistoryError::Io { path, source }
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io(parent))?;
        }
        let stored = StoredRun {
            saved_at: self.clock.now(),
            run: run.clone(),
        };
        let json =
            serde_json::to_string_pretty(&stored).map_err(|source| HistoryError::Corrupt {
                path: path.clone(),
                source,
            })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(io(&path))
    }
}

#[async_trait]
impl<C: Clock> RunStore for JsonRunStore<C> {
    async fn default_last_run(&self, key: &ModuleKey) -> Result<Option<Run>, HistoryError> {
        let path = self.module_dir(key).join(LAST_RUN);
        Ok(self.load(&path).await?.map(|stored| stored.run))
    }

    async fn default_apply(&self, key: &ModuleKey) -> Result<Option<Run>, HistoryError> {
        let path = self.module_dir(key).join(LAST_APPLY);
        Ok(self.load(&path).await?.map(|stored| stored.run))
    }

    async fn pr_run(
        &self,
        key: &ModuleKey,
        pr_number: u64,
        commit_hash: &str,
    ) -> Result<Option<Run>, HistoryError> {
        let path = self
            .module_dir(key)
            .join(Self::pr_file(pr_number, commit_hash));
        self.load_pr(&path).await
    }

    async fn runs(&self, key: &ModuleKey) -> Result<Vec<Run>, HistoryError> {
        let dir = self.module_dir(key);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(HistoryError::Io { path: dir, source }),
        };

        let mut runs = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => return Err(HistoryError::Io { path: dir, source }),
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".json") {
                continue;
            }
            let path = entry.path();
            let run = if name.starts_with(PR_PREFIX) {
                self.load_pr(&path).await?
            } else {
                self.load(&path).await?.map(|stored| stored.run)
            };
            runs.extend(run);
        }
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    async fn set_default_last_run(&self, run: &Run) -> Result<(), HistoryError> {
        self.save(self.module_dir(&run.module).join(LAST_RUN), run)
            .await
    }

    async fn set_default_apply(&self, run: &Run) -> Result<(), HistoryError> {
        self.save(self.module_dir(&run.module).join(LAST_APPLY), run)
            .await
    }

    async fn set_pr_run(&self, run: &Run) -> Result<(), HistoryError> {
        let pr = run
            .request
            .pr
            .as_ref()
            .ok_or_else(|| HistoryError::NotPullRequest(run.module.clone()))?;
        let path = self
            .module_dir(&run.module)
            .join(Self::pr_file(pr.number, &run.commit_hash));
        self.save(path, run).await
    }
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
