// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git CLI backed repositories with local bare mirrors

use super::{RepoError, Repositories};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;

/// Keeps one `git clone --mirror` per remote under `root`
#[derive(Clone)]
pub struct GitMirror {
    root: PathBuf,
    git: PathBuf,
    min_sync_interval: Duration,
    synced: Arc<Mutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>>,
}

impl GitMirror {
    pub fn new(root: PathBuf, git: PathBuf) -> Self {
        Self {
            root,
            git,
            min_sync_interval: Duration::from_secs(30),
            synced: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Skip fetching when the mirror was refreshed more recently than this
    pub fn with_min_sync_interval(mut self, interval: Duration) -> Self {
        self.min_sync_interval = interval;
        self
    }

    fn mirror_dir(&self, remote: &str) -> PathBuf {
        let name: String = remote
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(name)
    }

    async fn git(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, RepoError> {
        let mut cmd = Command::new(&self.git);
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        let output = cmd
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RepoError::Io(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepoError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Create or refresh the mirror of `remote`
    async fn sync(&self, remote: &str) -> Result<PathBuf, RepoError> {
        let slot = {
            let mut synced = self.synced.lock().await;
            Arc::clone(synced.entry(remote.to_string()).or_default())
        };
        // one fetch per remote at a time
        let mut last_sync = slot.lock().await;
        let dir = self.mirror_dir(remote);

        if !dir.join("HEAD").exists() {
            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(|e| RepoError::Io(e.to_string()))?;
            let dest = dir.to_string_lossy().to_string();
            self.git(None, &["clone", "--quiet", "--mirror", "--", remote, &dest])
                .await?;
            *last_sync = Some(Instant::now());
        } else if last_sync.map_or(true, |t| t.elapsed() >= self.min_sync_interval) {
            self.git(Some(&dir), &["remote", "update", "--prune"])
                .await?;
            *last_sync = Some(Instant::now());
        }

        Ok(dir)
    }

    async fn resolve(
        &self,
        mirror: &Path,
        remote: &str,
        reference: &str,
    ) -> Result<String, RepoError> {
        let rev = format!("{}^{{commit}}", reference);
        self.git(Some(mirror), &["rev-parse", "--verify", "--quiet", &rev])
            .await
            .map_err(|_| RepoError::UnknownRef {
                remote: remote.to_string(),
                reference: reference.to_string(),
            })
    }

    async fn log(
        &self,
        remote: &str,
        reference: &str,
        path: &str,
        format: &str,
    ) -> Result<String, RepoError> {
        let mirror = self.sync(remote).await?;
        let commit = self.resolve(&mirror, remote, reference).await?;
        let pretty = format!("--pretty=format:{}", format);
        let mut args = vec!["log", "-n", "1", pretty.as_str(), commit.as_str()];
        if !path.is_empty() {
            args.push("--");
            args.push(path);
        }
        self.git(Some(&mirror), &args).await
    }
}

#[async_trait]
impl Repositories for GitMirror {
    async fn hash(&self, remote: &str, reference: &str, path: &str) -> Result<String, RepoError> {
        self.log(remote, reference, path, "%H").await
    }

    async fn log_message(
        &self,
        remote: &str,
        reference: &str,
        path: &str,
    ) -> Result<String, RepoError> {
        self.log(remote, reference, path, "%s").await
    }

    async fn clone_into(
        &self,
        remote: &str,
        dest: &Path,
        reference: &str,
        pathspecs: &[String],
        remove_git_dir: bool,
    ) -> Result<String, RepoError> {
        let mirror = self.sync(remote).await?;
        let commit = self.resolve(&mirror, remote, reference).await?;

        let source = mirror.to_string_lossy().to_string();
        let target = dest.to_string_lossy().to_string();
        self.git(
            None,
            &["clone", "--quiet", "--no-checkout", "--", &source, &target],
        )
        .await?;

        if pathspecs.is_empty() {
            self.git(Some(dest), &["checkout", "--quiet", "--detach", &commit])
                .await?;
        } else {
            let mut args = vec!["checkout", "--quiet", commit.as_str(), "--"];
            args.extend(pathspecs.iter().map(String::as_str));
            self.git(Some(dest), &args).await?;
        }

        if remove_git_dir {
            tokio::fs::remove_dir_all(dest.join(".git"))
                .await
                .map_err(|e| RepoError::Io(e.to_string()))?;
        }

        Ok(commit)
    }

    async fn changed_files(&self, remote: &str, reference: &str) -> Result<Vec<String>, RepoError> {
        let mirror = self.sync(remote).await?;
        let commit = self.resolve(&mirror, remote, reference).await?;
        let range = format!("HEAD...{}", commit);
        let out = self
            .git(Some(&mirror), &["diff", "--name-only", &range])
            .await?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
#[path = "mirror_tests.rs"]
mod tests;
