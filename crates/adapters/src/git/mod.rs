// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git repository access for module sources

mod mirror;

pub use mirror::GitMirror;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRepositories, RepoCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from repository operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("unknown revision {reference} in {remote}")]
    UnknownRef { remote: String, reference: String },
    #[error("io error: {0}")]
    Io(String),
}

/// Read and check out module sources
#[async_trait]
pub trait Repositories: Clone + Send + Sync + 'static {
    /// Latest commit on `reference` touching `path`
    async fn hash(&self, remote: &str, reference: &str, path: &str) -> Result<String, RepoError>;

    /// Subject of that commit
    async fn log_message(
        &self,
        remote: &str,
        reference: &str,
        path: &str,
    ) -> Result<String, RepoError>;

    /// Check out `reference` into `dest`, returning the commit checked out
    async fn clone_into(
        &self,
        remote: &str,
        dest: &Path,
        reference: &str,
        pathspecs: &[String],
        remove_git_dir: bool,
    ) -> Result<String, RepoError>;

    /// Files changed on `reference` relative to the default branch
    async fn changed_files(&self, remote: &str, reference: &str) -> Result<Vec<String>, RepoError>;
}
