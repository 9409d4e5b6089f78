// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::git::{RepoError, Repositories};
use crate::terraform::{PlanResult, Terraform, TerraformError, TfContext};
use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tracing::Instrument;

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Wrapper that adds tracing to any Repositories
#[derive(Clone)]
pub struct TracedRepositories<R> {
    inner: R,
}

impl<R> TracedRepositories<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: Repositories> Repositories for TracedRepositories<R> {
    async fn hash(&self, remote: &str, reference: &str, path: &str) -> Result<String, RepoError> {
        let result = self.inner.hash(remote, reference, path).await;
        match &result {
            Ok(commit) => tracing::trace!(remote, reference, path, commit, "resolved"),
            Err(e) => tracing::warn!(remote, reference, path, error = %e, "hash failed"),
        }
        result
    }

    async fn log_message(
        &self,
        remote: &str,
        reference: &str,
        path: &str,
    ) -> Result<String, RepoError> {
        self.inner.log_message(remote, reference, path).await
    }

    async fn clone_into(
        &self,
        remote: &str,
        dest: &Path,
        reference: &str,
        pathspecs: &[String],
        remove_git_dir: bool,
    ) -> Result<String, RepoError> {
        let span = tracing::info_span!("repo.clone", remote, reference, dest = %dest.display());
        async move {
            // Precondition: parent directory must exist
            if let Some(parent) = dest.parent() {
                if !parent.exists() {
                    tracing::error!("parent directory does not exist");
                    return Err(RepoError::Io(format!(
                        "parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            tracing::info!(pathspecs = pathspecs.len(), "cloning");
            let start = Instant::now();
            let result = self
                .inner
                .clone_into(remote, dest, reference, pathspecs, remove_git_dir)
                .await;
            match &result {
                Ok(commit) => tracing::info!(commit, elapsed_ms = elapsed_ms(start), "cloned"),
                Err(e) => {
                    tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "clone failed")
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn changed_files(&self, remote: &str, reference: &str) -> Result<Vec<String>, RepoError> {
        let result = self.inner.changed_files(remote, reference).await;
        tracing::trace!(
            remote,
            reference,
            count = result.as_ref().map(|v| v.len()).ok(),
            "listed changed files"
        );
        result
    }
}

/// Wrapper that adds tracing to any Terraform
#[derive(Clone)]
pub struct TracedTerraform<T> {
    inner: T,
}

impl<T> TracedTerraform<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

async fn traced_step<F, O>(step: &'static str, ctx: &TfContext, fut: F) -> Result<O, TerraformError>
where
    F: std::future::Future<Output = Result<O, TerraformError>>,
{
    let span = tracing::info_span!("terraform", step, dir = %ctx.working_dir.display());
    async move {
        // Precondition: working directory must exist
        if !ctx.working_dir.is_dir() {
            tracing::error!("working directory does not exist");
            return Err(TerraformError::Spawn {
                command: step.to_string(),
                reason: format!(
                    "working directory does not exist: {}",
                    ctx.working_dir.display()
                ),
            });
        }

        tracing::info!(env_count = ctx.env.len(), "starting");
        let start = Instant::now();
        let result = fut.await;
        match &result {
            Ok(_) => tracing::info!(elapsed_ms = elapsed_ms(start), "completed"),
            Err(e) => tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "failed"),
        }
        result
    }
    .instrument(span)
    .await
}

#[async_trait]
impl<T: Terraform> Terraform for TracedTerraform<T> {
    async fn init(
        &self,
        ctx: &TfContext,
        backend: &[(String, String)],
    ) -> Result<String, TerraformError> {
        traced_step("init", ctx, self.inner.init(ctx, backend)).await
    }

    async fn plan(&self, ctx: &TfContext) -> Result<PlanResult, TerraformError> {
        let result = traced_step("plan", ctx, self.inner.plan(ctx)).await;
        if let Ok(plan) = &result {
            tracing::debug!(diff = plan.diff, "plan finished");
        }
        result
    }

    async fn show_plan(&self, ctx: &TfContext) -> Result<String, TerraformError> {
        traced_step("show", ctx, self.inner.show_plan(ctx)).await
    }

    async fn apply(&self, ctx: &TfContext) -> Result<String, TerraformError> {
        traced_step("apply", ctx, self.inner.apply(ctx)).await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
