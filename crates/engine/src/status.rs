// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status writes

use tfa_adapters::{ClusterApi, ClusterError};
use tfa_core::{retry_with_backoff, Backoff, Module, ModuleKey, ModuleStatus, State};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unable to patch status of {key}: {source}")]
pub struct StatusError {
    pub key: ModuleKey,
    #[source]
    pub source: ClusterError,
}

/// Refetch the module, apply `update` to its status and patch it at the
/// fetched resource version. Conflicts and transient failures are retried.
pub async fn patch_module_status<C, F>(
    cluster: &C,
    key: &ModuleKey,
    backoff: &Backoff,
    update: F,
) -> Result<Module, StatusError>
where
    C: ClusterApi,
    F: Fn(&mut ModuleStatus),
{
    retry_with_backoff(backoff, ClusterError::is_retryable, || async {
        let mut module = cluster.get_module(key).await?;
        update(&mut module.status);
        cluster.patch_status(&module).await
    })
    .await
    .map_err(|source| StatusError {
        key: key.clone(),
        source,
    })
}

/// Record `Errored`, logging instead of failing when the write is lost
pub async fn set_errored<C: ClusterApi>(
    cluster: &C,
    key: &ModuleKey,
    backoff: &Backoff,
    reason: &str,
    message: &str,
) {
    let result = patch_module_status(cluster, key, backoff, |status| {
        status.set_state(State::Errored, reason, message);
    })
    .await;
    if let Err(e) = result {
        tracing::error!(module = %key, reason, error = %e, "unable to set failed status");
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
