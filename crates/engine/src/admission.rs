// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request admission
//!
//! A module holds at most one pending [`Request`], stored as an annotation.
//! Every change is a refetch and a write at the fetched resource version,
//! retried on conflict, so independent trigger sources never both win.

use tfa_adapters::{ClusterApi, ClusterError};
use tfa_core::{
    retry_with_backoff, Backoff, ModuleKey, Request, RequestError, RUN_REQUEST_ANNOTATION,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid run request: {0}")]
    Invalid(#[from] RequestError),
    #[error("another pending run request found")]
    RequestAlreadyExists,
    #[error("no pending run requests found")]
    NoPendingRequest,
    #[error("run request ID doesn't match pending request id")]
    RequestMismatch,
    #[error("unable to encode run request: {0}")]
    Encode(String),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl AdmissionError {
    fn is_retryable(&self) -> bool {
        matches!(self, AdmissionError::Cluster(e) if e.is_retryable())
    }
}

/// Attach `req` to the module unless a different request is pending.
/// Re-submitting the pending request is a no-op.
pub async fn ensure_request<C: ClusterApi>(
    cluster: &C,
    key: &ModuleKey,
    req: &Request,
    backoff: &Backoff,
) -> Result<(), AdmissionError> {
    req.validate()?;
    let encoded = req
        .encode()
        .map_err(|e| AdmissionError::Encode(e.to_string()))?;

    retry_with_backoff(backoff, AdmissionError::is_retryable, || async {
        let mut module = cluster.get_module(key).await?;
        if let Some(pending) = module.pending_request() {
            if pending.id == req.id {
                return Ok(());
            }
            return Err(AdmissionError::RequestAlreadyExists);
        }
        module
            .metadata
            .annotations
            .insert(RUN_REQUEST_ANNOTATION.to_string(), encoded.clone());
        cluster.update_module(&module).await?;
        tracing::debug!(module = %key, request = %req.id, kind = %req.kind, "run request added");
        Ok(())
    })
    .await
}

/// Clear the pending request if it is `req`
pub async fn remove_request<C: ClusterApi>(
    cluster: &C,
    key: &ModuleKey,
    req: &Request,
    backoff: &Backoff,
) -> Result<(), AdmissionError> {
    retry_with_backoff(backoff, AdmissionError::is_retryable, || async {
        let mut module = cluster.get_module(key).await?;
        let Some(pending) = module.pending_request() else {
            return Err(AdmissionError::NoPendingRequest);
        };
        if pending.id != req.id {
            return Err(AdmissionError::RequestMismatch);
        }
        module.metadata.annotations.remove(RUN_REQUEST_ANNOTATION);
        cluster.update_module(&module).await?;
        Ok(())
    })
    .await
}

/// Clear whatever is stored under the request annotation, decodable or not
pub async fn remove_current_request<C: ClusterApi>(
    cluster: &C,
    key: &ModuleKey,
    backoff: &Backoff,
) -> Result<(), AdmissionError> {
    retry_with_backoff(backoff, AdmissionError::is_retryable, || async {
        let mut module = cluster.get_module(key).await?;
        if module
            .metadata
            .annotations
            .remove(RUN_REQUEST_ANNOTATION)
            .is_none()
        {
            return Ok(());
        }
        cluster.update_module(&module).await?;
        Ok(())
    })
    .await
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
