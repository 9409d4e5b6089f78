// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for run preparation

use std::path::PathBuf;
use tfa_adapters::{ClusterError, CredentialError, DelegationError, RepoError};
use tfa_core::reason;
use thiserror::Error;

/// Failures before terraform is first invoked; all are terminal for the run
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Delegation(#[from] DelegationError),
    #[error("unable to resolve {name} from {reference}: {source}")]
    Reference {
        name: String,
        reference: String,
        #[source]
        source: ClusterError,
    },
    #[error("key {key} not found in {reference} for {name}")]
    MissingKey {
        name: String,
        reference: String,
        key: String,
    },
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("unable to check out module sources: {0}")]
    Checkout(#[from] RepoError),
    #[error("module path {0} not found in repository")]
    MissingPath(String),
    #[error("strongbox decryption failed: {0}")]
    Strongbox(String),
    #[error("unable to encode variables: {0}")]
    Vars(#[from] serde_json::Error),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PrepareError {
    /// Status reason for a run that failed with this error
    pub fn reason(&self) -> &'static str {
        match self {
            PrepareError::Delegation(_) => reason::DELEGATION_FAILED,
            _ => reason::RUN_PREPARATION_FAILED,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PrepareError::Io { path, source }
    }
}
