// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delegated identities
//!
//! A run never reads module secrets with the controller's own identity. The
//! module names a service-account-token secret in its namespace; its token is
//! exchanged for a client that can only see that namespace.

mod secret;

pub use secret::{DelegatedClient, SecretDelegate};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{DelegateCall, FakeDelegate};

use crate::cluster::{ClusterError, ObjectReader};
use async_trait::async_trait;
use tfa_core::Module;
use thiserror::Error;

/// Errors from delegation; all are configuration problems, never retried
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DelegationError {
    #[error("unable to read delegate secret {secret}: {source}")]
    SecretUnavailable {
        secret: String,
        #[source]
        source: ClusterError,
    },
    #[error(
        "delegate secret {secret} has type {found:?}, expected kubernetes.io/service-account-token"
    )]
    WrongSecretType { secret: String, found: String },
    #[error("delegate secret {0} has no 'token' key")]
    MissingToken(String),
    #[error("delegated client rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Delegate: Clone + Send + Sync + 'static {
    type Client: ObjectReader;

    /// Read the module's delegate token using the controller identity
    async fn delegate_token(&self, module: &Module) -> Result<String, DelegationError>;

    /// Build a client bound to the token and restricted to `namespace`
    ///
    /// The file-backed cluster store has no per-identity permissions, so the
    /// token is carried on the client for identification only; reads outside
    /// `namespace` are refused by the client itself.
    async fn setup_delegation(
        &self,
        namespace: &str,
        token: &str,
    ) -> Result<Self::Client, DelegationError>;
}
