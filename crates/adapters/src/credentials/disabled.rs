// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider used when no credential backend is configured.

use super::{CredentialError, CredentialProvider, Credentials};
use async_trait::async_trait;
use tfa_core::{CredentialRequests, ModuleKey};

/// Issues nothing.
///
/// Modules without credential requests run unaffected; a module that asks
/// for AWS or GCP credentials fails its run preparation.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledCredentialProvider;

impl DisabledCredentialProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialProvider for DisabledCredentialProvider {
    async fn generate_creds(
        &self,
        _token: &str,
        _module: &ModuleKey,
        requests: &CredentialRequests,
    ) -> Result<Credentials, CredentialError> {
        if requests.aws.is_some() {
            return Err(CredentialError::NotConfigured("aws"));
        }
        if requests.gcp.is_some() {
            return Err(CredentialError::NotConfigured("gcp"));
        }
        Ok(Credentials::default())
    }
}
