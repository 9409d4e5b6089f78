// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake credential provider for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AwsCredentials, CredentialError, CredentialProvider, Credentials};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tfa_core::{CredentialRequests, ModuleKey};

/// Recorded credential call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCall {
    pub token: String,
    pub module: ModuleKey,
    pub requests: CredentialRequests,
}

#[derive(Default)]
struct FakeCredentialState {
    error: Option<CredentialError>,
    calls: Vec<CredentialCall>,
}

/// Issues deterministic credentials derived from the module key
#[derive(Clone, Default)]
pub struct FakeCredentialProvider {
    state: Arc<Mutex<FakeCredentialState>>,
}

impl FakeCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeCredentialState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent call fail
    pub fn fail_with(&self, error: Option<CredentialError>) {
        self.lock().error = error;
    }

    pub fn calls(&self) -> Vec<CredentialCall> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl CredentialProvider for FakeCredentialProvider {
    async fn generate_creds(
        &self,
        token: &str,
        module: &ModuleKey,
        requests: &CredentialRequests,
    ) -> Result<Credentials, CredentialError> {
        let mut state = self.lock();
        state.calls.push(CredentialCall {
            token: token.to_string(),
            module: module.clone(),
            requests: requests.clone(),
        });
        if let Some(err) = &state.error {
            return Err(err.clone());
        }

        let aws = requests.aws.as_ref().map(|req| AwsCredentials {
            access_key_id: format!("AKIA-{}", req.vault_role),
            secret_access_key: format!("secret-{}", module.name),
            session_token: format!("session-{}", module.namespace),
        });
        let gcp_token = requests
            .gcp
            .as_ref()
            .map(|_| format!("ya29.{}", module.name));
        Ok(Credentials { aws, gcp_token })
    }
}
