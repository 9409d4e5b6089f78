// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake delegate for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Delegate, DelegatedClient, DelegationError};
use crate::cluster::FakeCluster;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tfa_core::{Module, ModuleKey};

/// Recorded delegate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateCall {
    Token(ModuleKey),
    Setup { namespace: String, token: String },
}

#[derive(Default)]
struct FakeDelegateState {
    failures: BTreeMap<ModuleKey, DelegationError>,
    calls: Vec<DelegateCall>,
}

/// Hands every module the token `token-<namespace>` unless told to fail.
/// Delegated clients read from the wrapped [`FakeCluster`].
#[derive(Clone, Default)]
pub struct FakeDelegate {
    cluster: FakeCluster,
    state: Arc<Mutex<FakeDelegateState>>,
}

impl FakeDelegate {
    pub fn new(cluster: FakeCluster) -> Self {
        Self {
            cluster,
            state: Arc::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeDelegateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_for(&self, key: ModuleKey, err: DelegationError) {
        self.lock().failures.insert(key, err);
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<DelegateCall> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl Delegate for FakeDelegate {
    type Client = DelegatedClient<FakeCluster>;

    async fn delegate_token(&self, module: &Module) -> Result<String, DelegationError> {
        let key = module.key();
        let mut state = self.lock();
        state.calls.push(DelegateCall::Token(key.clone()));
        match state.failures.get(&key) {
            Some(err) => Err(err.clone()),
            None => Ok(format!("token-{}", key.namespace)),
        }
    }

    async fn setup_delegation(
        &self,
        namespace: &str,
        token: &str,
    ) -> Result<Self::Client, DelegationError> {
        self.lock().calls.push(DelegateCall::Setup {
            namespace: namespace.to_string(),
            token: token.to_string(),
        });
        Ok(DelegatedClient::new(self.cluster.clone(), namespace, token))
    }
}
