// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: the cluster, git, delegated identities,
//! credentials, run history and the terraform executable

pub mod cluster;
pub mod credentials;
pub mod delegate;
pub mod git;
pub mod history;
pub mod terraform;
pub mod traced;

pub use cluster::{
    ClusterApi, ClusterError, ConfigMap, JsonCluster, ObjectReader, Secret,
    SERVICE_ACCOUNT_TOKEN_TYPE,
};
pub use credentials::{
    AwsCredentials, CredentialError, CredentialProvider, Credentials, DisabledCredentialProvider,
};
pub use delegate::{Delegate, DelegatedClient, DelegationError, SecretDelegate};
pub use git::{GitMirror, RepoError, Repositories};
pub use history::{HistoryError, JsonRunStore, RunStore, StoredRun, PR_RUN_TTL};
pub use terraform::{PlanResult, Terraform, TerraformCli, TerraformError, TfContext, PLAN_FILE};
pub use traced::{TracedRepositories, TracedTerraform};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use cluster::{ClusterCall, FakeCluster};
#[cfg(any(test, feature = "test-support"))]
pub use credentials::{CredentialCall, FakeCredentialProvider};
#[cfg(any(test, feature = "test-support"))]
pub use delegate::{DelegateCall, FakeDelegate};
#[cfg(any(test, feature = "test-support"))]
pub use git::{FakeRepositories, RepoCall};
#[cfg(any(test, feature = "test-support"))]
pub use history::MemoryRunStore;
#[cfg(any(test, feature = "test-support"))]
pub use terraform::{FakeTerraform, TfCall, TfStep, APPLY_OUTPUT, DIFF_OUTPUT, NO_CHANGES_OUTPUT};
