// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-lived cloud credentials minted for a run

mod disabled;

pub use disabled::DisabledCredentialProvider;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{CredentialCall, FakeCredentialProvider};

use async_trait::async_trait;
use tfa_core::{CredentialRequests, ModuleKey};
use thiserror::Error;

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const GOOGLE_OAUTH_ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no credential provider configured, {0} credentials requested")]
    NotConfigured(&'static str),
    #[error("credential provider refused request for {module}: {reason}")]
    Refused { module: String, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

/// Credentials issued for one run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub aws: Option<AwsCredentials>,
    pub gcp_token: Option<String>,
}

impl Credentials {
    /// Environment variables terraform providers pick up
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(aws) = &self.aws {
            env.push((AWS_ACCESS_KEY_ID.to_string(), aws.access_key_id.clone()));
            env.push((
                AWS_SECRET_ACCESS_KEY.to_string(),
                aws.secret_access_key.clone(),
            ));
            if !aws.session_token.is_empty() {
                env.push((AWS_SESSION_TOKEN.to_string(), aws.session_token.clone()));
            }
        }
        if let Some(token) = &self.gcp_token {
            env.push((GOOGLE_OAUTH_ACCESS_TOKEN.to_string(), token.clone()));
        }
        env
    }
}

#[async_trait]
pub trait CredentialProvider: Clone + Send + Sync + 'static {
    /// Exchange the module's delegate token for the requested credentials
    async fn generate_creds(
        &self,
        token: &str,
        module: &ModuleKey,
        requests: &CredentialRequests,
    ) -> Result<Credentials, CredentialError>;
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
