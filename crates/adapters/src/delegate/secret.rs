// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service-account-token secret delegation

use super::{Delegate, DelegationError};
use crate::cluster::{
    ClusterApi, ClusterError, ConfigMap, ObjectReader, Secret, SERVICE_ACCOUNT_TOKEN_TYPE,
};
use async_trait::async_trait;
use tfa_core::Module;

const TOKEN_KEY: &str = "token";

#[derive(Clone)]
pub struct SecretDelegate<C> {
    cluster: C,
}

impl<C: ClusterApi> SecretDelegate<C> {
    pub fn new(cluster: C) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl<C: ClusterApi> Delegate for SecretDelegate<C> {
    type Client = DelegatedClient<C>;

    async fn delegate_token(&self, module: &Module) -> Result<String, DelegationError> {
        let namespace = &module.metadata.namespace;
        let name = module.delegate_secret_name();
        let secret_id = format!("{}/{}", namespace, name);

        let secret = self
            .cluster
            .get_secret(namespace, name)
            .await
            .map_err(|source| DelegationError::SecretUnavailable {
                secret: secret_id.clone(),
                source,
            })?;

        token_from_secret(&secret_id, &secret)
    }

    async fn setup_delegation(
        &self,
        namespace: &str,
        token: &str,
    ) -> Result<Self::Client, DelegationError> {
        if token.trim().is_empty() {
            return Err(DelegationError::Rejected("empty token".to_string()));
        }
        Ok(DelegatedClient::new(self.cluster.clone(), namespace, token))
    }
}

pub(crate) fn token_from_secret(
    secret_id: &str,
    secret: &Secret,
) -> Result<String, DelegationError> {
    if secret.kind != SERVICE_ACCOUNT_TOKEN_TYPE {
        return Err(DelegationError::WrongSecretType {
            secret: secret_id.to_string(),
            found: secret.kind.clone(),
        });
    }
    match secret.data.get(TOKEN_KEY) {
        Some(token) if !token.is_empty() => Ok(token.clone()),
        _ => Err(DelegationError::MissingToken(secret_id.to_string())),
    }
}

/// Object reader confined to one namespace
///
/// The cluster store behind it has no per-identity permissions: the token
/// names the identity the client acts as, and the namespace filter is the
/// only restriction applied to reads.
#[derive(Clone)]
pub struct DelegatedClient<C> {
    inner: C,
    namespace: String,
    token: String,
}

impl<C> DelegatedClient<C> {
    pub(crate) fn new(inner: C, namespace: &str, token: &str) -> Self {
        Self {
            inner,
            namespace: namespace.to_string(),
            token: token.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Token the client was set up with
    pub fn token(&self) -> &str {
        &self.token
    }

    fn check(&self, namespace: &str, kind: &str, name: &str) -> Result<(), ClusterError> {
        if namespace != self.namespace {
            return Err(ClusterError::Forbidden(format!(
                "{} {}/{} from namespace {}",
                kind, namespace, name, self.namespace
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: ObjectReader> ObjectReader for DelegatedClient<C> {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError> {
        self.check(namespace, "secret", name)?;
        self.inner.get_secret(namespace, name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError> {
        self.check(namespace, "configmap", name)?;
        self.inner.get_config_map(namespace, name).await
    }
}

#[cfg(test)]
#[path = "secret_tests.rs"]
mod tests;
