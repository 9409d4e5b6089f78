// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Env and var resolution through a delegated client

use crate::error::PrepareError;
use std::collections::BTreeMap;
use tfa_adapters::{Credentials, ObjectReader};
use tfa_core::EnvVar;

/// Resolve declared entries to values. Literals win over references; entries
/// with neither are skipped.
pub async fn fetch_env_vars<R: ObjectReader>(
    client: &R,
    namespace: &str,
    vars: &[EnvVar],
) -> Result<BTreeMap<String, String>, PrepareError> {
    let mut resolved = BTreeMap::new();
    for var in vars {
        if let Some(value) = &var.value {
            resolved.insert(var.name.clone(), value.clone());
            continue;
        }
        let Some(source) = &var.value_from else {
            continue;
        };

        let value = if let Some(key_ref) = &source.config_map_key_ref {
            let reference = format!("configmap {}/{}", namespace, key_ref.name);
            let config_map = client
                .get_config_map(namespace, &key_ref.name)
                .await
                .map_err(|source| PrepareError::Reference {
                    name: var.name.clone(),
                    reference: reference.clone(),
                    source,
                })?;
            lookup(&config_map.data, &var.name, &reference, &key_ref.key)?
        } else if let Some(key_ref) = &source.secret_key_ref {
            let reference = format!("secret {}/{}", namespace, key_ref.name);
            let secret = client
                .get_secret(namespace, &key_ref.name)
                .await
                .map_err(|source| PrepareError::Reference {
                    name: var.name.clone(),
                    reference: reference.clone(),
                    source,
                })?;
            lookup(&secret.data, &var.name, &reference, &key_ref.key)?
        } else {
            continue;
        };
        resolved.insert(var.name.clone(), value);
    }
    Ok(resolved)
}

fn lookup(
    data: &BTreeMap<String, String>,
    name: &str,
    reference: &str,
    key: &str,
) -> Result<String, PrepareError> {
    data.get(key)
        .cloned()
        .ok_or_else(|| PrepareError::MissingKey {
            name: name.to_string(),
            reference: reference.to_string(),
            key: key.to_string(),
        })
}

/// Global env, overridden by module env, overridden by issued credentials
pub fn merge_env(
    global: &BTreeMap<String, String>,
    module: BTreeMap<String, String>,
    credentials: &Credentials,
) -> BTreeMap<String, String> {
    let mut env = global.clone();
    env.extend(module);
    env.extend(credentials.to_env());
    env
}

#[cfg(test)]
#[path = "delegation_tests.rs"]
mod tests;
