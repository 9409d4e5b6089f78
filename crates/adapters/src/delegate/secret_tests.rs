// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::cluster::FakeCluster;
use tfa_core::module::DEFAULT_DELEGATE_SECRET;
use tfa_core::{ModuleSpec, ObjectMeta};

fn module() -> Module {
    Module::new(ObjectMeta::new("team-a", "infra"), ModuleSpec::default())
}

fn token_secret(kind: &str, token: Option<&str>) -> Secret {
    let secret = Secret::new("team-a", DEFAULT_DELEGATE_SECRET, kind);
    match token {
        Some(t) => secret.with_data("token", t),
        None => secret,
    }
}

#[tokio::test]
async fn token_is_read_from_service_account_secret() {
    let cluster = FakeCluster::new();
    cluster.insert_secret(token_secret(SERVICE_ACCOUNT_TOKEN_TYPE, Some("jwt")));
    let delegate = SecretDelegate::new(cluster);

    assert_eq!(delegate.delegate_token(&module()).await.unwrap(), "jwt");
}

#[tokio::test]
async fn missing_secret_is_reported() {
    let delegate = SecretDelegate::new(FakeCluster::new());
    let err = delegate.delegate_token(&module()).await.unwrap_err();
    assert!(
        matches!(err, DelegationError::SecretUnavailable { .. }),
        "{err}"
    );
}

#[tokio::test]
async fn wrong_type_and_missing_token_are_rejected() {
    let cluster = FakeCluster::new();
    cluster.insert_secret(token_secret("Opaque", Some("jwt")));
    let delegate = SecretDelegate::new(cluster.clone());
    assert!(matches!(
        delegate.delegate_token(&module()).await,
        Err(DelegationError::WrongSecretType { .. })
    ));

    cluster.insert_secret(token_secret(SERVICE_ACCOUNT_TOKEN_TYPE, None));
    assert_eq!(
        delegate.delegate_token(&module()).await,
        Err(DelegationError::MissingToken(format!(
            "team-a/{}",
            DEFAULT_DELEGATE_SECRET
        )))
    );
}

#[tokio::test]
async fn delegated_client_is_confined_to_its_namespace() {
    let cluster = FakeCluster::new();
    cluster.insert_secret(Secret::new("team-a", "db", "Opaque").with_data("pw", "a"));
    cluster.insert_secret(Secret::new("team-b", "db", "Opaque").with_data("pw", "b"));
    let delegate = SecretDelegate::new(cluster);

    let client = delegate.setup_delegation("team-a", "jwt").await.unwrap();
    assert_eq!(client.namespace(), "team-a");
    assert!(client.get_secret("team-a", "db").await.is_ok());
    assert!(matches!(
        client.get_secret("team-b", "db").await,
        Err(ClusterError::Forbidden(_))
    ));

    assert!(matches!(
        delegate.setup_delegation("team-a", " ").await,
        Err(DelegationError::Rejected(_))
    ));
}

#[tokio::test]
async fn delegated_client_keeps_the_token_it_was_set_up_with() {
    let cluster = FakeCluster::new();
    cluster.insert_secret(Secret::new("team-b", "db", "Opaque").with_data("pw", "b"));
    let delegate = SecretDelegate::new(cluster);

    let a = delegate.setup_delegation("team-a", "jwt-a").await.unwrap();
    let b = delegate.setup_delegation("team-b", "jwt-b").await.unwrap();
    assert_eq!(a.token(), "jwt-a");
    assert_eq!(b.token(), "jwt-b");

    // same store, different identities: only the namespace filter separates them
    assert!(b.get_secret("team-b", "db").await.is_ok());
    assert!(matches!(
        a.get_secret("team-b", "db").await,
        Err(ClusterError::Forbidden(_))
    ));
}
