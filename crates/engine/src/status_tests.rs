// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tfa_adapters::FakeCluster;
use tfa_core::{reason, ModuleSpec, ObjectMeta};

fn setup() -> (FakeCluster, ModuleKey) {
    let cluster = FakeCluster::new();
    let module = Module::new(ObjectMeta::new("team-a", "infra"), ModuleSpec::default());
    let key = module.key();
    cluster.insert_module(module);
    (cluster, key)
}

#[tokio::test]
async fn patch_applies_update_to_fresh_copy() {
    let (cluster, key) = setup();
    let updated = patch_module_status(&cluster, &key, &Backoff::immediate(3), |status| {
        status.set_state(
            State::Running,
            reason::RUN_TRIGGERED,
            "preparing for TF run",
        );
    })
    .await
    .unwrap();

    assert_eq!(updated.status.current_state, Some(State::Running));
    assert_eq!(cluster.module(&key).unwrap().status, updated.status);
}

#[tokio::test]
async fn patch_keeps_fields_it_does_not_touch() {
    let (cluster, key) = setup();
    let backoff = Backoff::immediate(3);
    patch_module_status(&cluster, &key, &backoff, |s| {
        s.run_commit_hash = "abc".to_string();
    })
    .await
    .unwrap();
    patch_module_status(&cluster, &key, &backoff, |s| {
        s.set_state(State::Ready, reason::NO_DRIFT_DETECTED, "No changes.");
    })
    .await
    .unwrap();

    let status = cluster.module(&key).unwrap().status;
    assert_eq!(status.run_commit_hash, "abc");
    assert_eq!(status.state_reason, reason::NO_DRIFT_DETECTED);
}

#[tokio::test]
async fn patch_retries_conflicts() {
    let (cluster, key) = setup();
    cluster.inject_conflicts(2);
    patch_module_status(&cluster, &key, &Backoff::immediate(3), |s| {
        s.observed_generation = 7;
    })
    .await
    .unwrap();
    assert_eq!(cluster.module(&key).unwrap().status.observed_generation, 7);
    assert_eq!(cluster.status_history(&key).len(), 1);
}

#[tokio::test]
async fn set_errored_swallows_write_failures() {
    let (cluster, key) = setup();
    cluster.fail_status_patches(Some(ClusterError::Forbidden("status".to_string())));
    set_errored(
        &cluster,
        &key,
        &Backoff::immediate(3),
        reason::UNKNOWN,
        "boom",
    )
    .await;
    assert_eq!(cluster.module(&key).unwrap().status.current_state, None);

    cluster.fail_status_patches(None);
    set_errored(
        &cluster,
        &key,
        &Backoff::immediate(3),
        reason::UNKNOWN,
        "boom",
    )
    .await;
    let status = cluster.module(&key).unwrap().status;
    assert_eq!(status.current_state, Some(State::Errored));
    assert_eq!(status.state_message, "boom");
}
