//! End-to-end run scenarios: a new commit is noticed by the reconciler,
//! queued, and executed by the engine.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn new_commit_with_drift_is_applied() {
    let mut world = World::new();
    world.terraform.set_diff(true);

    world.reconciler().reconcile(&world.key).await;
    let (done, handle) = world.start_engine();
    world.finish(done, handle, 1).await;

    let status = world.module().status;
    assert_eq!(status.current_state, Some(State::Ready));
    assert_eq!(status.state_reason, reason::APPLIED);
    assert_eq!(status.last_run_type, Some(RequestType::PollingRun));
    assert_eq!(status.last_applied_commit_hash, COMMIT);
    assert_eq!(
        world.terraform.steps(),
        vec![TfStep::Init, TfStep::Plan, TfStep::Show, TfStep::Apply]
    );
    assert_eq!(world.runs_left(), 0);
}

#[tokio::test]
async fn plan_only_module_reports_drift_without_applying() {
    let mut world = World::new();
    world.terraform.set_diff(true);
    world.update(|m| m.spec.plan_only = true);

    world.reconciler().reconcile(&world.key).await;
    let (done, handle) = world.start_engine();
    world.finish(done, handle, 1).await;

    let status = world.module().status;
    assert_eq!(status.current_state, Some(State::Ready));
    assert_eq!(status.state_reason, reason::PLAN_ONLY_DRIFT_DETECTED);
    assert!(status.state_message.starts_with("PlanOnly/"));
    assert!(status.last_apply_info.is_empty());
    assert!(status.last_drift_info.output.contains(DIFF_OUTPUT));
    assert!(!world.terraform.steps().contains(&TfStep::Apply));

    let last = world
        .history
        .default_last_run(&world.key)
        .await
        .unwrap()
        .unwrap();
    assert!(last.diff_detected);
    assert!(!last.applied);
    assert!(world
        .history
        .default_apply(&world.key)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn timeout_during_apply_fails_run_and_removes_working_dir() {
    let mut world = World::new();
    world.terraform.set_diff(true);
    world
        .terraform
        .delay(TfStep::Apply, Duration::from_secs(30));
    world.update(|m| m.spec.run_timeout = 1);

    world.reconciler().reconcile(&world.key).await;
    let (done, handle) = world.start_engine();
    world.finish(done, handle, 1).await;

    let status = world.module().status;
    assert_eq!(status.current_state, Some(State::Errored));
    assert_eq!(status.state_reason, reason::RUN_TIMED_OUT);
    assert_eq!(world.runs_left(), 0);
    assert!(world.run_status.is_empty());

    let last = world
        .history
        .default_last_run(&world.key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.state, State::Errored);
}

#[tokio::test]
async fn finished_run_is_not_triggered_again() {
    let mut world = World::new();
    let reconciler = world.reconciler();

    reconciler.reconcile(&world.key).await;
    let (done, handle) = world.start_engine();
    world.finish(done, handle, 1).await;

    assert_eq!(
        world.module().status.state_reason,
        reason::NO_DRIFT_DETECTED
    );
    reconciler.reconcile(&world.key).await;
    assert!(world.module().pending_request().is_none());
    assert_eq!(world.terraform_inits(), 1);
}
