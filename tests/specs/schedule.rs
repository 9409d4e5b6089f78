//! Cron schedule scenarios
//!
//! Missed runs are counted from the later of creation and the last run
//! start; a run moves that point forward so the same occurrence never
//! triggers twice.

use crate::prelude::*;
use similar_asserts::assert_eq;
use tfa_core::{next_schedule, Schedule, ScheduleError};
use tfa_engine::ReconcileResult;

const HOURLY: &str = "0 */1 * * *";

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
}

#[test]
fn no_occurrence_yet_means_nothing_missed() {
    let schedule = next_schedule(HOURLY, at(1, 5), at(1, 15), Duration::from_secs(60)).unwrap();
    assert_eq!(
        schedule,
        Schedule {
            missed_runs: 0,
            next_run: at(2, 0),
        }
    );
}

#[test]
fn one_occurrence_passed_is_one_missed_run() {
    let schedule = next_schedule(HOURLY, at(1, 5), at(2, 15), Duration::from_secs(60)).unwrap();
    assert_eq!(
        schedule,
        Schedule {
            missed_runs: 1,
            next_run: at(3, 0),
        }
    );
}

#[test]
fn february_31st_never_occurs() {
    let result = next_schedule("59 23 31 2 *", at(1, 5), at(2, 15), Duration::from_secs(60));
    assert!(matches!(result, Err(ScheduleError::InvalidSchedule { .. })));
}

#[tokio::test]
async fn missed_occurrence_runs_once() {
    let mut world = World::new();
    world.update(|m| {
        m.spec.schedule = Some(HOURLY.to_string());
        m.status.run_commit_hash = COMMIT.to_string();
    });
    world.clock.set(at(2, 15));
    let reconciler = world.reconciler();

    reconciler.reconcile(&world.key).await;
    let pending = world.module().pending_request().unwrap();
    assert_eq!(pending.kind, RequestType::ScheduledRun);

    let (done, handle) = world.start_engine();
    world.finish(done, handle, 1).await;

    let status = world.module().status;
    assert_eq!(status.current_state, Some(State::Ready));
    assert_eq!(status.last_run_type, Some(RequestType::ScheduledRun));
    assert_eq!(status.run_started_at, Some(at(2, 15)));

    // the 02:00 occurrence is now behind the last run start
    let result = reconciler.reconcile(&world.key).await;
    assert_eq!(result, ReconcileResult::after(Duration::from_secs(60)));
    assert!(world.module().pending_request().is_none());
    assert_eq!(world.terraform_inits(), 1);
}

#[tokio::test]
async fn impossible_schedule_marks_module_errored() {
    let world = World::new();
    world.update(|m| {
        m.spec.schedule = Some("59 23 31 2 *".to_string());
        m.status.run_commit_hash = COMMIT.to_string();
    });

    let result = world.reconciler().reconcile(&world.key).await;

    assert_eq!(result, ReconcileResult::done());
    let status = world.module().status;
    assert_eq!(status.current_state, Some(State::Errored));
    assert_eq!(status.state_reason, reason::SPECS_PARSING_FAILURE);
}
