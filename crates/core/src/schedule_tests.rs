// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::module::{ModuleSpec, ObjectMeta, State, RUN_REQUEST_ANNOTATION};
use chrono::TimeZone;
use yare::parameterized;

const MINUTE: Duration = Duration::from_secs(60);

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
}

fn module_with_schedule(schedule: Option<&str>, created: DateTime<Utc>) -> Module {
    let mut metadata = ObjectMeta::new("team-a", "infra");
    metadata.creation_timestamp = Some(created);
    let spec = ModuleSpec {
        repo_url: "git@example.com:org/repo.git".to_string(),
        path: "infra".to_string(),
        schedule: schedule.map(str::to_string),
        ..ModuleSpec::default()
    };
    let mut module = Module::new(metadata, spec);
    module.status.run_commit_hash = "abc".to_string();
    module
}

fn ctx(now: DateTime<Utc>) -> DecisionContext<'static> {
    DecisionContext {
        now,
        head_commit: "abc",
        running: false,
        min_interval: MINUTE,
    }
}

#[parameterized(
    before_first_occurrence = { (1, 5), (1, 15), 0, (2, 0) },
    one_missed = { (1, 5), (2, 15), 1, (3, 0) },
    exactly_on_occurrence = { (1, 5), (2, 0), 1, (3, 0) },
    three_missed = { (1, 5), (4, 30), 3, (5, 0) },
)]
fn hourly_schedule(earliest: (u32, u32), now: (u32, u32), missed: u32, next: (u32, u32)) {
    let got = next_schedule(
        "0 */1 * * *",
        at(earliest.0, earliest.1),
        at(now.0, now.1),
        MINUTE,
    )
    .unwrap();
    assert_eq!(got.missed_runs, missed);
    assert_eq!(got.next_run, at(next.0, next.1));
}

#[test]
fn earliest_in_future_never_misses() {
    let got = next_schedule("*/5 * * * *", at(3, 0), at(2, 58), MINUTE).unwrap();
    assert_eq!(
        got,
        Schedule {
            missed_runs: 0,
            next_run: at(3, 0)
        }
    );
}

#[test]
fn impossible_date_is_invalid() {
    let err = next_schedule("59 23 31 2 *", at(1, 5), at(2, 15), MINUTE).unwrap_err();
    assert!(
        matches!(err, ScheduleError::InvalidSchedule { .. }),
        "{err}"
    );
}

#[test]
fn garbage_expression_is_invalid() {
    let err = next_schedule("every tuesday", at(1, 5), at(2, 15), MINUTE).unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidSchedule { .. }));
}

#[test]
fn schedule_below_minimum_interval_is_rejected() {
    let err =
        next_schedule("* * * * *", at(1, 5), at(2, 15), Duration::from_secs(300)).unwrap_err();
    match err {
        ScheduleError::ScheduleTooFrequent {
            interval, minimum, ..
        } => {
            assert_eq!(interval, MINUTE);
            assert_eq!(minimum, Duration::from_secs(300));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missed_runs_are_capped() {
    // every minute for three hours is 180 occurrences
    let err = next_schedule("* * * * *", at(1, 0), at(4, 0), MINUTE).unwrap_err();
    assert!(matches!(err, ScheduleError::TooManyMissedRuns { .. }));

    let ok = next_schedule("* * * * *", at(1, 0), at(2, 40), MINUTE).unwrap();
    assert_eq!(ok.missed_runs, MAX_MISSED_RUNS);
}

#[test]
fn earliest_time_prefers_latest_of_creation_and_run_start() {
    let mut module = module_with_schedule(None, at(1, 5));
    assert_eq!(earliest_time(&module), Some(at(1, 5)));

    module.status.run_started_at = Some(at(3, 1));
    assert_eq!(earliest_time(&module), Some(at(3, 1)));

    module.status.run_started_at = Some(at(0, 1));
    assert_eq!(earliest_time(&module), Some(at(1, 5)));
}

#[test]
fn suspended_running_or_deleting_modules_are_idle() {
    let mut module = module_with_schedule(Some("0 * * * *"), at(1, 5));
    module.spec.suspend = true;
    assert_eq!(decide(&module, &ctx(at(5, 0))), Decision::Idle);

    let mut module = module_with_schedule(Some("0 * * * *"), at(1, 5));
    module.status.current_state = Some(State::Running);
    assert_eq!(decide(&module, &ctx(at(5, 0))), Decision::Idle);

    let module = module_with_schedule(Some("0 * * * *"), at(1, 5));
    let held = DecisionContext {
        running: true,
        ..ctx(at(5, 0))
    };
    assert_eq!(decide(&module, &held), Decision::Idle);

    let mut module = module_with_schedule(Some("0 * * * *"), at(1, 5));
    module.metadata.deletion_timestamp = Some(at(4, 0));
    assert_eq!(decide(&module, &ctx(at(5, 0))), Decision::Idle);
}

#[test]
fn pending_request_is_dispatched() {
    let mut module = module_with_schedule(None, at(1, 5));
    let req = Request::new("r-1", RequestType::ForcedApply, at(1, 10));
    module
        .metadata
        .annotations
        .insert(RUN_REQUEST_ANNOTATION.to_string(), req.encode().unwrap());

    assert_eq!(decide(&module, &ctx(at(1, 11))), Decision::Dispatch(req));
}

#[test]
fn new_commit_triggers_polling_run() {
    let module = module_with_schedule(Some("0 * * * *"), at(1, 5));
    let moved = DecisionContext {
        head_commit: "def",
        ..ctx(at(1, 10))
    };
    assert_eq!(
        decide(&module, &moved),
        Decision::Trigger(RequestType::PollingRun)
    );
}

#[test]
fn first_run_triggers_polling_run() {
    let mut module = module_with_schedule(None, at(1, 5));
    module.status.run_commit_hash.clear();
    assert_eq!(
        decide(&module, &ctx(at(1, 6))),
        Decision::Trigger(RequestType::PollingRun)
    );
}

#[test]
fn unscheduled_module_requeues_after_poll_interval() {
    let module = module_with_schedule(None, at(1, 5));
    assert_eq!(decide(&module, &ctx(at(1, 6))), Decision::Requeue(MINUTE));
}

#[test]
fn missed_occurrence_triggers_scheduled_run() {
    let module = module_with_schedule(Some("0 */1 * * *"), at(1, 5));
    assert_eq!(
        decide(&module, &ctx(at(2, 15))),
        Decision::Trigger(RequestType::ScheduledRun)
    );
}

#[test]
fn requeue_is_bounded_by_poll_interval_and_next_occurrence() {
    let mut module = module_with_schedule(Some("0 */1 * * *"), at(1, 5));
    module.spec.poll_interval = 3600;
    // next occurrence 02:00 is 45 minutes away
    assert_eq!(
        decide(&module, &ctx(at(1, 15))),
        Decision::Requeue(Duration::from_secs(45 * 60))
    );

    module.spec.poll_interval = 60;
    assert_eq!(decide(&module, &ctx(at(1, 15))), Decision::Requeue(MINUTE));
}

#[test]
fn broken_schedule_fails_the_module() {
    let module = module_with_schedule(Some("59 23 31 2 *"), at(1, 5));
    assert!(matches!(
        decide(&module, &ctx(at(2, 15))),
        Decision::Fail(ScheduleError::InvalidSchedule { .. })
    ));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    const QUARTER: i64 = 15 * 60;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    proptest! {
        #[test]
        fn missed_count_matches_occurrences_in_window(
            start in 0i64..86_400,
            span in 0i64..(20 * 3600),
        ) {
            let earliest = base() + chrono::Duration::seconds(start);
            let now = earliest + chrono::Duration::seconds(span);

            let got = next_schedule("*/15 * * * *", earliest, now, MINUTE).unwrap();

            let offset = |t: DateTime<Utc>| (t - base()).num_seconds();
            let expected = offset(now).div_euclid(QUARTER) - offset(earliest).div_euclid(QUARTER);
            prop_assert_eq!(i64::from(got.missed_runs), expected);
            prop_assert!(got.next_run > now);
            prop_assert_eq!(offset(got.next_run) % QUARTER, 0);
        }

        #[test]
        fn run_start_resets_missed_count(
            start in 0i64..86_400,
            span in (QUARTER)..(10 * 3600),
            lag in 0i64..QUARTER,
        ) {
            let earliest = base() + chrono::Duration::seconds(start);
            let now = earliest + chrono::Duration::seconds(span);
            let first = next_schedule("*/15 * * * *", earliest, now, MINUTE).unwrap();
            prop_assert!(first.missed_runs > 0);

            // the triggered run starts shortly after now, before the next occurrence
            let started = now + chrono::Duration::seconds(lag.min((first.next_run - now).num_seconds() - 1).max(0));
            let again = next_schedule("*/15 * * * *", started, started, MINUTE).unwrap();
            prop_assert_eq!(again.missed_runs, 0);
            prop_assert_eq!(again.next_run, first.next_run);
        }
    }
}
