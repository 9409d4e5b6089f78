// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-trigger decision
//!
//! [`next_schedule`] turns a cron expression plus the time of the last run
//! into a missed-run count and the next occurrence. [`decide`] combines that
//! with the module's suspend flag, run state, pending request and git head to
//! produce the single action the reconciler takes for a module.

use crate::module::Module;
use crate::request::{Request, RequestType};
use chrono::{DateTime, Utc};
use croner::Cron;
use std::time::Duration;
use thiserror::Error;

/// Missed occurrences beyond this abort the evaluation
pub const MAX_MISSED_RUNS: u32 = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid schedule {expr:?}: {reason}")]
    InvalidSchedule { expr: String, reason: String },
    #[error(
        "schedule {expr:?} runs every {}, minimum allowed interval is {}",
        humantime::format_duration(*.interval),
        humantime::format_duration(*.minimum)
    )]
    ScheduleTooFrequent {
        expr: String,
        interval: Duration,
        minimum: Duration,
    },
    #[error("more than {MAX_MISSED_RUNS} missed runs for schedule {expr:?}, check clock skew")]
    TooManyMissedRuns { expr: String },
}

/// Outcome of evaluating a cron schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub missed_runs: u32,
    pub next_run: DateTime<Utc>,
}

fn parse(expr: &str) -> Result<Cron, ScheduleError> {
    Cron::new(expr)
        .parse()
        .map_err(|e| ScheduleError::InvalidSchedule {
            expr: expr.to_string(),
            reason: e.to_string(),
        })
}

fn next_after(cron: &Cron, expr: &str, t: &DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    cron.find_next_occurrence(t, false)
        .map_err(|e| ScheduleError::InvalidSchedule {
            expr: expr.to_string(),
            reason: e.to_string(),
        })
}

/// Count occurrences in `(earliest, now]` and find the first one after `now`
pub fn next_schedule(
    expr: &str,
    earliest: DateTime<Utc>,
    now: DateTime<Utc>,
    min_interval: Duration,
) -> Result<Schedule, ScheduleError> {
    let cron = parse(expr)?;

    if earliest > now {
        return Ok(Schedule {
            missed_runs: 0,
            next_run: next_after(&cron, expr, &now)?,
        });
    }

    let t1 = next_after(&cron, expr, &earliest)?;
    let t2 = next_after(&cron, expr, &t1)?;
    let interval = (t2 - t1).to_std().unwrap_or(Duration::ZERO);
    if interval < Duration::from_secs(1) {
        return Err(ScheduleError::InvalidSchedule {
            expr: expr.to_string(),
            reason: "interval between runs is less than a second".to_string(),
        });
    }
    if interval < min_interval {
        return Err(ScheduleError::ScheduleTooFrequent {
            expr: expr.to_string(),
            interval,
            minimum: min_interval,
        });
    }

    // O(missed) walk, bounded by MAX_MISSED_RUNS
    let mut missed_runs = 0;
    let mut next_run = t1;
    while next_run <= now {
        missed_runs += 1;
        if missed_runs > MAX_MISSED_RUNS {
            return Err(ScheduleError::TooManyMissedRuns {
                expr: expr.to_string(),
            });
        }
        next_run = next_after(&cron, expr, &next_run)?;
    }

    Ok(Schedule {
        missed_runs,
        next_run,
    })
}

/// Later of creation and the last run start; missed runs are counted from here
pub fn earliest_time(module: &Module) -> Option<DateTime<Utc>> {
    match (
        module.metadata.creation_timestamp,
        module.status.run_started_at,
    ) {
        (Some(created), Some(started)) => Some(created.max(started)),
        (created, started) => created.or(started),
    }
}

/// Facts about a module gathered by the reconciler before deciding
#[derive(Clone, Debug)]
pub struct DecisionContext<'a> {
    pub now: DateTime<Utc>,
    /// Latest commit touching the module path
    pub head_commit: &'a str,
    /// Whether the engine currently holds the module
    pub running: bool,
    pub min_interval: Duration,
}

/// The single action to take for a module
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do; a status change will bring the module back
    Idle,
    /// A request is already pending; hand it to the run queue
    Dispatch(Request),
    /// Admit a new request of this type
    Trigger(RequestType),
    /// Evaluate again after this long
    Requeue(Duration),
    /// The schedule is unusable until the spec is corrected
    Fail(ScheduleError),
}

pub fn decide(module: &Module, ctx: &DecisionContext<'_>) -> Decision {
    if module.spec.suspend || module.is_deleting() || ctx.running || module.is_running() {
        return Decision::Idle;
    }

    if let Some(req) = module.pending_request() {
        return Decision::Dispatch(req);
    }

    if !ctx.head_commit.is_empty() && ctx.head_commit != module.status.run_commit_hash {
        return Decision::Trigger(RequestType::PollingRun);
    }

    let poll_interval = module.poll_interval();
    let Some(expr) = module.schedule() else {
        return Decision::Requeue(poll_interval);
    };

    let earliest = earliest_time(module).unwrap_or(ctx.now);
    match next_schedule(expr, earliest, ctx.now, ctx.min_interval) {
        Err(e) => Decision::Fail(e),
        Ok(schedule) if schedule.missed_runs > 0 => Decision::Trigger(RequestType::ScheduledRun),
        Ok(schedule) => {
            let until_next = (schedule.next_run - ctx.now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            Decision::Requeue(until_next.min(poll_interval))
        }
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
