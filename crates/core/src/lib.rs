// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tfa-core: data model and decision logic for the terraform module reconciler
//!
//! This crate provides:
//! - The `Module`, `Request` and `Run` resources
//! - The run-trigger decision (cron, git polling, pending requests)
//! - The process-wide `RunStatus` set
//! - Retry-with-backoff, summary parsing and controller configuration

pub mod clock;
pub mod config;
pub mod module;
pub mod request;
pub mod retry;
pub mod run;
pub mod run_status;
pub mod schedule;
pub mod summary;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{Config, ConfigError};
pub use module::{
    reason, AwsCredentialRequest, AwsCredentialType, CredentialRequests, EnvVar, EnvVarSource,
    GcpCredentialRequest, KeyRef, Module, ModuleKey, ModuleSpec, ModuleStatus, ObjectMeta,
    OutputStats, State, RUN_REQUEST_ANNOTATION,
};
pub use request::{
    NumberedRequests, PullRequest, RandomRequests, Request, RequestError, RequestIssuer,
    RequestType,
};
pub use retry::{retry_with_backoff, Backoff};
pub use run::Run;
pub use run_status::{RunGuard, RunStatus};
pub use schedule::{decide, next_schedule, Decision, DecisionContext, Schedule, ScheduleError};
