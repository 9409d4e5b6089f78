// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Terraform module run engine: admission, the decision loop, the run queue
//! and the runner that drives terraform

mod admission;
mod cancel;
mod delegation;
mod engine;
mod error;
pub mod plugin_cache;
mod queue;
mod reconciler;
mod runner;
mod status;
pub mod strongbox;
mod timers;
mod workdir;

pub use admission::{ensure_request, remove_current_request, remove_request, AdmissionError};
pub use cancel::{CancelReason, RunContext};
pub use delegation::{fetch_env_vars, merge_env};
pub use engine::Engine;
pub use error::PrepareError;
pub use plugin_cache::{PluginCache, PluginCacheError};
pub use queue::{QueueError, RunQueue};
pub use reconciler::{
    Controller, ReconcileResult, Reconciler, ReconcilerDeps, ERROR_REQUEUE, QUEUE_FULL_REQUEUE,
};
pub use runner::{RunOutcome, Runner, RunnerConfig, RunnerDeps};
pub use status::{patch_module_status, set_errored, StatusError};
pub use strongbox::{Strongbox, StrongboxKeys};
pub use timers::Timers;
pub use workdir::{WorkDir, TFVARS_FILE};
