// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Machine-readable status reasons

pub const RUN_TRIGGERED: &str = "RunTriggered";
pub const INITIALISED: &str = "Initialised";
pub const NO_DRIFT_DETECTED: &str = "NoDriftDetected";
pub const DRIFT_DETECTED: &str = "DriftDetected";
pub const PLAN_ONLY_DRIFT_DETECTED: &str = "PlanOnlyDriftDetected";
pub const APPLIED: &str = "Applied";

pub const SPECS_PARSING_FAILURE: &str = "SpecsParsingFailure";
pub const GIT_FAILURE: &str = "GitFailure";
pub const DELEGATION_FAILED: &str = "DelegationFailed";
pub const RUN_PREPARATION_FAILED: &str = "RunPreparationFailed";
pub const INITIALISE_FAILED: &str = "InitialiseFailed";
pub const PLAN_FAILED: &str = "PlanFailed";
pub const APPLY_FAILED: &str = "ApplyFailed";
pub const RUN_TIMED_OUT: &str = "RunTimedOut";
pub const CONTROLLER_SHUTDOWN: &str = "ControllerShutdown";
pub const UNKNOWN: &str = "Unknown";
