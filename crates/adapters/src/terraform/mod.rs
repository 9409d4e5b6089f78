// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terraform executable

mod cli;

pub use cli::TerraformCli;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTerraform, TfCall, TfStep, APPLY_OUTPUT, DIFF_OUTPUT, NO_CHANGES_OUTPUT};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Saved plan consumed by `show` and `apply`
pub const PLAN_FILE: &str = "plan.out";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TerraformError {
    #[error("unable to start terraform {command}: {reason}")]
    Spawn { command: String, reason: String },
    #[error("terraform {command} failed with exit code {code:?}")]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

impl TerraformError {
    /// Whatever terraform printed before failing
    pub fn output(&self) -> &str {
        match self {
            TerraformError::Spawn { reason, .. } => reason,
            TerraformError::Failed { output, .. } => output,
        }
    }
}

/// Where and with what environment terraform runs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TfContext {
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanResult {
    pub diff: bool,
    pub output: String,
}

#[async_trait]
pub trait Terraform: Clone + Send + Sync + 'static {
    /// `init` with backend overrides; returns the init output
    async fn init(
        &self,
        ctx: &TfContext,
        backend: &[(String, String)],
    ) -> Result<String, TerraformError>;

    /// `plan` into [`PLAN_FILE`]
    async fn plan(&self, ctx: &TfContext) -> Result<PlanResult, TerraformError>;

    /// Human readable rendering of the saved plan
    async fn show_plan(&self, ctx: &TfContext) -> Result<String, TerraformError>;

    /// Apply the saved plan
    async fn apply(&self, ctx: &TfContext) -> Result<String, TerraformError>;
}
