// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted terraform for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{PlanResult, Terraform, TerraformError, TfContext};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NO_CHANGES_OUTPUT: &str = "No changes. Your infrastructure matches the configuration.";
pub const DIFF_OUTPUT: &str = "Plan: 1 to add, 0 to change, 0 to destroy.";
pub const APPLY_OUTPUT: &str = "Apply complete! Resources: 1 added, 0 changed, 0 destroyed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TfStep {
    Init,
    Plan,
    Show,
    Apply,
}

impl TfStep {
    fn command(self) -> &'static str {
        match self {
            TfStep::Init => "init",
            TfStep::Plan => "plan",
            TfStep::Show => "show",
            TfStep::Apply => "apply",
        }
    }
}

/// Recorded terraform invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TfCall {
    pub step: TfStep,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub backend: Vec<(String, String)>,
}

impl TfCall {
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct FakeTerraformState {
    diff: bool,
    failures: BTreeMap<TfStep, String>,
    delays: BTreeMap<TfStep, Duration>,
    calls: Vec<TfCall>,
}

/// Terraform stand-in with per-step scripted outcomes
#[derive(Clone, Default)]
pub struct FakeTerraform {
    state: Arc<Mutex<FakeTerraformState>>,
}

impl FakeTerraform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeTerraformState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `plan` reports changes
    pub fn set_diff(&self, diff: bool) {
        self.lock().diff = diff;
    }

    /// Fail `step` with exit code 1 and the given output
    pub fn fail(&self, step: TfStep, output: &str) {
        self.lock().failures.insert(step, output.to_string());
    }

    /// Sleep before `step` returns
    pub fn delay(&self, step: TfStep, duration: Duration) {
        self.lock().delays.insert(step, duration);
    }

    pub fn calls(&self) -> Vec<TfCall> {
        self.lock().calls.clone()
    }

    pub fn steps(&self) -> Vec<TfStep> {
        self.lock().calls.iter().map(|c| c.step).collect()
    }

    async fn step(
        &self,
        step: TfStep,
        ctx: &TfContext,
        backend: &[(String, String)],
    ) -> Result<bool, TerraformError> {
        let (delay, failure, diff) = {
            let mut state = self.lock();
            state.calls.push(TfCall {
                step,
                working_dir: ctx.working_dir.clone(),
                env: ctx.env.clone(),
                backend: backend.to_vec(),
            });
            (
                state.delays.get(&step).copied(),
                state.failures.get(&step).cloned(),
                state.diff,
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(output) => Err(TerraformError::Failed {
                command: step.command().to_string(),
                code: Some(1),
                output,
            }),
            None => Ok(diff),
        }
    }
}

#[async_trait]
impl Terraform for FakeTerraform {
    async fn init(
        &self,
        ctx: &TfContext,
        backend: &[(String, String)],
    ) -> Result<String, TerraformError> {
        self.step(TfStep::Init, ctx, backend).await?;
        Ok("Terraform has been successfully initialized!".to_string())
    }

    async fn plan(&self, ctx: &TfContext) -> Result<PlanResult, TerraformError> {
        let diff = self.step(TfStep::Plan, ctx, &[]).await?;
        Ok(PlanResult {
            diff,
            output: String::new(),
        })
    }

    async fn show_plan(&self, ctx: &TfContext) -> Result<String, TerraformError> {
        let diff = self.step(TfStep::Show, ctx, &[]).await?;
        let summary = if diff { DIFF_OUTPUT } else { NO_CHANGES_OUTPUT };
        Ok(format!(
            "Terraform will perform the following actions:\n\n{}\n",
            summary
        ))
    }

    async fn apply(&self, ctx: &TfContext) -> Result<String, TerraformError> {
        self.step(TfStep::Apply, ctx, &[]).await?;
        Ok(format!(
            "aws_s3_bucket.state: Creating...\n\n{}\n",
            APPLY_OUTPUT
        ))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
