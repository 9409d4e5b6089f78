// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terraform CLI adapter

use super::{PlanResult, Terraform, TerraformError, TfContext, PLAN_FILE};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;

/// `plan -detailed-exitcode` exit status when changes are present
const PLAN_DIFF_EXIT_CODE: i32 = 2;

/// Runs the terraform binary with a clean environment.
///
/// Child processes are killed when the calling future is dropped, so a
/// cancelled run never leaves terraform behind.
#[derive(Clone)]
pub struct TerraformCli {
    binary: PathBuf,
}

impl TerraformCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn exec(&self, ctx: &TfContext, args: &[String]) -> Result<Output, TerraformError> {
        let command = args.first().cloned().unwrap_or_default();
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&ctx.working_dir)
            .args(args)
            .env_clear()
            .envs(ctx.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        if !ctx.env.iter().any(|(k, _)| k == "PATH") {
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
        }

        tracing::debug!(command, dir = %ctx.working_dir.display(), "running terraform");
        cmd.output().await.map_err(|e| TerraformError::Spawn {
            command,
            reason: e.to_string(),
        })
    }

    async fn exec_ok(&self, ctx: &TfContext, args: &[String]) -> Result<String, TerraformError> {
        let output = self.exec(ctx, args).await?;
        let text = combined(&output);
        if !output.status.success() {
            return Err(TerraformError::Failed {
                command: args.first().cloned().unwrap_or_default(),
                code: output.status.code(),
                output: text,
            });
        }
        Ok(text)
    }
}

fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Arguments for `init`, one `-backend-config` per override
pub fn init_args(backend: &[(String, String)]) -> Vec<String> {
    let mut out = args(&["init", "-input=false", "-no-color", "-upgrade=false"]);
    out.extend(
        backend
            .iter()
            .map(|(k, v)| format!("-backend-config={}={}", k, v)),
    );
    out
}

#[async_trait]
impl Terraform for TerraformCli {
    async fn init(
        &self,
        ctx: &TfContext,
        backend: &[(String, String)],
    ) -> Result<String, TerraformError> {
        self.exec_ok(ctx, &init_args(backend)).await
    }

    async fn plan(&self, ctx: &TfContext) -> Result<PlanResult, TerraformError> {
        let plan_args = args(&[
            "plan",
            "-input=false",
            "-no-color",
            "-detailed-exitcode",
            &format!("-out={}", PLAN_FILE),
        ]);
        let output = self.exec(ctx, &plan_args).await?;
        let text = combined(&output);
        match output.status.code() {
            Some(0) => Ok(PlanResult {
                diff: false,
                output: text,
            }),
            Some(PLAN_DIFF_EXIT_CODE) => Ok(PlanResult {
                diff: true,
                output: text,
            }),
            code => Err(TerraformError::Failed {
                command: "plan".to_string(),
                code,
                output: text,
            }),
        }
    }

    async fn show_plan(&self, ctx: &TfContext) -> Result<String, TerraformError> {
        self.exec_ok(ctx, &args(&["show", "-no-color", PLAN_FILE]))
            .await
    }

    async fn apply(&self, ctx: &TfContext) -> Result<String, TerraformError> {
        self.exec_ok(
            ctx,
            &args(&["apply", "-input=false", "-no-color", PLAN_FILE]),
        )
        .await
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
