// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution of a single module run
//!
//! A run claims the module in [`RunStatus`], consumes its pending request,
//! prepares a private checkout with resolved env and vars, then drives
//! terraform through init, plan and (unless plan-only) apply. Each phase
//! transition is written to the module status; the finished [`Run`] is
//! persisted to history exactly once.

use crate::admission::{remove_current_request, remove_request};
use crate::cancel::{CancelReason, RunContext};
use crate::delegation::{fetch_env_vars, merge_env};
use crate::error::PrepareError;
use crate::plugin_cache::PluginCache;
use crate::status::patch_module_status;
use crate::strongbox::{Strongbox, StrongboxKeys};
use crate::workdir::WorkDir;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tfa_adapters::{
    ClusterApi, CredentialProvider, Credentials, Delegate, Repositories, RunStore, Terraform,
    TfContext,
};
use tfa_core::summary::{apply_summary, plan_summary};
use tfa_core::{
    reason, Backoff, Clock, Config, Module, ModuleKey, OutputStats, Request, Run, RunStatus, State,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How a call to [`Runner::start`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Terraform ran and the module is `Ready`
    Completed,
    /// The run ended `Errored`
    Failed,
    /// Nothing ran: the module was busy, gone, or had no usable request
    Skipped,
}

/// Collaborators a runner drives
#[derive(Clone)]
pub struct RunnerDeps<K, R, D, P, H, T> {
    pub cluster: K,
    pub repos: R,
    pub delegate: D,
    pub credentials: P,
    pub history: H,
    pub terraform: T,
}

/// Runner settings taken from the controller config
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub runs_dir: PathBuf,
    pub global_env: BTreeMap<String, String>,
    pub termination_grace_period: Duration,
    pub retry: Backoff,
    pub strongbox: Strongbox,
    pub plugin_cache: Option<Arc<PluginCache>>,
}

impl RunnerConfig {
    pub fn from_config(config: &Config, plugin_cache: Option<Arc<PluginCache>>) -> Self {
        Self {
            runs_dir: config.runs_dir(),
            global_env: config.global_env.clone(),
            termination_grace_period: config.termination_grace_period,
            retry: config.retry.clone(),
            strongbox: Strongbox::new(&config.strongbox_path),
            plugin_cache,
        }
    }
}

/// Final state of a run and the status fields it leaves behind
#[derive(Debug)]
struct Ending {
    state: State,
    reason: &'static str,
    message: String,
    drift_info: Option<OutputStats>,
    apply_info: Option<OutputStats>,
}

impl Ending {
    fn ready(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            state: State::Ready,
            reason,
            message: message.into(),
            drift_info: None,
            apply_info: None,
        }
    }

    fn failed(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            state: State::Errored,
            ..Self::ready(reason, message)
        }
    }

    fn cancelled(cause: CancelReason) -> Self {
        Self::failed(cause.reason(), cause.message())
    }

    fn prepare(context: &str, err: PrepareError) -> Self {
        Self::failed(err.reason(), format!("{}: {}", context, err))
    }

    fn with_drift(mut self, info: OutputStats) -> Self {
        self.drift_info = Some(info);
        self
    }

    fn with_apply(mut self, info: OutputStats) -> Self {
        self.apply_info = Some(info);
        self
    }
}

/// Everything terraform needs once the checkout is prepared
struct Prepared {
    env: BTreeMap<String, String>,
    backend: Vec<(String, String)>,
    vars: BTreeMap<String, String>,
    keys: StrongboxKeys,
}

pub struct Runner<K, R, D, P, H, T, C: Clock> {
    deps: RunnerDeps<K, R, D, P, H, T>,
    config: RunnerConfig,
    clock: C,
    run_status: RunStatus,
    shutdown: CancellationToken,
}

impl<K, R, D, P, H, T, C> Runner<K, R, D, P, H, T, C>
where
    K: ClusterApi,
    R: Repositories,
    D: Delegate,
    P: CredentialProvider,
    H: RunStore,
    T: Terraform,
    C: Clock,
{
    pub fn new(
        deps: RunnerDeps<K, R, D, P, H, T>,
        config: RunnerConfig,
        clock: C,
        run_status: RunStatus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            deps,
            config,
            clock,
            run_status,
            shutdown,
        }
    }

    pub fn run_status(&self) -> &RunStatus {
        &self.run_status
    }

    /// Run the module's pending request, if it can start
    pub async fn start(&self, key: &ModuleKey) -> RunOutcome {
        let Some(_guard) = self.run_status.try_acquire(key) else {
            tracing::warn!(module = %key, "skipping run request as another run is in progress on this module");
            return RunOutcome::Skipped;
        };

        let module = match self.deps.cluster.get_module(key).await {
            Ok(module) => module,
            Err(e) if e.is_not_found() => {
                tracing::debug!(module = %key, "module deleted before its run started");
                return RunOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(module = %key, error = %e, "unable to fetch terraform module");
                return RunOutcome::Skipped;
            }
        };

        let Some(req) = self.take_request(&module).await else {
            return RunOutcome::Skipped;
        };

        let ctx = RunContext::new(
            &self.shutdown,
            module.run_timeout(),
            self.config.termination_grace_period,
        );
        let span = tracing::info_span!(
            "run",
            module = %key,
            request = %req.id,
            kind = %req.kind,
        );
        self.execute(&module, req, &ctx).instrument(span).await
    }

    /// Read, validate and remove the pending request
    async fn take_request(&self, module: &Module) -> Option<Request> {
        let key = module.key();
        let backoff = &self.config.retry;
        let Some(req) = module.pending_request() else {
            if module.has_request_annotation() {
                if let Err(e) = remove_current_request(&self.deps.cluster, &key, backoff).await {
                    tracing::error!(module = %key, error = %e, "unable to remove undecodable run request");
                }
            } else {
                tracing::debug!(module = %key, "no pending run request");
            }
            return None;
        };

        if let Err(e) = req.validate() {
            tracing::warn!(module = %key, request = %req.id, error = %e, "dropping invalid run request");
            if let Err(e) = remove_current_request(&self.deps.cluster, &key, backoff).await {
                tracing::error!(module = %key, error = %e, "unable to remove invalid run request");
            }
            return None;
        }

        if let Err(e) = remove_request(&self.deps.cluster, &key, &req, backoff).await {
            tracing::error!(module = %key, request = %req.id, error = %e, "unable to remove run request");
            return None;
        }
        Some(req)
    }

    async fn execute(&self, module: &Module, req: Request, ctx: &RunContext) -> RunOutcome {
        let key = module.key();
        let plan_only = req.is_plan_only(module);
        let repo_ref = req.repo_ref(module).to_string();
        let mut run = Run::new(key.clone(), req, self.clock.now(), plan_only, repo_ref);

        let ending = match self.attempt(module, &mut run, ctx).await {
            Ok(ending) | Err(ending) => ending,
        };
        let finished_at = self.clock.now();

        if ending.state == State::Errored {
            run.summary = ending.message.clone();
            run.output = format!("{}\n{}", ending.message, run.output);
            tracing::error!(reason = ending.reason, message = %ending.message, "run failed");
        } else {
            tracing::info!(reason = ending.reason, summary = %run.summary, "run finished");
        }

        if !run.request.is_pr() {
            self.write_final_status(&key, &run, &ending, finished_at)
                .await;
        }

        let outcome = match ending.state {
            State::Ready => RunOutcome::Completed,
            _ => RunOutcome::Failed,
        };
        let run = run.finish(ending.state, ending.reason, finished_at);
        self.save(&run).await;
        tracing::info!(
            duration_ms = run.duration.as_millis() as u64,
            success = outcome == RunOutcome::Completed,
            "run completed"
        );
        outcome
    }

    /// Drive the run to its ending; both arms carry the ending so `?` can
    /// short-circuit on any failure
    async fn attempt(
        &self,
        module: &Module,
        run: &mut Run,
        ctx: &RunContext,
    ) -> Result<Ending, Ending> {
        let key = module.key();
        let url = &module.spec.repo_url;
        let path = &module.spec.path;

        run.commit_hash = guarded(ctx, self.deps.repos.hash(url, &run.repo_ref, path))
            .await?
            .map_err(|e| {
                Ending::failed(
                    reason::GIT_FAILURE,
                    format!("unable to get commit hash: {}", e),
                )
            })?;
        run.commit_msg = guarded(ctx, self.deps.repos.log_message(url, &run.repo_ref, path))
            .await?
            .map_err(|e| {
                Ending::failed(
                    reason::GIT_FAILURE,
                    format!("unable to get commit log subject: {}", e),
                )
            })?;

        if ctx.shutdown_requested() {
            return Err(Ending::failed(
                reason::CONTROLLER_SHUTDOWN,
                "terraform run interrupted as runner is shutting down",
            ));
        }

        self.set_started(module, run).await?;

        let prepared = guarded(ctx, self.prepare(module)).await??;

        let mut workdir = WorkDir::create(&self.config.runs_dir, &key)
            .map_err(|e| Ending::prepare("unable to create working directory", e))?;
        guarded(
            ctx,
            self.deps
                .repos
                .clone_into(url, workdir.root(), &run.repo_ref, &[], true),
        )
        .await?
        .map_err(|e| Ending::prepare("unable to checkout module", PrepareError::Checkout(e)))?;
        workdir
            .enter(path)
            .map_err(|e| Ending::prepare("unable to checkout module", e))?;
        guarded(
            ctx,
            self.config
                .strongbox
                .ensure_decryption(workdir.working_dir(), &prepared.keys),
        )
        .await?
        .map_err(|e| Ending::prepare("unable to decrypt module sources", e))?;
        workdir
            .write_vars(&prepared.vars)
            .map_err(|e| Ending::prepare("unable to write vars", e))?;

        let run_cache = self.new_run_cache().await;
        let tf = TfContext {
            working_dir: workdir.working_dir().to_path_buf(),
            env: workdir.run_env(&prepared.env, run_cache.as_ref().map(TempDir::path)),
        };
        let ending = self
            .terraform(module, run, ctx, &tf, &prepared.backend)
            .await;
        self.release_run_cache(run_cache).await;
        if let Err(e) = workdir.close() {
            tracing::warn!(error = %e, "unable to remove working directory");
        }
        ending
    }

    /// Delegation, env, vars and credentials
    async fn prepare(&self, module: &Module) -> Result<Prepared, Ending> {
        let namespace = &module.metadata.namespace;
        let token = self
            .deps
            .delegate
            .delegate_token(module)
            .await
            .map_err(|e| Ending::prepare("unable to get service account token", e.into()))?;
        let client = self
            .deps
            .delegate
            .setup_delegation(namespace, &token)
            .await
            .map_err(|e| Ending::prepare("unable to create delegated client", e.into()))?;

        let backend = fetch_env_vars(&client, namespace, &module.spec.backend)
            .await
            .map_err(|e| Ending::prepare("unable to get backend config", e))?;
        let module_env = fetch_env_vars(&client, namespace, &module.spec.env)
            .await
            .map_err(|e| Ending::prepare("unable to get envs", e))?;
        let vars = fetch_env_vars(&client, namespace, &module.spec.var)
            .await
            .map_err(|e| Ending::prepare("unable to get vars", e))?;

        let credentials = match module
            .spec
            .credential_requests
            .as_ref()
            .filter(|r| !r.is_empty())
        {
            Some(requests) => self
                .deps
                .credentials
                .generate_creds(&token, &module.key(), requests)
                .await
                .map_err(|e| Ending::prepare("unable to generate credentials", e.into()))?,
            None => Credentials::default(),
        };

        let mut env = merge_env(&self.config.global_env, module_env, &credentials);
        let keys = StrongboxKeys::take_from(&mut env);
        Ok(Prepared {
            env,
            backend: backend.into_iter().collect(),
            vars,
            keys,
        })
    }

    /// init, plan and apply in the prepared working dir
    async fn terraform(
        &self,
        module: &Module,
        run: &mut Run,
        ctx: &RunContext,
        tf: &TfContext,
        backend: &[(String, String)],
    ) -> Result<Ending, Ending> {
        let key = module.key();
        let terraform = &self.deps.terraform;

        match guarded(ctx, terraform.init(tf, backend)).await? {
            Ok(output) => run.init_output = output,
            Err(e) => {
                run.init_output = e.output().to_string();
                return Err(Ending::failed(
                    reason::INITIALISE_FAILED,
                    format!("unable to init module: {}", e),
                ));
            }
        }
        tracing::info!("initialised successfully");
        self.set_stage(run, reason::INITIALISED, "planning").await;

        if ctx.shutdown_requested() {
            return Err(Ending::failed(
                reason::CONTROLLER_SHUTDOWN,
                "unable to plan module: terraform run interrupted as runner is shutting down",
            ));
        }

        let plan = match guarded(ctx, terraform.plan(tf)).await? {
            Ok(plan) => plan,
            Err(e) => {
                run.output = e.output().to_string();
                let drift = OutputStats::new(self.clock.now(), &run.commit_hash, e.output());
                return Err(Ending::failed(
                    reason::PLAN_FAILED,
                    format!("unable to plan module: {}", e),
                )
                .with_drift(drift));
            }
        };
        run.diff_detected = plan.diff;

        let shown = guarded(ctx, terraform.show_plan(tf)).await?.map_err(|e| {
            Ending::failed(
                reason::PLAN_FAILED,
                format!("unable to get saved plan: {}", e),
            )
        })?;
        let mut summary = plan_summary(&shown);
        if summary.is_empty() {
            summary = plan_summary(&plan.output);
        }
        tracing::info!(status = %summary, diff = plan.diff, "planned");
        run.summary = summary.clone();
        run.output = shown;
        let drift = OutputStats::new(self.clock.now(), &run.commit_hash, run.output.clone());

        if !plan.diff {
            return Ok(Ending::ready(reason::NO_DRIFT_DETECTED, summary).with_drift(drift));
        }
        if run.plan_only {
            return Ok(Ending::ready(
                reason::PLAN_ONLY_DRIFT_DETECTED,
                format!("PlanOnly/{}", summary),
            )
            .with_drift(drift));
        }

        if ctx.shutdown_requested() {
            return Err(Ending::failed(
                reason::CONTROLLER_SHUTDOWN,
                "unable to apply module: terraform run interrupted as runner is shutting down",
            )
            .with_drift(drift));
        }
        self.set_stage(
            run,
            reason::DRIFT_DETECTED,
            &format!("applying: {}", summary),
        )
        .await;

        let applied = match guarded(ctx, terraform.apply(tf)).await {
            Ok(result) => result,
            Err(cancelled) => return Err(cancelled.with_drift(drift)),
        };
        match applied {
            Ok(output) => {
                run.append_output(&output);
                run.applied = true;
                run.summary = apply_summary(&output);
                tracing::info!(status = %run.summary, module = %key, "applied");
                let info = OutputStats::new(self.clock.now(), &run.commit_hash, output);
                Ok(Ending::ready(reason::APPLIED, run.summary.clone())
                    .with_drift(drift)
                    .with_apply(info))
            }
            Err(e) => {
                run.append_output(e.output());
                let info = OutputStats::new(self.clock.now(), &run.commit_hash, e.output());
                Err(Ending::failed(
                    reason::APPLY_FAILED,
                    format!("unable to apply module: {}", e),
                )
                .with_drift(drift)
                .with_apply(info))
            }
        }
    }

    async fn set_started(&self, module: &Module, run: &Run) -> Result<(), Ending> {
        tracing::info!(commit = %run.commit_hash, plan_only = run.plan_only, "preparing for TF run");
        if run.request.is_pr() {
            return Ok(());
        }
        let generation = module.metadata.generation;
        let kind = run.request.kind;
        patch_module_status(
            &self.deps.cluster,
            &module.key(),
            &self.config.retry,
            |status| {
                status.set_state(
                    State::Running,
                    reason::RUN_TRIGGERED,
                    "preparing for TF run",
                );
                status.observed_generation = generation;
                status.last_run_type = Some(kind);
                status.run_started_at = Some(run.started_at);
                status.run_finished_at = None;
                status.run_commit_hash = run.commit_hash.clone();
                status.run_commit_msg = run.commit_msg.clone();
            },
        )
        .await
        .map(|_| ())
        .map_err(|e| {
            Ending::failed(
                reason::RUN_PREPARATION_FAILED,
                format!("unable to set run starting status: {}", e),
            )
        })
    }

    /// Progress message while still running; a lost write is only logged
    async fn set_stage(&self, run: &Run, reason: &'static str, message: &str) {
        if run.request.is_pr() {
            return;
        }
        let result = patch_module_status(
            &self.deps.cluster,
            &run.module,
            &self.config.retry,
            |status| {
                status.set_state(State::Running, reason, message);
            },
        )
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "unable to update run progress");
        }
    }

    async fn write_final_status(
        &self,
        key: &ModuleKey,
        run: &Run,
        ending: &Ending,
        finished_at: DateTime<Utc>,
    ) {
        let result = patch_module_status(&self.deps.cluster, key, &self.config.retry, |status| {
            status.set_state(ending.state, ending.reason, &ending.message);
            status.run_finished_at = Some(finished_at);
            if let Some(info) = &ending.drift_info {
                status.last_drift_info = info.clone();
            }
            if let Some(info) = &ending.apply_info {
                status.last_apply_info = info.clone();
            }
            if run.applied {
                status.last_applied_at = Some(finished_at);
                status.last_applied_commit_hash = run.commit_hash.clone();
            }
        })
        .await;
        if let Err(e) = result {
            tracing::error!(reason = ending.reason, error = %e, "unable to set finished status");
        }
    }

    async fn save(&self, run: &Run) {
        let history = &self.deps.history;
        let result = if run.request.is_pr() {
            history.set_pr_run(run).await
        } else {
            let last = history.set_default_last_run(run).await;
            if last.is_ok() && run.diff_detected && !run.plan_only {
                history.set_default_apply(run).await
            } else {
                last
            }
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "unable to store run details");
        }
    }

    async fn new_run_cache(&self) -> Option<TempDir> {
        let cache = Arc::clone(self.config.plugin_cache.as_ref()?);
        match tokio::task::spawn_blocking(move || cache.new_run_cache()).await {
            Ok(Ok(dir)) => Some(dir),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "running without plugin cache");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "running without plugin cache");
                None
            }
        }
    }

    async fn release_run_cache(&self, dir: Option<TempDir>) {
        let (Some(cache), Some(dir)) = (self.config.plugin_cache.as_ref(), dir) else {
            return;
        };
        let cache = Arc::clone(cache);
        if let Err(e) = tokio::task::spawn_blocking(move || cache.done(dir)).await {
            tracing::warn!(error = %e, "plugin cache merge task failed");
        }
    }
}

/// Await `fut` unless the run is cancelled first
async fn guarded<F: Future>(ctx: &RunContext, fut: F) -> Result<F::Output, Ending> {
    ctx.run(fut).await.map_err(Ending::cancelled)
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
