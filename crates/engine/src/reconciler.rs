// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decision loop
//!
//! The [`Reconciler`] gathers the facts [`decide`] needs for one module and
//! acts on the decision. The [`Controller`] drives it from per-module timers,
//! run completions and a periodic resync of every module.

use crate::admission::{ensure_request, AdmissionError};
use crate::queue::{QueueError, RunQueue};
use crate::status::set_errored;
use crate::timers::Timers;
use std::time::{Duration, Instant};
use tfa_adapters::{ClusterApi, Repositories};
use tfa_core::{
    decide, reason, Backoff, Clock, Config, Decision, DecisionContext, Module, ModuleKey,
    RequestIssuer, RunStatus, State,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Retry delay when the module could not be read
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);
/// Retry delay when the run queue had no room
pub const QUEUE_FULL_REQUEUE: Duration = Duration::from_secs(5);

const STALE_RUNNING_MESSAGE: &str = "wrong status found, module is not actually running";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileResult {
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn after(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
        }
    }
}

pub struct ReconcilerDeps<K, R> {
    pub cluster: K,
    pub repos: R,
    pub queue: RunQueue,
    pub run_status: RunStatus,
}

pub struct Reconciler<K, R, C, I> {
    cluster: K,
    repos: R,
    queue: RunQueue,
    run_status: RunStatus,
    clock: C,
    requests: I,
    min_interval: Duration,
    retry: Backoff,
}

impl<K, R, C, I> Reconciler<K, R, C, I>
where
    K: ClusterApi,
    R: Repositories,
    C: Clock,
    I: RequestIssuer,
{
    pub fn new(deps: ReconcilerDeps<K, R>, clock: C, requests: I, config: &Config) -> Self {
        Self {
            cluster: deps.cluster,
            repos: deps.repos,
            queue: deps.queue,
            run_status: deps.run_status,
            clock,
            requests,
            min_interval: config.min_interval_between_runs,
            retry: config.retry.clone(),
        }
    }

    pub async fn reconcile(&self, key: &ModuleKey) -> ReconcileResult {
        let mut module = match self.cluster.get_module(key).await {
            Ok(module) => module,
            Err(e) if e.is_not_found() => {
                tracing::debug!(module = %key, "module gone");
                return ReconcileResult::done();
            }
            Err(e) => {
                tracing::error!(module = %key, error = %e, "unable to fetch terraform module");
                return ReconcileResult::after(ERROR_REQUEUE);
            }
        };
        if module.is_deleting() {
            return ReconcileResult::done();
        }

        let running = self.run_status.contains(key);
        if module.is_running() && !running {
            tracing::warn!(module = %key, "{}", STALE_RUNNING_MESSAGE);
            set_errored(
                &self.cluster,
                key,
                &self.retry,
                reason::UNKNOWN,
                STALE_RUNNING_MESSAGE,
            )
            .await;
            module
                .status
                .set_state(State::Errored, reason::UNKNOWN, STALE_RUNNING_MESSAGE);
        }

        if module.spec.repo_url.trim().is_empty() {
            set_errored(
                &self.cluster,
                key,
                &self.retry,
                reason::SPECS_PARSING_FAILURE,
                "repoURL is required",
            )
            .await;
            return ReconcileResult::done();
        }

        let head_commit = if module.spec.suspend || running {
            String::new()
        } else {
            match self
                .repos
                .hash(&module.spec.repo_url, module.repo_ref(), &module.spec.path)
                .await
            {
                Ok(hash) => hash,
                Err(e) => {
                    let msg = format!("unable to get commit hash: {}", e);
                    tracing::error!(module = %key, error = %e, "unable to get commit hash");
                    set_errored(&self.cluster, key, &self.retry, reason::GIT_FAILURE, &msg).await;
                    return ReconcileResult::after(module.poll_interval());
                }
            }
        };

        let ctx = DecisionContext {
            now: self.clock.now(),
            head_commit: &head_commit,
            running,
            min_interval: self.min_interval,
        };
        let decision = decide(&module, &ctx);
        tracing::trace!(module = %key, ?decision, "decided");
        self.act(&module, decision).await
    }

    async fn act(&self, module: &Module, decision: Decision) -> ReconcileResult {
        let key = module.key();
        match decision {
            Decision::Idle => ReconcileResult::done(),
            Decision::Requeue(delay) => ReconcileResult::after(delay),
            Decision::Dispatch(req) => {
                tracing::debug!(module = %key, request = %req.id, "dispatching pending request");
                self.enqueue(module)
            }
            Decision::Trigger(kind) => {
                let req = self.requests.issue(kind, self.clock.now());
                match ensure_request(&self.cluster, &key, &req, &self.retry).await {
                    Ok(()) => {
                        tracing::info!(module = %key, request = %req.id, %kind, "run triggered");
                        self.enqueue(module)
                    }
                    Err(AdmissionError::RequestAlreadyExists) => {
                        tracing::debug!(module = %key, "request already pending");
                        self.enqueue(module)
                    }
                    Err(e) => {
                        tracing::error!(module = %key, error = %e, "unable to add run request");
                        ReconcileResult::after(module.poll_interval())
                    }
                }
            }
            Decision::Fail(e) => {
                let msg = format!("unable to get next schedule: {}", e);
                tracing::error!(module = %key, error = %e, "unable to get next schedule");
                set_errored(
                    &self.cluster,
                    &key,
                    &self.retry,
                    reason::SPECS_PARSING_FAILURE,
                    &msg,
                )
                .await;
                ReconcileResult::done()
            }
        }
    }

    fn enqueue(&self, module: &Module) -> ReconcileResult {
        match self.queue.enqueue(module.key()) {
            Ok(()) => ReconcileResult::done(),
            Err(QueueError::Full(key)) => {
                tracing::warn!(module = %key, "run queue full, will retry");
                ReconcileResult::after(QUEUE_FULL_REQUEUE)
            }
            Err(QueueError::Closed) => ReconcileResult::done(),
        }
    }

    /// Every module key in the cluster
    pub async fn keys(&self) -> Vec<ModuleKey> {
        match self.cluster.list_modules().await {
            Ok(modules) => modules.iter().map(Module::key).collect(),
            Err(e) => {
                tracing::error!(error = %e, "unable to list modules");
                Vec::new()
            }
        }
    }
}

/// Drives the reconciler until shutdown
pub struct Controller<K, R, C, I> {
    reconciler: Reconciler<K, R, C, I>,
    timers: Timers,
    resync_interval: Duration,
}

impl<K, R, C, I> Controller<K, R, C, I>
where
    K: ClusterApi,
    R: Repositories,
    C: Clock,
    I: RequestIssuer,
{
    pub fn new(reconciler: Reconciler<K, R, C, I>, resync_interval: Duration) -> Self {
        Self {
            reconciler,
            timers: Timers::new(),
            resync_interval,
        }
    }

    /// Evaluate `key` now and arm its timer from the result
    pub async fn reconcile(&mut self, key: ModuleKey) {
        let result = self.reconciler.reconcile(&key).await;
        match result.requeue_after {
            Some(delay) => self.timers.schedule(key, delay, Instant::now()),
            None => self.timers.cancel(&key),
        }
    }

    pub async fn resync(&mut self) {
        let keys = self.reconciler.keys().await;
        tracing::debug!(modules = keys.len(), "resync");
        for key in keys {
            self.reconcile(key).await;
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Returns when `shutdown` fires. Completed runs arriving on
    /// `completions` are re-evaluated immediately.
    pub async fn run(
        mut self,
        mut completions: mpsc::UnboundedReceiver<ModuleKey>,
        shutdown: CancellationToken,
    ) {
        self.resync().await;
        let start = tokio::time::Instant::now() + self.resync_interval;
        let mut resync = tokio::time::interval_at(start, self.resync_interval);
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let deadline = self.timers.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(key) = completions.recv() => self.reconcile(key).await,
                _ = timer => {
                    for key in self.timers.fired(Instant::now()) {
                        self.reconcile(key).await;
                    }
                }
                _ = resync.tick() => self.resync().await,
            }
        }
        tracing::info!("controller stopped");
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
