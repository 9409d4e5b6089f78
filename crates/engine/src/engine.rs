// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run queue consumer

use crate::runner::{RunOutcome, Runner};
use std::sync::Arc;
use tfa_adapters::{ClusterApi, CredentialProvider, Delegate, Repositories, RunStore, Terraform};
use tfa_core::{Clock, ModuleKey};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Spawns one task per queued module and waits for them on shutdown
pub struct Engine<K, R, D, P, H, T, C: Clock> {
    runner: Arc<Runner<K, R, D, P, H, T, C>>,
    shutdown: CancellationToken,
    completed: Option<mpsc::UnboundedSender<ModuleKey>>,
}

impl<K, R, D, P, H, T, C> Engine<K, R, D, P, H, T, C>
where
    K: ClusterApi,
    R: Repositories,
    D: Delegate,
    P: CredentialProvider,
    H: RunStore,
    T: Terraform,
    C: Clock,
{
    pub fn new(runner: Runner<K, R, D, P, H, T, C>, shutdown: CancellationToken) -> Self {
        Self {
            runner: Arc::new(runner),
            shutdown,
            completed: None,
        }
    }

    /// Report every finished (or skipped) key on `tx`
    pub fn with_completions(mut self, tx: mpsc::UnboundedSender<ModuleKey>) -> Self {
        self.completed = Some(tx);
        self
    }

    /// Consume the queue until shutdown or until every sender is gone, then
    /// wait for in-flight runs. Runs observe shutdown through their own
    /// context, so this returns within the termination grace period.
    pub async fn run(self, mut queue: mpsc::Receiver<ModuleKey>) {
        let mut tasks: JoinSet<(ModuleKey, RunOutcome)> = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested, no longer taking runs");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_joined(joined),
                key = queue.recv() => match key {
                    Some(key) => self.spawn(&mut tasks, key),
                    None => break,
                },
            }
        }
        queue.close();

        if !tasks.is_empty() {
            tracing::info!(in_flight = tasks.len(), "waiting for in-flight runs");
        }
        while let Some(joined) = tasks.join_next().await {
            log_joined(joined);
        }
        tracing::info!("engine stopped");
    }

    fn spawn(&self, tasks: &mut JoinSet<(ModuleKey, RunOutcome)>, key: ModuleKey) {
        let runner = Arc::clone(&self.runner);
        let completed = self.completed.clone();
        tracing::debug!(module = %key, "starting run task");
        tasks.spawn(async move {
            let outcome = runner.start(&key).await;
            if let Some(tx) = completed {
                // receiver gone means the controller has stopped
                let _ = tx.send(key.clone());
            }
            (key, outcome)
        });
    }
}

fn log_joined(joined: Result<(ModuleKey, RunOutcome), tokio::task::JoinError>) {
    match joined {
        Ok((key, outcome)) => tracing::debug!(module = %key, ?outcome, "run task finished"),
        Err(e) => tracing::error!(error = %e, "run task panicked"),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
