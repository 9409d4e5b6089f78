// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, run, shutdown.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use fs2::FileExt;
use tfa_adapters::{
    ClusterError, DisabledCredentialProvider, GitMirror, JsonCluster, JsonRunStore, SecretDelegate,
    TerraformCli, TracedRepositories, TracedTerraform,
};
use tfa_core::{Config, ConfigError, ModuleKey, RandomRequests, RunStatus, SystemClock};
use tfa_engine::{
    Controller, Engine, PluginCache, PluginCacheError, Reconciler, ReconcilerDeps, RunQueue,
    Runner, RunnerConfig, RunnerDeps,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type Repos = TracedRepositories<GitMirror>;
type Tf = TracedTerraform<TerraformCli>;

/// Engine with the production collaborators (wrapped with tracing)
pub type DaemonEngine = Engine<
    JsonCluster,
    Repos,
    SecretDelegate<JsonCluster>,
    DisabledCredentialProvider,
    JsonRunStore<SystemClock>,
    Tf,
    SystemClock,
>;

pub type DaemonController = Controller<JsonCluster, Repos, SystemClock, RandomRequests>;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Cluster store error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Plugin cache error: {0}")]
    PluginCache(#[from] PluginCacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A started daemon, ready to run until its shutdown token fires
pub struct Daemon {
    config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    lock_file: File,
    engine: DaemonEngine,
    controller: DaemonController,
    queue: mpsc::Receiver<ModuleKey>,
    completions: mpsc::UnboundedReceiver<ModuleKey>,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cancelling this stops new runs and starts the termination grace period
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Drive the controller and engine until shutdown, then release the lock
    pub async fn run(self) -> Result<(), LifecycleError> {
        let Daemon {
            config,
            lock_file,
            engine,
            controller,
            queue,
            completions,
            shutdown,
        } = self;

        let engine = tokio::spawn(engine.run(queue));
        let controller = tokio::spawn(controller.run(completions, shutdown));
        let (engine, controller) = tokio::join!(engine, controller);

        release_lock(&config, lock_file);
        engine?;
        controller?;
        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Take the lock and wire every component from `config`
pub fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.data_root)?;
    let lock_file = acquire_lock(config)?;

    match startup_inner(config) {
        Ok(parts) => Ok(parts.into_daemon(config.clone(), lock_file)),
        Err(e) => {
            release_lock(config, lock_file);
            Err(e)
        }
    }
}

struct Parts {
    engine: DaemonEngine,
    controller: DaemonController,
    queue: mpsc::Receiver<ModuleKey>,
    completions: mpsc::UnboundedReceiver<ModuleKey>,
    shutdown: CancellationToken,
}

impl Parts {
    fn into_daemon(self, config: Config, lock_file: File) -> Daemon {
        Daemon {
            config,
            lock_file,
            engine: self.engine,
            controller: self.controller,
            queue: self.queue,
            completions: self.completions,
            shutdown: self.shutdown,
        }
    }
}

fn startup_inner(config: &Config) -> Result<Parts, LifecycleError> {
    for dir in [
        config.runs_dir(),
        config.mirrors_dir(),
        config.history_dir(),
    ] {
        std::fs::create_dir_all(dir)?;
    }

    let plugin_cache = if config.plugin_cache {
        Some(Arc::new(PluginCache::open(&config.plugin_cache_dir())?))
    } else {
        None
    };

    let cluster = JsonCluster::open(config.cluster_root())?;
    let repos = TracedRepositories::new(GitMirror::new(
        config.mirrors_dir(),
        config.git_path.clone(),
    ));
    let run_status = RunStatus::new();
    let shutdown = CancellationToken::new();
    let (queue, queue_rx) = RunQueue::bounded(config.queue_capacity);
    let (done_tx, done_rx) = mpsc::unbounded_channel();

    let runner = Runner::new(
        RunnerDeps {
            cluster: cluster.clone(),
            repos: repos.clone(),
            delegate: SecretDelegate::new(cluster.clone()),
            credentials: DisabledCredentialProvider::new(),
            history: JsonRunStore::new(config.history_dir(), SystemClock),
            terraform: TracedTerraform::new(TerraformCli::new(&config.terraform_path)),
        },
        RunnerConfig::from_config(config, plugin_cache),
        SystemClock,
        run_status.clone(),
        shutdown.clone(),
    );
    let engine = Engine::new(runner, shutdown.clone()).with_completions(done_tx);

    let reconciler = Reconciler::new(
        ReconcilerDeps {
            cluster,
            repos,
            queue,
            run_status,
        },
        SystemClock,
        RandomRequests,
        config,
    );
    let controller = Controller::new(reconciler, config.resync_interval);

    info!(
        data_root = %config.data_root.display(),
        cluster_root = %config.cluster_root().display(),
        queue_capacity = config.queue_capacity,
        plugin_cache = config.plugin_cache,
        "Daemon started"
    );

    Ok(Parts {
        engine,
        controller,
        queue: queue_rx,
        completions: done_rx,
        shutdown,
    })
}

fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    // Not truncated before locking: the path may belong to a live daemon
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(config.lock_path())?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

fn release_lock(config: &Config, lock_file: File) {
    let path = config.lock_path();
    if let Err(e) = std::fs::remove_file(&path) {
        warn!(path = %path.display(), error = %e, "Failed to remove PID file");
    }
    drop(lock_file);
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
