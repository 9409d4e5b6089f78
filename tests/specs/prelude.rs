//! Shared world for the behavioural scenarios: every collaborator faked,
//! the real reconciler, run queue and engine in between.

#![allow(dead_code)]

pub use chrono::{DateTime, TimeZone, Utc};
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tfa_adapters::{
    FakeCluster, FakeCredentialProvider, FakeDelegate, FakeRepositories, FakeTerraform,
    MemoryRunStore, RunStore, TfStep, DIFF_OUTPUT,
};
pub use tfa_core::{
    reason, Backoff, Config, FakeClock, Module, ModuleKey, ModuleSpec, NumberedRequests,
    ObjectMeta, Request, RequestType, RunStatus, State,
};
pub use tfa_engine::{
    Engine, PluginCache, Reconciler, ReconcilerDeps, RunQueue, Runner, RunnerConfig, RunnerDeps,
    Strongbox,
};

use std::collections::BTreeMap;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const URL: &str = "https://git.example.com/platform.git";
pub const COMMIT: &str = "5e1f0a77";

pub type WorldEngine = Engine<
    FakeCluster,
    FakeRepositories,
    FakeDelegate,
    FakeCredentialProvider,
    MemoryRunStore<FakeClock>,
    FakeTerraform,
    FakeClock,
>;

pub type WorldReconciler = Reconciler<FakeCluster, FakeRepositories, FakeClock, NumberedRequests>;

pub struct World {
    pub cluster: FakeCluster,
    pub repos: FakeRepositories,
    pub terraform: FakeTerraform,
    pub history: MemoryRunStore<FakeClock>,
    pub clock: FakeClock,
    pub run_status: RunStatus,
    pub shutdown: CancellationToken,
    pub queue: RunQueue,
    queue_rx: Option<mpsc::Receiver<ModuleKey>>,
    data: TempDir,
    pub key: ModuleKey,
}

impl World {
    /// One module `platform/network` at path `net`, created 2024-03-01 01:05 UTC
    pub fn new() -> Self {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 1, 5, 0).unwrap();
        let clock = FakeClock::at(created + chrono::Duration::minutes(10));
        let cluster = FakeCluster::new();
        let repos = FakeRepositories::new();
        repos.set_head(URL, "HEAD", COMMIT, "widen vpc cidr");
        repos.add_file(URL, "net/main.tf", "resource \"aws_vpc\" \"main\" {}");

        let mut meta = ObjectMeta::new("platform", "network");
        meta.creation_timestamp = Some(created);
        let module = Module::new(
            meta,
            ModuleSpec {
                repo_url: URL.to_string(),
                path: "net".to_string(),
                ..ModuleSpec::default()
            },
        );
        let key = module.key();
        cluster.insert_module(module);

        let (queue, queue_rx) = RunQueue::bounded(32);
        Self {
            history: MemoryRunStore::with_clock(clock.clone()),
            cluster,
            repos,
            terraform: FakeTerraform::new(),
            clock,
            run_status: RunStatus::new(),
            shutdown: CancellationToken::new(),
            queue,
            queue_rx: Some(queue_rx),
            data: TempDir::new().unwrap(),
            key,
        }
    }

    pub fn module(&self) -> Module {
        self.cluster.module(&self.key).unwrap()
    }

    pub fn update(&self, f: impl FnOnce(&mut Module)) {
        let mut module = self.module();
        f(&mut module);
        self.cluster.insert_module(module);
    }

    pub fn runs_dir(&self) -> std::path::PathBuf {
        self.data.path().join("runs")
    }

    pub fn runs_left(&self) -> usize {
        std::fs::read_dir(self.runs_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn reconciler(&self) -> WorldReconciler {
        let config = Config {
            retry: Backoff::immediate(3),
            ..Config::default()
        };
        Reconciler::new(
            ReconcilerDeps {
                cluster: self.cluster.clone(),
                repos: self.repos.clone(),
                queue: self.queue.clone(),
                run_status: self.run_status.clone(),
            },
            self.clock.clone(),
            NumberedRequests::new("req"),
            &config,
        )
    }

    fn engine(&self) -> WorldEngine {
        let plugin_cache = PluginCache::open(&self.data.path().join("plugin-cache")).unwrap();
        let runner = Runner::new(
            RunnerDeps {
                cluster: self.cluster.clone(),
                repos: self.repos.clone(),
                delegate: FakeDelegate::new(self.cluster.clone()),
                credentials: FakeCredentialProvider::new(),
                history: self.history.clone(),
                terraform: self.terraform.clone(),
            },
            RunnerConfig {
                runs_dir: self.runs_dir(),
                global_env: BTreeMap::new(),
                termination_grace_period: Duration::from_secs(5),
                retry: Backoff::immediate(3),
                strongbox: Strongbox::new(self.data.path().join("strongbox")),
                plugin_cache: Some(Arc::new(plugin_cache)),
            },
            self.clock.clone(),
            self.run_status.clone(),
            self.shutdown.clone(),
        );
        Engine::new(runner, self.shutdown.clone())
    }

    /// Start the engine on the queue; completions arrive on the returned channel
    pub fn start_engine(
        &mut self,
    ) -> (
        mpsc::UnboundedReceiver<ModuleKey>,
        tokio::task::JoinHandle<()>,
    ) {
        let queue = self.queue_rx.take().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = self.engine().with_completions(tx);
        (rx, tokio::spawn(engine.run(queue)))
    }

    /// Wait for `n` finished (or skipped) runs, then stop the engine
    pub async fn finish(
        &self,
        mut done: mpsc::UnboundedReceiver<ModuleKey>,
        handle: tokio::task::JoinHandle<()>,
        n: usize,
    ) {
        for _ in 0..n {
            tokio::time::timeout(Duration::from_secs(10), done.recv())
                .await
                .unwrap()
                .unwrap();
        }
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
    }

    pub fn terraform_inits(&self) -> usize {
        self.terraform
            .steps()
            .iter()
            .filter(|s| **s == TfStep::Init)
            .count()
    }
}
