// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run cancellation
//!
//! Two sources cancel a run: its own deadline and the process-wide shutdown
//! signal (after the grace period). Whichever fires first is recorded and
//! decides the reason written to the module status.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tfa_core::reason;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Timeout,
    Shutdown,
}

impl CancelReason {
    /// Status reason recorded for a run stopped this way
    pub fn reason(self) -> &'static str {
        match self {
            CancelReason::Timeout => reason::RUN_TIMED_OUT,
            CancelReason::Shutdown => reason::CONTROLLER_SHUTDOWN,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            CancelReason::Timeout => "terraform run timed out",
            CancelReason::Shutdown => "terraform run interrupted by shutdown",
        }
    }
}

/// Execution context of one run
pub struct RunContext {
    token: CancellationToken,
    shutdown: CancellationToken,
    cause: Arc<OnceLock<CancelReason>>,
    watcher: JoinHandle<()>,
}

impl RunContext {
    /// Must be called within a tokio runtime
    pub fn new(shutdown: &CancellationToken, timeout: Duration, grace: Duration) -> Self {
        let token = CancellationToken::new();
        let cause = Arc::new(OnceLock::new());
        let watcher = tokio::spawn(watch(
            token.clone(),
            shutdown.clone(),
            Arc::clone(&cause),
            timeout,
            grace,
        ));
        Self {
            token,
            shutdown: shutdown.clone(),
            cause,
            watcher,
        }
    }

    /// Shutdown has been signalled; the grace period may still be running
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The source that cancelled this run, if any
    pub fn cause(&self) -> Option<CancelReason> {
        self.cause.get().copied()
    }

    /// Cancel from outside; ignored if a cause is already recorded
    pub fn cancel(&self, why: CancelReason) {
        fire(&self.token, &self.cause, why);
    }

    /// Drive `fut` until it completes or the run is cancelled. The future is
    /// dropped on cancellation, which kills any child process it owns.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.cause().unwrap_or(CancelReason::Shutdown)),
            out = fut => Ok(out),
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn fire(token: &CancellationToken, cause: &OnceLock<CancelReason>, why: CancelReason) {
    if cause.set(why).is_ok() {
        token.cancel();
    }
}

async fn watch(
    token: CancellationToken,
    shutdown: CancellationToken,
    cause: Arc<OnceLock<CancelReason>>,
    timeout: Duration,
    grace: Duration,
) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    tokio::select! {
        _ = &mut deadline => {
            tracing::error!(timeout_secs = timeout.as_secs(), "module run timed out stopping run");
            fire(&token, &cause, CancelReason::Timeout);
        }
        _ = shutdown.cancelled() => {
            tracing::info!(grace_secs = grace.as_secs(), "shutdown signal received waiting for termination grace period");
            tokio::select! {
                _ = &mut deadline => fire(&token, &cause, CancelReason::Timeout),
                _ = tokio::time::sleep(grace) => {
                    tracing::info!("termination grace period over stopping run");
                    fire(&token, &cause, CancelReason::Shutdown);
                }
            }
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
