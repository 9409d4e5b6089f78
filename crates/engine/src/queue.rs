// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded handoff of module keys from the reconciler to the engine

use tfa_core::ModuleKey;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("run queue is full, {0} not queued")]
    Full(ModuleKey),
    #[error("run queue is closed")]
    Closed,
}

/// Sending half, cloned into every trigger source
#[derive(Clone, Debug)]
pub struct RunQueue {
    tx: mpsc::Sender<ModuleKey>,
}

impl RunQueue {
    /// Create a queue holding at most `capacity` undelivered keys
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ModuleKey>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting; a full queue is reported so the caller can requeue
    pub fn enqueue(&self, key: ModuleKey) -> Result<(), QueueError> {
        self.tx.try_send(key).map_err(|e| match e {
            mpsc::error::TrySendError::Full(key) => QueueError::Full(key),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
