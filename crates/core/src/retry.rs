// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded exponential backoff for optimistic-concurrency writes

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Backoff policy shared by status patching and request admission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    pub factor: f64,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Total attempts including the first
    pub attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(5),
            attempts: 5,
        }
    }
}

impl Backoff {
    /// No sleeping between attempts
    pub fn immediate(attempts: u32) -> Self {
        Self {
            initial: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
            attempts,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.factor.max(1.0)).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up. The last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    backoff: &Backoff,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let attempts = backoff.attempts.max(1);
    let mut delay = backoff.initial.min(backoff.max_delay);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                delay = backoff.next_delay(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
