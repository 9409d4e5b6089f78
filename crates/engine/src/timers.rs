// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-module re-evaluation timers

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};
use tfa_core::ModuleKey;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    fire_at: Instant,
    key: ModuleKey,
    seq: u64,
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Min-heap: earliest first
        Reverse(self.fire_at)
            .cmp(&Reverse(other.fire_at))
            .then_with(|| Reverse(self.seq).cmp(&Reverse(other.seq)))
    }
}

/// At most one pending timer per module; rescheduling replaces it
#[derive(Debug, Default)]
pub struct Timers {
    heap: BinaryHeap<Entry>,
    /// Live sequence number per key; heap entries with another seq are stale
    live: HashMap<ModuleKey, u64>,
    next_seq: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `key` after `delay`, replacing any pending timer for it
    pub fn schedule(&mut self, key: ModuleKey, delay: Duration, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(key.clone(), seq);
        self.heap.push(Entry {
            fire_at: now + delay,
            key,
            seq,
        });
    }

    pub fn cancel(&mut self, key: &ModuleKey) {
        self.live.remove(key);
    }

    fn drop_stale(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.live.get(&entry.key) == Some(&entry.seq) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Earliest live deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.drop_stale();
        self.heap.peek().map(|entry| entry.fire_at)
    }

    /// Keys whose timers are due at `now`, earliest first
    pub fn fired(&mut self, now: Instant) -> Vec<ModuleKey> {
        let mut ready = Vec::new();
        loop {
            self.drop_stale();
            let Some(entry) = self.heap.peek() else {
                break;
            };
            if entry.fire_at > now {
                break;
            }
            let Some(entry) = self.heap.pop() else {
                break;
            };
            self.live.remove(&entry.key);
            ready.push(entry.key);
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
