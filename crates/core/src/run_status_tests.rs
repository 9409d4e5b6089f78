// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;

#[test]
fn acquire_is_exclusive_until_guard_drops() {
    let status = RunStatus::new();
    let key = ModuleKey::new("ns", "a");

    let guard = status.try_acquire(&key).unwrap();
    assert!(status.contains(&key));
    assert!(status.try_acquire(&key).is_none());

    drop(guard);
    assert!(!status.contains(&key));
    assert!(status.try_acquire(&key).is_some());
}

#[test]
fn keys_are_independent() {
    let status = RunStatus::new();
    let _a = status.try_acquire(&ModuleKey::new("ns", "a")).unwrap();
    let _b = status.try_acquire(&ModuleKey::new("ns", "b")).unwrap();
    assert_eq!(status.len(), 2);
    assert!(status.contains(&ModuleKey::new("ns", "a")));
    assert!(status.contains(&ModuleKey::new("ns", "b")));
    assert!(!status.contains(&ModuleKey::new("other", "a")));
}

#[test]
fn release_reports_whether_key_was_held() {
    let status = RunStatus::new();
    let key = ModuleKey::new("ns", "a");
    assert!(!status.release(&key));

    let guard = status.try_acquire(&key).unwrap();
    assert!(status.release(&key));
    drop(guard);
    assert!(status.is_empty());
}

#[test]
fn concurrent_acquire_admits_exactly_one() {
    const CONTENDERS: usize = 16;
    let status = RunStatus::new();
    let key = ModuleKey::new("ns", "contended");
    let winners = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let status = status.clone();
            let key = key.clone();
            let winners = Arc::clone(&winners);
            let attempts = Arc::clone(&attempts);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                let guard = status.try_acquire(&key);
                attempts.fetch_add(1, Ordering::SeqCst);
                if guard.is_some() {
                    winners.fetch_add(1, Ordering::SeqCst);
                    // hold until every contender has tried
                    while attempts.load(Ordering::SeqCst) < CONTENDERS {
                        std::thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(status.is_empty());
}
