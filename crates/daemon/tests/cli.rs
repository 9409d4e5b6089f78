// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-level tests for the tfad binary

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Stdio};
use tempfile::TempDir;

fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
    let path = dir.join("tfad.toml");
    let text = format!(
        "data_root = \"{}\"\nlog_path = \"{}\"\nplugin_cache = false\n{}",
        dir.join("data").display(),
        dir.join("logs/tfad.log").display(),
        extra
    );
    std::fs::write(&path, text).expect("Failed to write config");
    path
}

/// Start tfad and wait until it reports READY
fn spawn_daemon(config: &Path) -> Child {
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("tfad"))
        .arg(config)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn tfad");

    let stdout = child.stdout.take().expect("stdout is piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("Failed to read tfad stdout");
    assert_eq!(line.trim(), "READY");
    child
}

fn terminate(child: &Child) {
    let status = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .expect("Failed to run kill");
    assert!(status.success());
}

#[test]
fn version_flag_prints_version() {
    Command::cargo_bin("tfad")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("tfad "));
}

#[test]
fn missing_config_file_fails() {
    let temp = TempDir::new().unwrap();

    Command::cargo_bin("tfad")
        .unwrap()
        .arg(temp.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml"));
}

#[test]
fn invalid_config_fails_before_starting() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "queue_capacity = 0\n");

    Command::cargo_bin("tfad")
        .unwrap()
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "queue_capacity must be at least 1",
        ));

    assert!(!temp.path().join("data").exists());
}

#[test]
fn sigterm_stops_daemon_and_releases_lock() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "");
    let lock = temp.path().join("data/tfad.pid");

    let mut child = spawn_daemon(&config);
    assert!(lock.exists());

    terminate(&child);
    let status = child.wait().unwrap();

    assert!(status.success());
    assert!(!lock.exists());
    let log = std::fs::read_to_string(temp.path().join("logs/tfad.log")).unwrap();
    assert!(log.contains("Received SIGTERM"));
}

#[test]
fn second_daemon_on_same_data_root_is_refused() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "");
    let mut first = spawn_daemon(&config);

    Command::cargo_bin("tfad")
        .unwrap()
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("LockFailed"));

    terminate(&first);
    assert!(first.wait().unwrap().success());
}
