// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

/// Script recording each invocation as `HOME|args` in `calls.log` next to it
fn fake_strongbox(bin_dir: &Path, fail_on: &str) -> PathBuf {
    let path = bin_dir.join("strongbox");
    let log = bin_dir.join("calls.log");
    std::fs::write(
        &path,
        format!(
            "#!/bin/sh\n\
             echo \"$HOME|$*\" >> {log}\n\
             case \"$1\" in {fail_on}) echo 'bad keyring' >&2; exit 1;; esac\n\
             exit 0\n",
            log = log.display(),
            fail_on = fail_on,
        ),
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn calls(bin_dir: &Path) -> Vec<String> {
    std::fs::read_to_string(bin_dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}

#[test]
fn keys_are_taken_out_of_the_env() {
    let mut env = BTreeMap::from([
        (KEYRING_ENV.to_string(), "keyring-data".to_string()),
        (IDENTITY_ENV.to_string(), String::new()),
        ("REGION".to_string(), "eu".to_string()),
    ]);
    let keys = StrongboxKeys::take_from(&mut env);
    assert_eq!(keys.keyring.as_deref(), Some("keyring-data"));
    assert_eq!(keys.identity, None);
    assert_eq!(env.len(), 1);
    assert!(!format!("{:?}", keys).contains("keyring-data"));
}

#[tokio::test]
async fn nothing_runs_without_keys() {
    let bin = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let sb = Strongbox::new(fake_strongbox(bin.path(), "none"));
    sb.ensure_decryption(work.path(), &StrongboxKeys::default())
        .await
        .unwrap();
    assert!(calls(bin.path()).is_empty());
}

#[tokio::test]
async fn keyring_is_written_privately_and_decrypted_recursively() {
    let bin = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let sb = Strongbox::new(fake_strongbox(bin.path(), "none"));
    let keys = StrongboxKeys {
        keyring: Some("keyring-data".to_string()),
        identity: Some("AGE-SECRET-KEY-1".to_string()),
    };
    sb.ensure_decryption(work.path(), &keys).await.unwrap();

    let keyring = work.path().join(KEYRING_FILE);
    assert_eq!(std::fs::read_to_string(&keyring).unwrap(), "keyring-data");
    let mode = std::fs::metadata(&keyring).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert!(work.path().join(IDENTITY_FILE).exists());

    let dir = work.path().display().to_string();
    assert_eq!(
        calls(bin.path()),
        vec![
            format!("{}|-git-config", dir),
            format!("{}|-decrypt -recursive {}", dir, dir),
        ]
    );
}

#[tokio::test]
async fn decryption_failure_is_reported() {
    let bin = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let sb = Strongbox::new(fake_strongbox(bin.path(), "-decrypt"));
    let keys = StrongboxKeys {
        keyring: Some("keyring-data".to_string()),
        identity: None,
    };
    let err = sb.ensure_decryption(work.path(), &keys).await.unwrap_err();
    assert!(err.to_string().contains("bad keyring"), "{err}");
}
