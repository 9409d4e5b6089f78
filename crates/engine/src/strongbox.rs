// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Strongbox decryption of module sources

use crate::error::PrepareError;
use std::collections::BTreeMap;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const KEYRING_ENV: &str = "TF_APPLIER_STRONGBOX_KEYRING";
pub const IDENTITY_ENV: &str = "TF_APPLIER_STRONGBOX_IDENTITY";
pub const KEYRING_FILE: &str = ".strongbox_keyring";
pub const IDENTITY_FILE: &str = ".strongbox_identity";

/// Key material taken out of the run env; never passed to terraform
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StrongboxKeys {
    pub keyring: Option<String>,
    pub identity: Option<String>,
}

impl std::fmt::Debug for StrongboxKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrongboxKeys")
            .field("keyring", &self.keyring.as_ref().map(|_| "<redacted>"))
            .field("identity", &self.identity.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StrongboxKeys {
    /// Remove the strongbox entries from `env`
    pub fn take_from(env: &mut BTreeMap<String, String>) -> Self {
        Self {
            keyring: env.remove(KEYRING_ENV).filter(|v| !v.is_empty()),
            identity: env.remove(IDENTITY_ENV).filter(|v| !v.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keyring.is_none() && self.identity.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct Strongbox {
    binary: PathBuf,
}

impl Strongbox {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Write the key files into `dir` and decrypt every file below it in place
    pub async fn ensure_decryption(
        &self,
        dir: &Path,
        keys: &StrongboxKeys,
    ) -> Result<(), PrepareError> {
        if keys.is_empty() {
            return Ok(());
        }
        if let Some(identity) = &keys.identity {
            write_private(&dir.join(IDENTITY_FILE), identity)?;
        }
        if let Some(keyring) = &keys.keyring {
            write_private(&dir.join(KEYRING_FILE), keyring)?;
        }

        self.exec(dir, &["-git-config"]).await?;
        let target = dir.display().to_string();
        self.exec(dir, &["-decrypt", "-recursive", &target]).await?;
        tracing::debug!(dir = %dir.display(), "strongbox decryption done");
        Ok(())
    }

    async fn exec(&self, dir: &Path, args: &[&str]) -> Result<(), PrepareError> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(dir)
            .args(args)
            .env_clear()
            .env("HOME", dir)
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| PrepareError::Strongbox(format!("{}: {}", args.join(" "), e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(PrepareError::Strongbox(format!(
                "strongbox {} failed: {}{}",
                args.join(" "),
                stdout,
                stderr
            )));
        }
        Ok(())
    }
}

fn write_private(path: &Path, contents: &str) -> Result<(), PrepareError> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(PrepareError::io(path))?;
    file.write_all(contents.as_bytes())
        .map_err(PrepareError::io(path))
}

#[cfg(test)]
#[path = "strongbox_tests.rs"]
mod tests;
