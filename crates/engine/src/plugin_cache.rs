// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared terraform provider plugin cache
//!
//! Terraform's own cache directory is not safe for concurrent `init`s, so
//! every run gets a private copy of `main` and new plugins are merged back
//! when the run is over. Private copies are byte copies, never links, so a
//! run rewriting a cached file cannot reach `main`. Files only ever appear in
//! `main` whole: a hard link or a rename from the staging dir.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use thiserror::Error;

/// Entries in `main` not touched for this long are removed at startup
pub const STALE_AFTER: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum PluginCacheError {
    #[error("plugin cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PluginCacheError + '_ {
    move |source| PluginCacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug)]
pub struct PluginCache {
    main: PathBuf,
    tmp: PathBuf,
    lock: RwLock<()>,
}

impl PluginCache {
    /// Open (or create) the cache under `root`, pruning stale entries
    pub fn open(root: &Path) -> Result<Self, PluginCacheError> {
        Self::open_at(root, SystemTime::now())
    }

    pub(crate) fn open_at(root: &Path, now: SystemTime) -> Result<Self, PluginCacheError> {
        let main = root.join("main");
        let tmp = root.join("tmp");
        fs::create_dir_all(&main).map_err(io_err(&main))?;
        // private copies left behind by a crashed process
        if tmp.exists() {
            fs::remove_dir_all(&tmp).map_err(io_err(&tmp))?;
        }
        fs::create_dir_all(&tmp).map_err(io_err(&tmp))?;

        let pruned = prune(&main, now)?;
        if pruned > 0 {
            tracing::info!(pruned, "removed stale plugin cache entries");
        }
        Ok(Self {
            main,
            tmp,
            lock: RwLock::new(()),
        })
    }

    #[cfg(test)]
    pub(crate) fn main_dir(&self) -> &Path {
        &self.main
    }

    /// Private copy of `main` for a single run
    pub fn new_run_cache(&self) -> Result<TempDir, PluginCacheError> {
        let dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.tmp)
            .map_err(io_err(&self.tmp))?;

        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        for rel in files_under(&self.main)? {
            let dest = dir.path().join(&rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            let src = self.main.join(&rel);
            fs::copy(&src, &dest).map_err(io_err(&src))?;
        }
        Ok(dir)
    }

    /// Merge plugins downloaded by a run back into `main` and drop its copy
    pub fn done(&self, dir: TempDir) {
        match self.merge(dir.path()) {
            Ok(0) => {}
            Ok(added) => tracing::debug!(added, "merged plugins into cache"),
            Err(e) => tracing::warn!(error = %e, "unable to merge run plugin cache"),
        }
        if let Err(e) = dir.close() {
            tracing::warn!(error = %e, "unable to remove run plugin cache");
        }
    }

    pub(crate) fn merge(&self, from: &Path) -> Result<usize, PluginCacheError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut added = 0;
        for rel in files_under(from)? {
            let dest = self.main.join(&rel);
            if dest.exists() {
                continue;
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            let src = from.join(&rel);
            // the private dir is deleted right after, so linking shares nothing
            if fs::hard_link(&src, &dest).is_err() {
                let staged = tempfile::Builder::new()
                    .prefix(".stage-")
                    .tempfile_in(&self.tmp)
                    .map_err(io_err(&self.tmp))?;
                fs::copy(&src, staged.path()).map_err(io_err(&src))?;
                staged.persist(&dest).map_err(|e| PluginCacheError::Io {
                    path: dest.clone(),
                    source: e.error,
                })?;
            }
            added += 1;
        }
        Ok(added)
    }
}

/// Regular files below `root`, relative to it
fn files_under(root: &Path) -> Result<Vec<PathBuf>, PluginCacheError> {
    let mut out = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(rel) = pending.pop() {
        let dir = root.join(&rel);
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let entry = entry.map_err(io_err(&dir))?;
            let kind = entry.file_type().map_err(io_err(&entry.path()))?;
            let child = rel.join(entry.file_name());
            if kind.is_dir() {
                pending.push(child);
            } else if kind.is_file() {
                out.push(child);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn prune(main: &Path, now: SystemTime) -> Result<usize, PluginCacheError> {
    let mut pruned = 0;
    for rel in files_under(main)? {
        let path = main.join(&rel);
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(io_err(&path))?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age > STALE_AFTER {
            fs::remove_file(&path).map_err(io_err(&path))?;
            pruned += 1;
            remove_empty_parents(main, &path);
        }
    }
    Ok(pruned)
}

fn remove_empty_parents(main: &Path, file: &Path) {
    let mut dir = file.parent();
    while let Some(d) = dir {
        if d == main || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}

#[cfg(test)]
#[path = "plugin_cache_tests.rs"]
mod tests;
