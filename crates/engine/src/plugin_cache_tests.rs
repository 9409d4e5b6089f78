// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

const PROVIDER: &str =
    "registry.terraform.io/hashicorp/aws/5.0.0/linux_amd64/terraform-provider-aws";

fn write(path: &Path, contents: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn open_creates_layout() {
    let root = tempfile::tempdir().unwrap();
    let cache = PluginCache::open(root.path()).unwrap();
    assert!(cache.main_dir().is_dir());
    assert!(root.path().join("tmp").is_dir());
}

#[test]
fn run_cache_starts_with_main_contents() {
    let root = tempfile::tempdir().unwrap();
    let cache = PluginCache::open(root.path()).unwrap();
    write(&cache.main_dir().join(PROVIDER), b"aws");

    let run = cache.new_run_cache().unwrap();
    assert_eq!(fs::read(run.path().join(PROVIDER)).unwrap(), b"aws");
}

#[test]
fn rewriting_a_private_file_leaves_main_untouched() {
    let root = tempfile::tempdir().unwrap();
    let cache = PluginCache::open(root.path()).unwrap();
    write(&cache.main_dir().join(PROVIDER), b"original-provider");

    let run = cache.new_run_cache().unwrap();
    // in-place rewrite, as an installer re-extracting a package does
    fs::write(run.path().join(PROVIDER), b"CORRUPT").unwrap();

    assert_eq!(
        fs::read(cache.main_dir().join(PROVIDER)).unwrap(),
        b"original-provider"
    );
    let other = cache.new_run_cache().unwrap();
    assert_eq!(
        fs::read(other.path().join(PROVIDER)).unwrap(),
        b"original-provider"
    );

    cache.done(run);
    assert_eq!(
        fs::read(cache.main_dir().join(PROVIDER)).unwrap(),
        b"original-provider"
    );
}

#[test]
fn done_merges_new_files_and_removes_private_dir() {
    let root = tempfile::tempdir().unwrap();
    let cache = PluginCache::open(root.path()).unwrap();
    write(&cache.main_dir().join("existing"), b"old");

    let run = cache.new_run_cache().unwrap();
    let private = run.path().to_path_buf();
    write(&private.join(PROVIDER), b"downloaded");

    cache.done(run);

    assert_eq!(
        fs::read(cache.main_dir().join(PROVIDER)).unwrap(),
        b"downloaded"
    );
    assert_eq!(fs::read(cache.main_dir().join("existing")).unwrap(), b"old");
    assert!(!private.exists());
}

#[test]
fn merge_skips_files_already_in_main() {
    let root = tempfile::tempdir().unwrap();
    let cache = PluginCache::open(root.path()).unwrap();
    write(&cache.main_dir().join("a"), b"main");

    let other = tempfile::tempdir().unwrap();
    write(&other.path().join("a"), b"private");
    write(&other.path().join("b"), b"new");

    assert_eq!(cache.merge(other.path()).unwrap(), 1);
    assert_eq!(fs::read(cache.main_dir().join("a")).unwrap(), b"main");
}

#[test]
fn failed_merge_still_removes_private_dir() {
    let root = tempfile::tempdir().unwrap();
    let cache = PluginCache::open(root.path()).unwrap();
    let run = cache.new_run_cache().unwrap();
    let private = run.path().to_path_buf();
    write(&private.join("x/provider"), b"bin");
    // a file where the merge needs a directory
    write(&cache.main_dir().join("x"), b"blocker");

    cache.done(run);
    assert!(!private.exists());
    assert!(cache.main_dir().join("x").is_file());
}

#[test]
fn stale_entries_are_pruned_on_open() {
    let root = tempfile::tempdir().unwrap();
    let main = root.path().join("main");
    write(&main.join("old/provider"), b"old");
    write(&main.join("fresh"), b"fresh");
    let file = fs::File::options()
        .write(true)
        .open(main.join("old/provider"))
        .unwrap();
    file.set_modified(SystemTime::now() - STALE_AFTER - Duration::from_secs(60))
        .unwrap();
    drop(file);

    let cache = PluginCache::open(root.path()).unwrap();
    assert!(!cache.main_dir().join("old").exists());
    assert!(cache.main_dir().join("fresh").exists());
}

#[test]
fn leftover_private_dirs_are_cleared_on_open() {
    let root = tempfile::tempdir().unwrap();
    write(&root.path().join("tmp/run-crashed/provider"), b"x");
    PluginCache::open(root.path()).unwrap();
    assert!(!root.path().join("tmp/run-crashed").exists());
}

#[test]
fn concurrent_runs_never_see_torn_files() {
    const SIZE: usize = 256 * 1024;
    let root = tempfile::tempdir().unwrap();
    let cache = Arc::new(PluginCache::open(root.path()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for round in 0..5 {
                    let run = cache.new_run_cache().unwrap();
                    for rel in files_under(run.path()).unwrap() {
                        let len = fs::read(run.path().join(&rel)).unwrap().len();
                        assert_eq!(len, SIZE, "torn copy of {}", rel.display());
                    }
                    let name = format!("provider-{i}-{round}");
                    fs::write(run.path().join(name), vec![b'p'; SIZE]).unwrap();
                    cache.done(run);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let merged = files_under(cache.main_dir()).unwrap();
    assert_eq!(merged.len(), 40);
}
