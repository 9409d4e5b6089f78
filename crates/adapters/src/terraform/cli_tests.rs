// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

/// Shell script standing in for terraform: prints its arguments and exits
/// with the code in `$TF_FAKE_EXIT` for the matching subcommand.
fn fake_binary(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("terraform");
    std::fs::write(
        &path,
        "#!/bin/sh\n\
         echo \"args: $*\"\n\
         echo \"automation: $TF_IN_AUTOMATION\"\n\
         if [ \"$1\" = \"$TF_FAKE_FAIL\" ]; then echo 'boom' >&2; exit 1; fi\n\
         if [ \"$1\" = plan ]; then exit \"${TF_PLAN_EXIT:-0}\"; fi\n\
         exit 0\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn ctx(dir: &TempDir, env: &[(&str, &str)]) -> TfContext {
    TfContext {
        working_dir: dir.path().to_path_buf(),
        env: env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[test]
fn init_passes_backend_overrides() {
    let backend = vec![("bucket".to_string(), "state".to_string())];
    assert_eq!(
        init_args(&backend),
        vec![
            "init",
            "-input=false",
            "-no-color",
            "-upgrade=false",
            "-backend-config=bucket=state"
        ]
    );
}

#[tokio::test]
async fn plan_exit_code_two_means_diff() {
    let dir = TempDir::new().unwrap();
    let tf = TerraformCli::new(fake_binary(&dir));

    let clean = tf.plan(&ctx(&dir, &[("TF_PLAN_EXIT", "0")])).await.unwrap();
    assert!(!clean.diff);
    assert!(clean.output.contains("-detailed-exitcode"));
    assert!(clean.output.contains("-out=plan.out"));

    let diff = tf.plan(&ctx(&dir, &[("TF_PLAN_EXIT", "2")])).await.unwrap();
    assert!(diff.diff);

    let err = tf
        .plan(&ctx(&dir, &[("TF_PLAN_EXIT", "1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, TerraformError::Failed { code: Some(1), .. }));
}

#[tokio::test]
async fn environment_is_exactly_the_context() {
    let dir = TempDir::new().unwrap();
    let tf = TerraformCli::new(fake_binary(&dir));
    let out = tf
        .apply(&ctx(&dir, &[("TF_IN_AUTOMATION", "1")]))
        .await
        .unwrap();
    assert!(out.contains("args: apply -input=false -no-color plan.out"));
    assert!(out.contains("automation: 1"));
}

#[tokio::test]
async fn failure_keeps_stderr_in_output() {
    let dir = TempDir::new().unwrap();
    let tf = TerraformCli::new(fake_binary(&dir));
    let err = tf
        .init(&ctx(&dir, &[("TF_FAKE_FAIL", "init")]), &[])
        .await
        .unwrap_err();
    assert!(err.output().contains("boom"), "{}", err.output());
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let dir = TempDir::new().unwrap();
    let tf = TerraformCli::new(dir.path().join("nope"));
    let err = tf.show_plan(&ctx(&dir, &[])).await.unwrap_err();
    assert!(matches!(err, TerraformError::Spawn { .. }));
}
