//! Request admission scenarios
//!
//! However many trigger sources race to admit a request for one module,
//! exactly one request is admitted and exactly one run executes it.

use crate::prelude::*;
use similar_asserts::assert_eq;
use tfa_core::Clock;
use tfa_engine::{ensure_request, AdmissionError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_admissions_produce_exactly_one_run() {
    const SOURCES: usize = 8;
    let mut world = World::new();
    world.terraform.set_diff(true);

    let mut admissions = tokio::task::JoinSet::new();
    for i in 0..SOURCES {
        let cluster = world.cluster.clone();
        let queue = world.queue.clone();
        let key = world.key.clone();
        let req = Request::new(
            format!("req-{}", i),
            RequestType::ForcedApply,
            world.clock.now(),
        );
        admissions.spawn(async move {
            let backoff = Backoff::immediate(SOURCES as u32);
            let result = ensure_request(&cluster, &key, &req, &backoff).await;
            if matches!(result, Ok(()) | Err(AdmissionError::RequestAlreadyExists)) {
                queue.enqueue(key).unwrap();
            }
            result
        });
    }

    let mut admitted = 0;
    let mut rejected = 0;
    while let Some(joined) = admissions.join_next().await {
        match joined.unwrap() {
            Ok(()) => admitted += 1,
            Err(AdmissionError::RequestAlreadyExists) => rejected += 1,
            Err(e) => panic!("unexpected admission error: {}", e),
        }
    }
    assert_eq!((admitted, rejected), (1, SOURCES - 1));

    let (done, handle) = world.start_engine();
    world.finish(done, handle, SOURCES).await;

    assert_eq!(world.terraform_inits(), 1);
    assert!(world.module().pending_request().is_none());
    assert!(world.run_status.is_empty());
    let runs = world.history.runs(&world.key).await.unwrap();
    assert!(!runs.is_empty());
    assert!(runs
        .iter()
        .all(|run| run.request.kind == RequestType::ForcedApply));
}

#[tokio::test]
async fn resubmitting_the_pending_request_is_a_no_op() {
    let world = World::new();
    let req = Request::new("manual-1", RequestType::ForcedApply, world.clock.now());
    let backoff = Backoff::immediate(3);

    ensure_request(&world.cluster, &world.key, &req, &backoff)
        .await
        .unwrap();
    let version = world.module().metadata.resource_version;
    ensure_request(&world.cluster, &world.key, &req, &backoff)
        .await
        .unwrap();

    assert_eq!(world.module().metadata.resource_version, version);
    let other = Request::new("manual-2", RequestType::PollingRun, world.clock.now());
    assert!(matches!(
        ensure_request(&world.cluster, &world.key, &other, &backoff).await,
        Err(AdmissionError::RequestAlreadyExists)
    ));
}
