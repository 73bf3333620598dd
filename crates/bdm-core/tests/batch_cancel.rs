//! Integration tests: cancellation and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bdm_core::{BatchError, CancelError, JobId, JobOptions, JobStatus, ProxySource};
use common::{settings, start, url, wait_for_status, wait_until, RecordingProxySource};

#[tokio::test(flavor = "multi_thread")]
async fn cancel_before_dispatch_never_starts() {
    let (manager, observed) = start(settings(1), None);
    let first = manager.submit_one(&url("block"), JobOptions::default()).unwrap();
    let second = manager.submit_one(&url("later.bin"), JobOptions::default()).unwrap();
    wait_for_status(&manager, first, JobStatus::Downloading).await;

    assert!(manager.cancel(second));
    let job = manager.query(second).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_at.is_some());
    assert_eq!(job.started_at, None);
    assert_eq!(job.error, None);

    assert!(manager.cancel(first));
    wait_until(Duration::from_secs(5), || manager.is_idle()).await;
    // Let the dispatch loop drain the cancelled id.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(observed.started(), vec![url("block")]);
    assert_eq!(manager.query(second).unwrap().status, JobStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_in_flight_stops_backend() {
    let source = Arc::new(RecordingProxySource::new("http://proxy:1"));
    let (manager, observed) = start(settings(2), Some(source.clone() as Arc<dyn ProxySource>));
    let id = manager.submit_one(&url("block"), JobOptions::default()).unwrap();
    wait_for_status(&manager, id, JobStatus::Downloading).await;

    manager.try_cancel(id).unwrap();
    assert_eq!(manager.query(id).unwrap().status, JobStatus::Cancelled);
    wait_until(Duration::from_secs(5), || observed.cancelled() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let job = manager.query(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.error, None);
    assert!(source.failures().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_reports_missing_and_terminal_jobs() {
    let (manager, _) = start(settings(1), None);
    let ghost = JobId::new();
    assert!(!manager.cancel(ghost));
    assert_eq!(manager.try_cancel(ghost), Err(CancelError::NotFound(ghost)));

    let id = manager.submit_one(&url("fast.bin"), JobOptions::default()).unwrap();
    wait_for_status(&manager, id, JobStatus::Completed).await;
    assert_eq!(
        manager.try_cancel(id),
        Err(CancelError::AlreadyTerminal(id, JobStatus::Completed))
    );
    assert!(!manager.cancel(id));
    assert_eq!(manager.query(id).unwrap().status, JobStatus::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_cancels_queued_and_running_jobs() {
    let (manager, observed) = start(settings(1), None);
    let running = manager.submit_one(&url("block"), JobOptions::default()).unwrap();
    let queued = manager.submit_one(&url("q.bin"), JobOptions::default()).unwrap();
    wait_for_status(&manager, running, JobStatus::Downloading).await;

    manager.stop().await;

    assert!(!manager.is_running());
    assert!(manager.is_idle());
    assert_eq!(manager.query(running).unwrap().status, JobStatus::Cancelled);
    assert_eq!(manager.query(queued).unwrap().status, JobStatus::Cancelled);
    assert_eq!(observed.cancelled(), 1);
    assert_eq!(observed.started(), vec![url("block")]);

    assert!(matches!(
        manager.submit_one(&url("late.bin"), JobOptions::default()),
        Err(BatchError::Stopped)
    ));
    // Second stop is a no-op.
    manager.stop().await;
    assert_eq!(manager.stats().cancelled, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_leaves_finished_jobs_alone() {
    let (manager, _) = start(settings(2), None);
    let done = manager.submit_one(&url("d.bin"), JobOptions::default()).unwrap();
    let failed = manager.submit_one(&url("fail"), JobOptions::default()).unwrap();
    wait_for_status(&manager, done, JobStatus::Completed).await;
    wait_for_status(&manager, failed, JobStatus::Failed).await;

    manager.stop().await;
    let stats = manager.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cancelled, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_cancels_and_submits() {
    let (manager, _) = start(settings(3), None);
    let manager = Arc::new(manager);
    let mut tasks = Vec::new();
    for i in 0..8 {
        let manager = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            let script = if i % 2 == 0 { "block".to_string() } else { format!("f{i}") };
            let id = manager.submit_one(&url(&script), JobOptions::default()).unwrap();
            if i % 2 == 0 {
                manager.cancel(id);
            }
            id
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    wait_until(Duration::from_secs(5), || manager.is_idle()).await;
    let stats = manager.stats();
    assert_eq!(stats.total(), 8);
    assert_eq!(stats.cancelled, 4);
    assert_eq!(stats.completed, 4);
    manager.stop().await;
}
