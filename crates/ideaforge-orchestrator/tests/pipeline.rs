//! End-to-end pipeline runs against mock collaborators.
//!
//! Covers dedup, no double-publish, crash resumption, the retry bound,
//! ordering, discovery failure isolation, timeouts, shutdown and re-queue.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use ideaforge_core::{IdeaforgeError, ProjectStatus};
use ideaforge_orchestrator::{requeue, OrchestratorConfig, RetryPolicy};
use ideaforge_services::{NotifierSet, PipelineEvent};
use ideaforge_store::{FileHistoryStore, HistoryStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn config() -> OrchestratorConfig {
    OrchestratorConfig::default()
}

#[tokio::test]
async fn test_happy_path_publishes_and_notifies() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("Log Analyzer", 7.5)]),
        MockDevelopment::default(),
        config(),
    );

    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(report.discovered, 1);
    assert!(report.discovery_error.is_none());

    let record = h.store.get(&fingerprint("Log Analyzer")).await.unwrap().unwrap();
    assert_eq!(record.status, ProjectStatus::Published);
    assert_eq!(
        record.repo_url.as_deref(),
        Some("https://git.example.com/forge/log-analyzer")
    );
    assert_eq!(record.artifact.unwrap().as_str(), "artifacts/Log Analyzer");

    let events = h.notifier.events.lock().unwrap().clone();
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Published { title, .. } if title == "Log Analyzer")));
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::RunFinished { .. })));
}

#[tokio::test]
async fn test_dedup_across_runs_and_within_batch() {
    let h = harness(
        memory_store(),
        discovery(vec![
            seed("Log Analyzer", 5.0),
            // Same fingerprint after normalization.
            seed("log  analyzer!", 4.0),
        ]),
        MockDevelopment::default(),
        config(),
    );

    let first = h.orchestrator.run(5).await.unwrap();
    assert_eq!(first.discovered, 1);
    assert_eq!(first.published, 1);

    let second = h.orchestrator.run(5).await.unwrap();
    assert_eq!(second.published, 0);
    assert_eq!(second.skipped, 1);

    assert_eq!(h.store.list(None).await.unwrap().len(), 1);
    assert_eq!(h.development.calls(), 1);
    assert_eq!(h.publishing.calls(), 1);
}

#[tokio::test]
async fn test_never_publishes_twice() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("Secret Scanner", 9.0)]),
        MockDevelopment::default(),
        config(),
    );

    for _ in 0..3 {
        h.orchestrator.run(1).await.unwrap();
    }
    assert_eq!(h.publishing.calls(), 1);
    let published = h.store.list(Some(ProjectStatus::Published)).await.unwrap();
    assert_eq!(published.len(), 1);
}

#[tokio::test]
async fn test_resumes_from_developed_after_crash() {
    let crashing = Arc::new(CrashingStore::failing_on(ProjectStatus::Publishing));
    let store: Arc<dyn HistoryStore> = crashing.clone();
    let h = harness(
        store,
        discovery(vec![seed("Cert Checker", 6.0)]),
        MockDevelopment::default(),
        config(),
    );

    let err = h.orchestrator.run(1).await.unwrap_err();
    assert!(err.is_persistence());

    let record = h.store.get(&fingerprint("Cert Checker")).await.unwrap().unwrap();
    assert_eq!(record.status, ProjectStatus::Developed);
    assert!(record.artifact.is_some());

    crashing.heal();
    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(h.development.calls(), 1, "artifacts must be reused");
    assert_eq!(h.publishing.calls(), 1);
}

#[tokio::test]
async fn test_resumes_from_developed_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file_store: Arc<dyn HistoryStore> =
        Arc::new(FileHistoryStore::new(dir.path()).await.unwrap());

    // First process: development succeeds, publishing keeps failing once.
    let h = harness(
        file_store,
        discovery(vec![seed("Dns Probe", 4.0)]),
        MockDevelopment::default(),
        config(),
    );
    h.publishing.always_fail.store(true, Ordering::SeqCst);
    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.retry_scheduled, 1);

    // Second process over the same directory.
    let reopened: Arc<dyn HistoryStore> =
        Arc::new(FileHistoryStore::new(dir.path()).await.unwrap());
    let h2 = harness(
        reopened,
        discovery(vec![seed("Dns Probe", 4.0)]),
        MockDevelopment::default(),
        config(),
    );
    let report = h2.orchestrator.run(1).await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(h2.development.calls(), 0);
    assert_eq!(h2.publishing.calls(), 1);
}

#[tokio::test]
async fn test_retry_bound_on_development() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("Fuzzer", 3.0)]),
        MockDevelopment::failing(),
        OrchestratorConfig {
            retry: RetryPolicy::new(3),
            ..config()
        },
    );

    for expected_attempts in 1..=2 {
        let report = h.orchestrator.run(1).await.unwrap();
        assert_eq!(report.retry_scheduled, 1);
        let record = h.store.get(&fingerprint("Fuzzer")).await.unwrap().unwrap();
        assert_eq!(record.status, ProjectStatus::Pending);
        assert_eq!(record.attempt_count, expected_attempts);
    }

    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.failed, 1);
    let record = h.store.get(&fingerprint("Fuzzer")).await.unwrap().unwrap();
    assert_eq!(record.status, ProjectStatus::Failed);
    assert!(record.last_error.unwrap().contains("build broke"));

    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(h.development.calls(), 3);
    assert_eq!(h.publishing.calls(), 0);

    let events = h.notifier.events.lock().unwrap().clone();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Failed { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_transient_failure_recovers_on_next_run() {
    let development = MockDevelopment::default();
    development.fail_first.store(1, Ordering::SeqCst);
    let h = harness(
        memory_store(),
        discovery(vec![seed("Backup Tool", 2.0)]),
        development,
        config(),
    );

    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.retry_scheduled, 1);
    assert_eq!(h.development.calls(), 1, "no in-run retry");

    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.published, 1);
    let record = h.store.get(&fingerprint("Backup Tool")).await.unwrap().unwrap();
    assert_eq!(record.attempt_count, 0);
    assert!(record.last_error.is_none());
}

#[tokio::test]
async fn test_processes_highest_score_first() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("ten", 10.0), seed("thirty", 30.0), seed("twenty", 20.0)]),
        MockDevelopment::default(),
        config(),
    );

    let report = h.orchestrator.run(2).await.unwrap();
    assert_eq!(report.published, 2);
    assert_eq!(h.development.titles(), vec!["thirty", "twenty"]);
    assert!(h.store.get(&fingerprint("ten")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failures_do_not_count_towards_max_ideas() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("a", 3.0), seed("b", 2.0), seed("c", 1.0)]),
        MockDevelopment::default(),
        config(),
    );
    h.development.fail_first.store(1, Ordering::SeqCst);

    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.retry_scheduled, 1);
    assert_eq!(report.published, 1);
    assert_eq!(h.development.titles(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_discovery_failure_touches_nothing() {
    let h = harness(
        memory_store(),
        Arc::new(DownDiscovery),
        MockDevelopment::default(),
        config(),
    );

    let report = h.orchestrator.run(3).await.unwrap();
    assert_eq!(report.processed(), 0);
    assert!(report.discovery_error.unwrap().contains("connection refused"));
    assert!(h.store.list(None).await.unwrap().is_empty());
    assert_eq!(h.development.calls(), 0);
}

#[tokio::test]
async fn test_max_ideas_zero_is_a_no_op() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("anything", 1.0)]),
        MockDevelopment::default(),
        config(),
    );
    let report = h.orchestrator.run(0).await.unwrap();
    assert_eq!(report.discovered, 0);
    assert!(h.store.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_development_timeout_is_a_failed_attempt() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("Slowpoke", 1.0)]),
        MockDevelopment::slow(Duration::from_secs(5)),
        OrchestratorConfig {
            development_timeout: Duration::from_millis(50),
            ..config()
        },
    );

    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.retry_scheduled, 1);
    let record = h.store.get(&fingerprint("Slowpoke")).await.unwrap().unwrap();
    assert_eq!(record.status, ProjectStatus::Pending);
    assert_eq!(record.attempt_count, 1);
    assert!(record.last_error.unwrap().contains("timeout"));
}

#[tokio::test]
async fn test_publish_failures_keep_artifact_then_requeue() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("Taken Name", 1.0)]),
        MockDevelopment::default(),
        config(),
    );
    h.publishing.always_fail.store(true, Ordering::SeqCst);

    for _ in 0..3 {
        h.orchestrator.run(1).await.unwrap();
    }
    let fp = fingerprint("Taken Name");
    let record = h.store.get(&fp).await.unwrap().unwrap();
    assert_eq!(record.status, ProjectStatus::Failed);
    assert!(record.artifact.is_some());
    assert_eq!(h.development.calls(), 1);
    assert_eq!(h.publishing.calls(), 3);

    let requeued = requeue(h.store.as_ref(), &fp).await.unwrap();
    assert_eq!(requeued.status, ProjectStatus::Developed);

    h.publishing.always_fail.store(false, Ordering::SeqCst);
    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(h.development.calls(), 1);
}

#[tokio::test]
async fn test_requeue_refuses_published() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("Done", 1.0)]),
        MockDevelopment::default(),
        config(),
    );
    h.orchestrator.run(1).await.unwrap();

    let err = requeue(h.store.as_ref(), &fingerprint("Done")).await.unwrap_err();
    assert!(matches!(err, IdeaforgeError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_shutdown_stops_before_external_calls() {
    let (tx, rx) = tokio::sync::watch::channel(false);
    let h = harness(
        memory_store(),
        discovery(vec![seed("a", 2.0), seed("b", 1.0)]),
        MockDevelopment::default(),
        config(),
    );
    let orchestrator = h.orchestrator.with_shutdown(rx);
    tx.send(true).unwrap();

    let report = orchestrator.run(2).await.unwrap();
    assert!(report.interrupted);
    assert_eq!(report.processed(), 0);
    assert_eq!(h.development.calls(), 0);
}

#[tokio::test]
async fn test_stale_in_flight_record_is_reclaimed() {
    let crashing = Arc::new(CrashingStore::failing_on(ProjectStatus::Developed));
    let store: Arc<dyn HistoryStore> = crashing.clone();

    // Leave the record stuck in DEVELOPING.
    let h = harness(
        store.clone(),
        discovery(vec![seed("Stuck", 1.0)]),
        MockDevelopment::default(),
        config(),
    );
    assert!(h.orchestrator.run(1).await.is_err());
    crashing.heal();
    let stuck = store.get(&fingerprint("Stuck")).await.unwrap().unwrap();
    assert_eq!(stuck.status, ProjectStatus::Developing);

    // Without a stale threshold the record is left alone.
    let report = h.orchestrator.run(1).await.unwrap();
    assert_eq!(report.skipped, 1);

    let h2 = harness(
        store.clone(),
        discovery(vec![seed("Stuck", 1.0)]),
        MockDevelopment::default(),
        OrchestratorConfig {
            stale_after: Some(Duration::ZERO),
            ..config()
        },
    );
    let report = h2.orchestrator.run(1).await.unwrap();
    assert_eq!(report.published, 1);
    let record = store.get(&fingerprint("Stuck")).await.unwrap().unwrap();
    assert_eq!(record.status, ProjectStatus::Published);
}

#[tokio::test]
async fn test_backlog_resumption_merges_undiscovered_records() {
    let store = memory_store();
    let h = harness(
        store.clone(),
        discovery(vec![seed("Orphan", 5.0)]),
        MockDevelopment::failing(),
        config(),
    );
    h.orchestrator.run(1).await.unwrap();
    assert_eq!(
        store.get(&fingerprint("Orphan")).await.unwrap().unwrap().status,
        ProjectStatus::Pending
    );

    // The source stopped listing the idea.
    let plain = harness(store.clone(), discovery(vec![]), MockDevelopment::default(), config());
    let report = plain.orchestrator.run(1).await.unwrap();
    assert_eq!(report.discovered, 0);

    let resuming = harness(
        store.clone(),
        discovery(vec![]),
        MockDevelopment::default(),
        OrchestratorConfig {
            resume_backlog: true,
            ..config()
        },
    );
    let report = resuming.orchestrator.run(1).await.unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.published, 1);
}

#[tokio::test]
async fn test_stalled_notifier_does_not_hold_the_run() {
    let h = harness(
        memory_store(),
        discovery(vec![seed("Log Analyzer", 7.5)]),
        MockDevelopment::default(),
        config(),
    );
    let orchestrator = h.orchestrator.with_notifiers(
        NotifierSet::new()
            .with_timeout(Duration::from_millis(50))
            .with(Arc::new(StalledNotifier))
            .with(h.notifier.clone()),
    );

    let report = tokio::time::timeout(Duration::from_secs(5), orchestrator.run(1))
        .await
        .expect("run blocked on a notifier")
        .unwrap();
    assert_eq!(report.published, 1);

    let record = h.store.get(&fingerprint("Log Analyzer")).await.unwrap().unwrap();
    assert_eq!(record.status, ProjectStatus::Published);
    assert!(h
        .notifier
        .events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, PipelineEvent::RunFinished { .. })));
}
