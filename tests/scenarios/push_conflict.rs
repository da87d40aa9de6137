//! Test: Push Conflict - the remote moved between pull and push

use crate::helpers::*;
use release_pipeline::core::job::RELEASE;
use release_pipeline::core::ExecutionStatus;

/// A rejected push is fatal and nothing is published
#[tokio::test]
async fn test_rejected_push_is_fatal() {
    let harness = Harness::new();
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");
    harness.repo.race_next_push("README.md", "edited concurrently");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    let error = result.job_error(RELEASE);
    assert!(error.contains("Push to 'dev' rejected"), "{}", error);

    // Exactly one attempt, no retry
    let attempts = harness
        .journal
        .entries()
        .iter()
        .filter(|e| e.starts_with("push"))
        .count();
    assert_eq!(attempts, 1);

    // The concurrent write survives and ours never landed
    assert_eq!(harness.repo.remote_file("README.md").as_deref(), Some("edited concurrently"));
    assert_eq!(harness.repo.remote_file(NAMESPACES).as_deref(), Some("{\"namespaces\": 1}"));

    assert!(harness.endpoint.records().is_empty());
    assert!(!harness.journal.contains("step:build-dist"));
    assert!(!harness.journal.contains("step:twine-upload"));
}

/// Without local commits there is no push, so a moving remote is harmless
#[tokio::test]
async fn test_no_push_without_changes() {
    let harness = Harness::new();
    harness.repo.race_next_push("README.md", "edited concurrently");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert!(!harness.journal.entries().iter().any(|e| e.starts_with("push")));
    assert_eq!(harness.endpoint.records().len(), 1);
}
