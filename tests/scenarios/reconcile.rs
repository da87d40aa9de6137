//! Test: Reconcile - commit-if-changed against a moving tracking branch

use crate::helpers::*;
use release_pipeline::core::job::RELEASE;
use release_pipeline::core::ExecutionStatus;
use release_pipeline::execution::ExecutionEvent;

/// Only the artifact that changed gets a commit
#[tokio::test]
async fn test_only_changed_artifact_is_committed() {
    let harness = Harness::new();
    harness.runner.writes("sphinx-build", DOCS_INDEX, "<h1>docs v2</h1>");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(harness.repo.commits(), vec!["Compiling documentation [skip ci]"]);
    assert_eq!(harness.repo.pushes(), 1);
    assert_eq!(result.output(RELEASE, "namespaces_changed").as_deref(), Some("false"));
    assert_eq!(result.output(RELEASE, "docs_changed").as_deref(), Some("true"));

    let reconciled: Vec<(String, bool)> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::ChangeSetReconciled {
                changeset, changed, ..
            } => Some((changeset.clone(), *changed)),
            _ => None,
        })
        .collect();
    assert_eq!(
        reconciled,
        vec![
            ("identifiers-org-namespaces".to_string(), false),
            ("documentation".to_string(), true),
        ]
    );
}

/// Files outside the change set are never swept into the commit
#[tokio::test]
async fn test_unrelated_changes_stay_uncommitted() {
    let harness = Harness::new();
    harness.runner.writes("install-package", "build/lib/setup.log", "installed");
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(harness.repo.commits().len(), 1);
    assert_eq!(harness.repo.remote_file("build/lib/setup.log"), None);
    assert_eq!(harness.repo.remote_file(NAMESPACES).as_deref(), Some("{\"namespaces\": 2}"));
}

/// A file someone already staged is left out of the automated commit
#[tokio::test]
async fn test_staged_unrelated_file_is_not_committed() {
    let harness = Harness::new();
    harness.repo.stage_file("notes/stray.txt", "work in progress");
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(harness.repo.commits(), vec!["Updating namespaces for identifiers.org [skip ci]"]);
    assert_eq!(harness.repo.pushes(), 1);
    assert_eq!(harness.repo.remote_file("notes/stray.txt"), None);
    assert_eq!(harness.repo.remote_file(NAMESPACES).as_deref(), Some("{\"namespaces\": 2}"));
}

/// A merge conflict while pulling fails the release before publishing
#[tokio::test]
async fn test_pull_conflict_fails_release() {
    let harness = Harness::new();
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");
    harness.repo.conflict_on_pull();

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    let error = result.job_error(RELEASE);
    assert!(error.contains("identifiers-org-namespaces"), "{}", error);
    assert!(error.contains("conflict"), "{}", error);

    assert!(harness.repo.commits().is_empty());
    assert!(harness.endpoint.records().is_empty());
    assert!(!result.steps_run(RELEASE).contains(&"sphinx-apidoc".to_string()));
}
