//! Test: Tag Release - the full release path for a version tag

use crate::helpers::*;
use release_pipeline::core::job::{RELEASE, RESOLVE_VERSION, VERIFY};
use release_pipeline::core::{ExecutionStatus, SecretName, Secrets};
use release_pipeline::execution::SchedulingStrategy;

/// A tag push with nothing to regenerate still releases and uploads
#[tokio::test]
async fn test_tag_push_without_changes() {
    let harness = Harness::new();
    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.output(RESOLVE_VERSION, "version").as_deref(), Some("v2.3.1"));

    // Release waits for both upstream jobs
    assert_eq!(result.start_order(), vec![RESOLVE_VERSION, VERIFY, RELEASE]);

    // No diff: no commits, no push
    assert!(harness.repo.commits().is_empty());
    assert_eq!(harness.repo.pushes(), 0);
    assert_eq!(result.output(RELEASE, "namespaces_changed").as_deref(), Some("false"));
    assert_eq!(result.output(RELEASE, "docs_changed").as_deref(), Some("false"));
    assert_eq!(result.output(RELEASE, "pushed").as_deref(), Some("false"));

    // The release record and the registry upload still happen
    let records = harness.endpoint.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tag_name, "v2.3.1");
    assert_eq!(records[0].name, "Release v2.3.1");
    assert_eq!(records[0].target_commitish, "dev");
    assert!(harness.journal.contains("step:twine-upload"));
    assert!(result
        .output(RELEASE, "release_url")
        .unwrap()
        .ends_with("/releases/tag/v2.3.1"));
}

/// Release steps run in a fixed order around reconciliation and publishing
#[tokio::test]
async fn test_release_step_order() {
    let harness = Harness::new();
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");
    let result = harness.run(tag_push("v2.4.0")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(
        result.steps_run(RELEASE),
        vec![
            "upgrade-pip",
            "install-package",
            "install-docs-requirements",
            "fetch-namespaces",
            "test-namespaces",
            "sphinx-apidoc",
            "sphinx-build",
            "build-dist",
            "twine-upload",
        ]
    );

    let journal = &harness.journal;
    let commit = journal
        .position("commit:Updating namespaces for identifiers.org [skip ci]")
        .unwrap();
    let push = journal.position("push").unwrap();
    let publish = journal.position("publish:Release v2.4.0").unwrap();
    let build = journal.entries().iter().rposition(|e| e == "step:build-dist").unwrap();

    assert!(journal.position("step:test-namespaces").unwrap() < commit);
    assert!(commit < journal.position("step:sphinx-apidoc").unwrap());
    assert!(push < publish);
    assert!(publish < build);
}

/// Regenerated files are committed with the suppression marker and pushed once
#[tokio::test]
async fn test_changed_artifacts_are_pushed() {
    let harness = Harness::new();
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");
    harness.runner.writes("sphinx-build", DOCS_INDEX, "<h1>docs v2</h1>");

    let result = harness.run(tag_push("v2.4.0")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(
        harness.repo.commits(),
        vec![
            "Updating namespaces for identifiers.org [skip ci]",
            "Compiling documentation [skip ci]",
        ]
    );
    assert_eq!(harness.repo.pushes(), 1);
    assert_eq!(harness.repo.remote_file(NAMESPACES).as_deref(), Some("{\"namespaces\": 2}"));
    assert_eq!(harness.repo.remote_file(DOCS_INDEX).as_deref(), Some("<h1>docs v2</h1>"));
    assert_eq!(result.output(RELEASE, "pushed").as_deref(), Some("true"));
}

/// A second release with unchanged sources commits and pushes nothing
#[tokio::test]
async fn test_reconciliation_is_idempotent() {
    let harness = Harness::new();
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");

    let first = harness.run(tag_push("v2.4.0")).await;
    assert_eq!(first.output(RELEASE, "namespaces_changed").as_deref(), Some("true"));
    assert_eq!(harness.repo.pushes(), 1);

    let second = harness.run(tag_push("v2.4.1")).await;
    assert_eq!(second.status, ExecutionStatus::Succeeded);
    assert_eq!(second.output(RELEASE, "namespaces_changed").as_deref(), Some("false"));
    assert_eq!(second.output(RELEASE, "docs_changed").as_deref(), Some("false"));
    assert_eq!(second.output(RELEASE, "pushed").as_deref(), Some("false"));
    assert_eq!(harness.repo.commits().len(), 1);
    assert_eq!(harness.repo.pushes(), 1);
    assert_eq!(harness.endpoint.records().len(), 2);
}

/// Running independent jobs concurrently changes nothing observable
#[tokio::test]
async fn test_parallel_strategy() {
    let harness = Harness::new();
    let result = harness
        .run_with(tag_push("v2.3.1"), all_secrets(), SchedulingStrategy::Parallel)
        .await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.start_order().last().map(String::as_str), Some(RELEASE));
    assert_eq!(harness.endpoint.records().len(), 1);
}

/// A failing coverage upload is reported but fails nothing
#[tokio::test]
async fn test_coverage_upload_is_best_effort() {
    let harness = Harness::new();
    harness.runner.fail_step("codecov");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].job_id, VERIFY);
    assert_eq!(result.warnings[0].step_id, "codecov");
    assert_eq!(result.output(VERIFY, "warnings").as_deref(), Some("1"));

    // Later steps still ran
    assert_eq!(result.steps_run(VERIFY).last().map(String::as_str), Some("sphinx"));
    assert_eq!(harness.endpoint.records().len(), 1);
}

/// Without a coverage token the upload is skipped over, not fatal
#[tokio::test]
async fn test_missing_coverage_token() {
    let harness = Harness::new();
    let secrets = Secrets::new()
        .with(SecretName::Push, "ghp_test")
        .with(SecretName::Registry, "pypi-test");

    let result = harness
        .run_with(tag_push("v2.3.1"), secrets, SchedulingStrategy::Sequential)
        .await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].message.contains("coverage"));
}
