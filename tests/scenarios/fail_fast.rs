//! Test: Fail Fast - the first failing step ends its job

use crate::helpers::*;
use release_pipeline::core::job::{RELEASE, RESOLVE_VERSION, VERIFY};
use release_pipeline::core::{EventKind, ExecutionStatus, SecretName, Secrets, TriggerEvent};
use release_pipeline::execution::SchedulingStrategy;

/// A lint failure stops verification before the tests and docs
#[tokio::test]
async fn test_lint_failure_aborts_verification() {
    let harness = Harness::new();
    harness.runner.fail_step("flake8");

    let result = harness.run(branch_push("dev", "Refactor")).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.status.exit_code(), 1);
    assert_eq!(result.job_status(VERIFY), "failed");
    assert!(result.job_error(VERIFY).contains("flake8"));

    let steps = result.steps_run(VERIFY);
    assert_eq!(steps.last().map(String::as_str), Some("flake8"));
    for later in ["pytest", "codecov", "sphinx"] {
        assert!(!steps.contains(&later.to_string()), "{} should not run", later);
    }
}

/// Release never starts when verification failed
#[tokio::test]
async fn test_failed_verification_blocks_release() {
    let harness = Harness::new();
    harness.runner.fail_step("pytest");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.job_status(RESOLVE_VERSION), "succeeded");
    assert_eq!(result.job_status(VERIFY), "failed");
    assert_eq!(result.job_status(RELEASE), "skipped");
    assert!(!result.job_started(RELEASE));
    assert!(harness.endpoint.records().is_empty());
    assert!(!harness.journal.contains("step:twine-upload"));
}

/// A tag ref that does not name a version fails resolution only
#[tokio::test]
async fn test_malformed_tag_ref() {
    let harness = Harness::new();
    let trigger = TriggerEvent::new(EventKind::TagPush, "refs/tags/release/2.0", "Bump", "alice");

    let result = harness
        .run_with(trigger, all_secrets(), SchedulingStrategy::Parallel)
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.job_error(RESOLVE_VERSION).contains("Malformed tag ref"));
    assert_eq!(result.job_status(VERIFY), "succeeded");
    assert_eq!(result.job_status(RELEASE), "skipped");
    assert!(!result.job_started(RELEASE));
}

/// A failing check of the regenerated cache leaves the branch untouched
#[tokio::test]
async fn test_broken_regeneration_is_never_committed() {
    let harness = Harness::new();
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{broken");
    harness.runner.fail_step("test-namespaces");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.job_status(RELEASE), "failed");
    assert!(result.job_error(RELEASE).contains("test-namespaces"));
    assert!(harness.repo.commits().is_empty());
    assert_eq!(harness.repo.pushes(), 0);
    assert_eq!(harness.repo.remote_file(NAMESPACES).as_deref(), Some("{\"namespaces\": 1}"));
    assert!(harness.endpoint.records().is_empty());
}

/// A failed build means nothing is uploaded, though the release exists
#[tokio::test]
async fn test_build_failure_skips_upload() {
    let harness = Harness::new();
    harness.runner.fail_step("build-dist");

    let result = harness.run(tag_push("v2.3.1")).await;

    assert_eq!(result.job_status(RELEASE), "failed");
    assert_eq!(harness.endpoint.records().len(), 1);
    assert!(!harness.journal.contains("step:twine-upload"));
}

/// Without the push token nothing is committed, pushed or published
#[tokio::test]
async fn test_missing_push_token() {
    let harness = Harness::new();
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");
    let secrets = Secrets::new()
        .with(SecretName::Registry, "pypi-test")
        .with(SecretName::Coverage, "codecov-test");

    let result = harness
        .run_with(tag_push("v2.3.1"), secrets, SchedulingStrategy::Sequential)
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    let error = result.job_error(RELEASE);
    assert!(error.contains("Secret 'push' is required"), "{}", error);
    assert!(result.steps_run(RELEASE).is_empty());
    assert!(harness.repo.commits().is_empty());
    assert_eq!(harness.repo.pushes(), 0);
    assert_eq!(harness.repo.remote_file(NAMESPACES).as_deref(), Some("{\"namespaces\": 1}"));
    assert!(harness.endpoint.records().is_empty());
}

/// Missing registry credentials are caught before any release side effect
#[tokio::test]
async fn test_missing_registry_token() {
    let harness = Harness::new();
    harness.runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 2}");
    let secrets = Secrets::new()
        .with(SecretName::Push, "ghp_test")
        .with(SecretName::Coverage, "codecov-test");

    let result = harness
        .run_with(tag_push("v2.3.1"), secrets, SchedulingStrategy::Sequential)
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.job_error(RELEASE).contains("registry"));
    assert!(result.steps_run(RELEASE).is_empty());
    assert!(harness.repo.commits().is_empty());
    assert!(harness.endpoint.records().is_empty());
}
