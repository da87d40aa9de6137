//! Test: Gating - which jobs a trigger event lets run

use crate::helpers::*;
use release_pipeline::core::job::{RELEASE, RESOLVE_VERSION, VERIFY};
use release_pipeline::core::{EventKind, ExecutionStatus, GateDecision, PipelineContext, TriggerEvent};

/// A routine branch push verifies but never releases
#[tokio::test]
async fn test_branch_push_skips_release() {
    let harness = Harness::new();
    let result = harness.run(branch_push("dev", "Fix parser")).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.job_status(VERIFY), "succeeded");
    assert_eq!(result.job_status(RESOLVE_VERSION), "skipped");
    assert_eq!(result.job_status(RELEASE), "skipped");
    assert_eq!(result.status.exit_code(), 0);

    assert!(!result.job_started(RELEASE));
    assert!(result.steps_run(VERIFY).contains(&"pytest".to_string()));
    assert!(harness.endpoint.records().is_empty());
    assert_eq!(harness.repo.pushes(), 0);
}

/// Pull requests are verified like pushes
#[tokio::test]
async fn test_pull_request_runs_verification_only() {
    let harness = Harness::new();
    let trigger = TriggerEvent::new(EventKind::PullRequest, "refs/pull/42/merge", "Add feature", "bob");
    let result = harness.run(trigger).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.start_order(), vec![VERIFY.to_string()]);
}

/// The suppression marker disables the whole pipeline, even for tags
#[tokio::test]
async fn test_suppression_marker_skips_everything() {
    let harness = Harness::new();

    for trigger in [
        TriggerEvent::new(EventKind::TagPush, "refs/tags/v2.3.1", "Release [skip ci]", "alice"),
        branch_push("dev", "Updating namespaces for identifiers.org [skip ci]"),
    ] {
        let result = harness.run(trigger).await;

        assert_eq!(result.status, ExecutionStatus::Skipped);
        assert_eq!(result.status.exit_code(), 0);
        for job in [RESOLVE_VERSION, VERIFY, RELEASE] {
            assert_eq!(result.job_status(job), "skipped", "{} should be skipped", job);
        }
        assert!(result.start_order().is_empty());
    }

    assert!(harness.journal.entries().is_empty());
}

/// Events caused by the automation account never trigger a run
#[tokio::test]
async fn test_bot_actor_skips_everything() {
    let harness = Harness::new();
    let bot = harness.config.gating.bot_actor.clone();
    let trigger = TriggerEvent::new(EventKind::TagPush, "refs/tags/v2.3.1", "Bump version", bot);

    let result = harness.run(trigger).await;

    assert_eq!(result.status, ExecutionStatus::Skipped);
    assert!(result.start_order().is_empty());
}

/// The dry-run plan agrees with what a run does
#[test]
fn test_plan_matches_gating() {
    let harness = Harness::new();
    let settings = harness.config.gating.to_settings().unwrap();
    let pipeline = harness.config.to_pipeline().unwrap();

    let ctx = PipelineContext::new(tag_push("v2.3.1"), settings.clone(), all_secrets());
    assert!(pipeline.plan(&ctx).iter().all(|job| job.decision == GateDecision::Run));

    let ctx = PipelineContext::new(branch_push("dev", "Fix parser"), settings, all_secrets());
    let planned = pipeline.plan(&ctx);
    let decision = |id: &str| planned.iter().find(|job| job.id == id).unwrap().decision.clone();

    assert_eq!(decision(VERIFY), GateDecision::Run);
    assert!(!decision(RESOLVE_VERSION).should_run());
    assert!(!decision(RELEASE).should_run());
}
