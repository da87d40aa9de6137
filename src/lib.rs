//! release-pipeline - gated CI/CD orchestration with idempotent release reconciliation

pub mod cli;
pub mod core;
pub mod execution;
pub mod jobs;
pub mod persistence;
pub mod publish;
pub mod vcs;

// Re-export commonly used types
pub use core::{ExecutionStatus, Pipeline, PipelineContext, PipelineError, Step, TriggerEvent, VersionIdentifier};
pub use execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy, StepRunner};
pub use jobs::{Job, JobContext, ReleaseCoordinator, VerificationPipeline, VersionResolver};
pub use publish::{GitHubReleases, ReleaseEndpoint};
pub use vcs::{GitCli, ReconcileOutcome, VersionControl};
