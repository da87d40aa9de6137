//! Error taxonomy for pipeline runs
//!
//! Skips and no-op reconciliations are not errors; they are modelled as
//! `JobState::Skipped` and `ReconcileOutcome::NoDiff`. Best-effort step
//! failures become `StepWarning`s. Everything here is fatal to the job that
//! raised it.

use crate::core::step::SecretName;
use crate::publish::PublishError;
use crate::vcs::VcsError;
use thiserror::Error;

/// Fatal errors raised while defining or running a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed tag ref '{git_ref}': {reason}")]
    MalformedRef { git_ref: String, reason: String },

    #[error("Step '{step}' failed: {reason}")]
    StepFailure { step: String, reason: String },

    #[error("Push to '{branch}' rejected: {detail}")]
    PushConflict { branch: String, detail: String },

    #[error("Reconciliation of '{changeset}' conflicted: {detail}")]
    ReconciliationConflict { changeset: String, detail: String },

    #[error("Change set '{changeset}' cannot be reconciled in state {state}")]
    InvalidReconcile { changeset: String, state: String },

    #[error("Job '{job}' did not expose output '{key}'")]
    MissingOutput { job: String, key: String },

    #[error("Secret '{0}' is required but was not provided")]
    MissingSecret(SecretName),

    #[error("Invalid job graph: {0}")]
    Graph(String),

    #[error("No implementation registered for job '{0}'")]
    UnknownJob(String),

    #[error("Job '{job}' aborted: {reason}")]
    Aborted { job: String, reason: String },

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl PipelineError {
    /// Shorthand for a failed step
    pub fn step_failure(step: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::StepFailure {
            step: step.into(),
            reason: reason.into(),
        }
    }
}
