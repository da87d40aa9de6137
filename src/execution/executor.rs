//! Step executor - runs a job's steps in order with fail-fast semantics

use crate::{
    core::{PipelineError, Secrets, Step},
    execution::{EventSink, ExecutionEvent, StepRunner},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Result of executing a single step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Step reported zero status
    Success,
    /// Best-effort step failed; reported but not fatal
    Warning { message: String },
    /// Fail-fast step failed
    Failed { error: String },
}

/// A non-fatal failure kept for operator review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWarning {
    pub job_id: String,
    pub step_id: String,
    pub message: String,
}

/// What a completed step sequence did
#[derive(Debug, Clone, Default)]
pub struct SequenceReport {
    /// Ids of the steps that ran, in order
    pub executed: Vec<String>,
    pub warnings: Vec<StepWarning>,
}

impl SequenceReport {
    pub fn merge(&mut self, other: SequenceReport) {
        self.executed.extend(other.executed);
        self.warnings.extend(other.warnings);
    }
}

/// Executes the steps of one job
pub struct StepExecutor<'a> {
    runner: &'a dyn StepRunner,
    events: &'a EventSink,
    job_id: &'a str,
}

impl<'a> StepExecutor<'a> {
    pub fn new(runner: &'a dyn StepRunner, events: &'a EventSink, job_id: &'a str) -> Self {
        Self {
            runner,
            events,
            job_id,
        }
    }

    /// Execute a step and classify the result according to its policy
    pub async fn execute(&self, step: &Step, secrets: &Secrets) -> ExecutionResult {
        info!("[{}] Running step: {}", self.job_id, step.name);
        self.events.emit(ExecutionEvent::StepStarted {
            job_id: self.job_id.to_string(),
            step_id: step.id.clone(),
        });

        let problem = match self.runner.run(step, secrets).await {
            Ok(output) if output.succeeded() => None,
            Ok(output) => Some(match output.summary_line() {
                Some(line) => format!("exit code {}: {}", output.exit_code, line),
                None => format!("exit code {}", output.exit_code),
            }),
            Err(e) => Some(e.to_string()),
        };

        match problem {
            None => {
                self.events.emit(ExecutionEvent::StepCompleted {
                    job_id: self.job_id.to_string(),
                    step_id: step.id.clone(),
                });
                ExecutionResult::Success
            }
            Some(message) if step.is_best_effort() => {
                warn!(
                    "[{}] Best-effort step {} failed: {}",
                    self.job_id, step.id, message
                );
                ExecutionResult::Warning { message }
            }
            Some(error) => {
                error!("[{}] Step {} failed: {}", self.job_id, step.id, error);
                ExecutionResult::Failed { error }
            }
        }
    }

    /// Run steps strictly in order, aborting at the first fatal failure.
    /// Later steps are never started once one has failed.
    pub async fn run_sequence(
        &self,
        steps: &[Step],
        secrets: &Secrets,
    ) -> Result<SequenceReport, PipelineError> {
        let mut report = SequenceReport::default();

        for step in steps {
            let result = self.execute(step, secrets).await;
            report.executed.push(step.id.clone());

            match result {
                ExecutionResult::Success => {}
                ExecutionResult::Warning { message } => {
                    let warning = StepWarning {
                        job_id: self.job_id.to_string(),
                        step_id: step.id.clone(),
                        message,
                    };
                    self.events.emit(ExecutionEvent::StepWarning(warning.clone()));
                    report.warnings.push(warning);
                }
                ExecutionResult::Failed { error } => {
                    self.events.emit(ExecutionEvent::StepFailed {
                        job_id: self.job_id.to_string(),
                        step_id: step.id.clone(),
                        error: error.clone(),
                    });
                    return Err(PipelineError::step_failure(step.id.clone(), error));
                }
            }
        }

        Ok(report)
    }
}
