//! Verification job: provision, install, lint, test, coverage, docs

use crate::core::{JobOutputs, PipelineError, Step};
use crate::execution::StepRunner;
use crate::jobs::{Job, JobContext};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the verification steps in order, failing fast
pub struct VerificationPipeline {
    steps: Vec<Step>,
    runner: Arc<dyn StepRunner>,
}

impl VerificationPipeline {
    pub fn new(steps: Vec<Step>, runner: Arc<dyn StepRunner>) -> Self {
        Self { steps, runner }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

#[async_trait]
impl Job for VerificationPipeline {
    async fn run(&self, ctx: &JobContext) -> Result<JobOutputs, PipelineError> {
        let report = ctx
            .executor(self.runner.as_ref())
            .run_sequence(&self.steps, ctx.secrets())
            .await?;

        for warning in &report.warnings {
            warn!(
                "{} failed but is best-effort; flagged for review: {}",
                warning.step_id, warning.message
            );
        }
        info!("Verification passed ({} steps)", report.executed.len());

        let mut outputs = JobOutputs::new();
        outputs.insert("steps".to_string(), report.executed.len().to_string());
        outputs.insert("warnings".to_string(), report.warnings.len().to_string());
        Ok(outputs)
    }
}
