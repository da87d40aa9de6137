//! Version resolution from the trigger ref

use crate::core::{JobOutputs, PipelineError, VersionIdentifier};
use crate::jobs::{Job, JobContext, VERSION_OUTPUT};
use async_trait::async_trait;
use tracing::info;

/// Strips the tag prefix from the trigger ref and publishes the remainder
/// as the `version` output
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionResolver;

#[async_trait]
impl Job for VersionResolver {
    async fn run(&self, ctx: &JobContext) -> Result<JobOutputs, PipelineError> {
        let trigger = &ctx.pipeline.trigger;
        let version = VersionIdentifier::from_ref(&trigger.git_ref, &ctx.pipeline.gating.tag_prefix)?;
        info!("Resolved version {} from {}", version, trigger.git_ref);

        let mut outputs = JobOutputs::new();
        outputs.insert(VERSION_OUTPUT.to_string(), version.to_string());
        Ok(outputs)
    }
}
