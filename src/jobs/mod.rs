//! The jobs of the release workflow and their wiring into the engine

pub mod release;
pub mod verify;
pub mod version;

pub use release::{DerivedArtifact, ReleaseCoordinator, ReleasePlan};
pub use verify::VerificationPipeline;
pub use version::VersionResolver;

use crate::{
    core::{
        config::PipelineConfig,
        job::{RELEASE, RESOLVE_VERSION, VERIFY},
        JobOutputs, PipelineContext, PipelineError, Secrets, UpstreamOutputs,
    },
    execution::{EventSink, ExecutionEngine, ExecutionEvent, SchedulingStrategy, StepExecutor, StepRunner},
    publish::ReleaseEndpoint,
    vcs::VersionControl,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Output key holding the resolved version
pub const VERSION_OUTPUT: &str = "version";

/// Everything a job is invoked with
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,

    /// Trigger, gate settings and secrets, shared read-only across jobs
    pub pipeline: Arc<PipelineContext>,

    /// Outputs of the direct dependencies
    pub upstream: UpstreamOutputs,

    pub events: EventSink,
}

impl JobContext {
    pub fn secrets(&self) -> &Secrets {
        &self.pipeline.secrets
    }

    /// Step executor reporting under this job's id
    pub fn executor<'a>(&'a self, runner: &'a dyn StepRunner) -> StepExecutor<'a> {
        StepExecutor::new(runner, &self.events, &self.job_id)
    }

    pub fn emit(&self, event: ExecutionEvent) {
        self.events.emit(event);
    }

    /// A named output of an upstream job, or `MissingOutput`
    pub fn upstream_output(&self, job: &str, key: &str) -> Result<&String, PipelineError> {
        self.upstream
            .get(job, key)
            .ok_or_else(|| PipelineError::MissingOutput {
                job: job.to_string(),
                key: key.to_string(),
            })
    }
}

/// A unit of work bound to a node of the job graph
#[async_trait]
pub trait Job: Send + Sync {
    /// Run to completion, returning the job's named outputs
    async fn run(&self, ctx: &JobContext) -> Result<JobOutputs, PipelineError>;
}

/// Engine with the three standard jobs registered from configuration
pub fn standard_engine(
    config: &PipelineConfig,
    runner: Arc<dyn StepRunner>,
    vcs: Arc<dyn VersionControl>,
    endpoint: Arc<dyn ReleaseEndpoint>,
    strategy: SchedulingStrategy,
) -> ExecutionEngine {
    let timeout = config.default_timeout();
    let verify = VerificationPipeline::new(config.verify.steps(timeout), runner.clone());
    let release = ReleaseCoordinator::new(
        ReleasePlan::from_config(&config.release, timeout),
        runner,
        vcs,
        endpoint,
    );

    ExecutionEngine::new(strategy)
        .with_job(RESOLVE_VERSION, Arc::new(VersionResolver))
        .with_job(VERIFY, Arc::new(verify))
        .with_job(RELEASE, Arc::new(release))
}
