//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{job::RESOLVE_VERSION, EventKind, Pipeline, PipelineContext};
use crate::execution::StepWarning;
use crate::jobs::VERSION_OUTPUT;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Final state of one job in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub status: String,
    /// Error for failed jobs, reason for skipped ones
    #[serde(default)]
    pub detail: Option<String>,
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub pipeline_name: String,

    pub trigger_ref: String,

    pub event_kind: EventKind,

    pub status: ExecutionStatus,

    /// Version resolved from the tag, for release runs
    pub version: Option<String>,

    pub jobs: Vec<JobSummary>,

    /// Best-effort failures flagged for review
    pub warnings: Vec<StepWarning>,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run, replacing any earlier record with the same id
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>>;

    /// Most recent runs first, optionally for one pipeline only
    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.execution_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&execution_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| pipeline_name.map_or(true, |name| r.pipeline_name == name))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a finished pipeline
pub fn create_summary(
    pipeline: &Pipeline,
    ctx: &PipelineContext,
    warnings: Vec<StepWarning>,
) -> RunSummary {
    let jobs = pipeline
        .execution_order()
        .iter()
        .filter_map(|id| {
            let state = pipeline.job_state(id)?;
            let detail = match state {
                crate::core::JobState::Failed { error, .. } => Some(error.clone()),
                crate::core::JobState::Skipped { reason } => Some(reason.clone()),
                _ => None,
            };
            Some(JobSummary {
                id: id.clone(),
                status: state.label().to_string(),
                detail,
            })
        })
        .collect();

    RunSummary {
        execution_id: pipeline.state.execution_id,
        pipeline_name: pipeline.name.clone(),
        trigger_ref: ctx.trigger.git_ref.clone(),
        event_kind: ctx.trigger.kind,
        status: pipeline.state.status,
        version: pipeline
            .job_outputs(RESOLVE_VERSION)
            .and_then(|o| o.get(VERSION_OUTPUT))
            .cloned(),
        jobs,
        warnings,
        started_at: pipeline.state.started_at.unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
    }
}
