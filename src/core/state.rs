//! Execution state models

use crate::core::context::JobOutputs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every job that ran succeeded
    Succeeded,
    /// At least one job failed
    Failed,
    /// Every job was skipped by its gate
    Skipped,
}

impl ExecutionStatus {
    /// Process exit code for this status. Skipped runs are not failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutionStatus::Failed => 1,
            _ => 0,
        }
    }
}

/// State of a single job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    /// Job is waiting for its dependencies
    Pending,
    /// Job is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Job completed successfully
    Succeeded {
        outputs: JobOutputs,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Job failed
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Gate was false or an upstream job did not succeed
    Skipped {
        reason: String,
    },
}

impl JobState {
    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. } | JobState::Failed { .. } | JobState::Skipped { .. }
        )
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, JobState::Succeeded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobState::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, JobState::Skipped { .. })
    }

    /// Short label for summaries and history
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running { .. } => "running",
            JobState::Succeeded { .. } => "succeeded",
            JobState::Failed { .. } => "failed",
            JobState::Skipped { .. } => "skipped",
        }
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of jobs
    pub total_jobs: usize,

    pub succeeded_jobs: usize,

    pub failed_jobs: usize,

    pub skipped_jobs: usize,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            succeeded_jobs: 0,
            failed_jobs: 0,
            skipped_jobs: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Record the final status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Update job counts
    pub fn update_counts(&mut self, succeeded: usize, failed: usize, skipped: usize) {
        self.succeeded_jobs = succeeded;
        self.failed_jobs = failed;
        self.skipped_jobs = skipped;
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.succeeded_jobs + self.failed_jobs + self.skipped_jobs) as f64 / self.total_jobs as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
