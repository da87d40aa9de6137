//! Execution scheduler - determines which jobs to run next

use crate::core::{JobState, Pipeline};

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute jobs in dependency order, one at a time
    #[default]
    Sequential,

    /// Execute all ready jobs concurrently
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

/// Scheduler for determining which jobs to run
///
/// Pure over the pipeline state, so gating and dependency handling can be
/// tested without executing anything.
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Pending jobs whose dependencies have all succeeded, in dependency order
    pub fn ready_jobs(&self, pipeline: &Pipeline) -> Vec<String> {
        pipeline
            .execution_order()
            .iter()
            .filter(|id| matches!(pipeline.job_state(id), Some(JobState::Pending)))
            .filter(|id| {
                pipeline.node(id).is_some_and(|node| {
                    node.dependencies
                        .iter()
                        .all(|dep| pipeline.job_state(dep).is_some_and(|s| s.is_succeeded()))
                })
            })
            .cloned()
            .collect()
    }

    /// Get the next batch of jobs to start
    pub fn next_jobs(&self, pipeline: &Pipeline) -> Vec<String> {
        let running = pipeline.running_jobs().len();
        let ready = self.ready_jobs(pipeline);

        let capacity = match self.strategy {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => ready.len(),
            SchedulingStrategy::LimitedParallel(max) => max.max(1),
        };

        ready
            .into_iter()
            .take(capacity.saturating_sub(running))
            .collect()
    }

    /// Pending jobs that can never start because an upstream job failed or
    /// was skipped, with the reason
    pub fn blocked_jobs(&self, pipeline: &Pipeline) -> Vec<(String, String)> {
        pipeline
            .execution_order()
            .iter()
            .filter(|id| matches!(pipeline.job_state(id), Some(JobState::Pending)))
            .filter_map(|id| {
                let node = pipeline.node(id)?;
                node.dependencies.iter().find_map(|dep| match pipeline.job_state(dep) {
                    Some(JobState::Failed { .. }) => {
                        Some((id.clone(), format!("upstream job '{}' failed", dep)))
                    }
                    Some(JobState::Skipped { .. }) => {
                        Some((id.clone(), format!("upstream job '{}' was skipped", dep)))
                    }
                    _ => None,
                })
            })
            .collect()
    }
}
