//! Pipeline domain model

use crate::core::{
    context::{JobOutputs, PipelineContext, UpstreamOutputs},
    gate::GateDecision,
    job::{JobGraph, JobNode},
    state::{ExecutionStatus, JobState, PipelineState},
};
use std::collections::HashMap;

/// A pipeline definition plus the runtime state of one run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    graph: JobGraph,

    /// Runtime state per job
    jobs: HashMap<String, JobState>,

    /// Execution state
    pub state: PipelineState,
}

/// Gate decision for one job in a dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedJob {
    pub id: String,
    pub decision: GateDecision,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, graph: JobGraph) -> Self {
        let jobs = graph
            .nodes()
            .map(|n| (n.id.clone(), JobState::Pending))
            .collect();

        Self {
            name: name.into(),
            graph,
            jobs,
            state: PipelineState::new(),
        }
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    pub fn node(&self, id: &str) -> Option<&JobNode> {
        self.graph.node(id)
    }

    /// Get the state of a job
    pub fn job_state(&self, id: &str) -> Option<&JobState> {
        self.jobs.get(id)
    }

    pub fn set_job_state(&mut self, id: &str, state: JobState) {
        if let Some(slot) = self.jobs.get_mut(id) {
            *slot = state;
        }
    }

    /// Outputs of a succeeded job
    pub fn job_outputs(&self, id: &str) -> Option<&JobOutputs> {
        match self.jobs.get(id) {
            Some(JobState::Succeeded { outputs, .. }) => Some(outputs),
            _ => None,
        }
    }

    /// Job ids in dependency order
    pub fn execution_order(&self) -> &[String] {
        self.graph.execution_order()
    }

    /// Check if every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.values().all(|s| s.is_terminal())
    }

    pub fn running_jobs(&self) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|(_, s)| matches!(s, JobState::Running { .. }))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Collect the outputs a job may observe from its direct dependencies
    pub fn upstream_outputs(&self, id: &str) -> UpstreamOutputs {
        let mut upstream = UpstreamOutputs::new();
        if let Some(node) = self.graph.node(id) {
            for dep in &node.dependencies {
                if let Some(outputs) = self.job_outputs(dep) {
                    upstream.insert(dep.clone(), outputs.clone());
                }
            }
        }
        upstream
    }

    /// Overall status: failed if any job failed, skipped if every job was
    /// skipped, succeeded otherwise
    pub fn overall_status(&self) -> ExecutionStatus {
        if self.jobs.values().any(|s| s.is_failed()) {
            ExecutionStatus::Failed
        } else if !self.jobs.is_empty() && self.jobs.values().all(|s| s.is_skipped()) {
            ExecutionStatus::Skipped
        } else if self.is_complete() {
            ExecutionStatus::Succeeded
        } else {
            self.state.status
        }
    }

    /// Refresh the job counters in `state`
    pub fn update_counts(&mut self) {
        let succeeded = self.jobs.values().filter(|s| s.is_succeeded()).count();
        let failed = self.jobs.values().filter(|s| s.is_failed()).count();
        let skipped = self.jobs.values().filter(|s| s.is_skipped()).count();
        self.state.update_counts(succeeded, failed, skipped);
    }

    /// Evaluate gates without running anything
    ///
    /// A job whose upstream would be skipped is skipped too, since it can
    /// never observe a successful dependency.
    pub fn plan(&self, ctx: &PipelineContext) -> Vec<PlannedJob> {
        let mut decisions: HashMap<&str, GateDecision> = HashMap::new();

        for id in self.graph.execution_order() {
            let Some(node) = self.graph.node(id) else {
                continue;
            };

            let blocked = node
                .dependencies
                .iter()
                .find(|dep| !decisions.get(dep.as_str()).is_some_and(|d| d.should_run()));

            let decision = match blocked {
                Some(dep) => GateDecision::Skip(format!("upstream job '{}' will not run", dep)),
                None => node.predicate.evaluate(&ctx.trigger, &ctx.gating),
            };
            decisions.insert(id.as_str(), decision);
        }

        self.graph
            .execution_order()
            .iter()
            .filter_map(|id| {
                decisions.remove(id.as_str()).map(|decision| PlannedJob {
                    id: id.clone(),
                    decision,
                })
            })
            .collect()
    }
}
