//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{ExecutionStatus, GateDecision, JobOutputs, JobState, Pipeline, PipelineContext, PipelineError},
    execution::{ExecutionScheduler, SchedulingStrategy, StepWarning},
    jobs::{Job, JobContext},
};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
    },
    JobStarted {
        job_id: String,
    },
    JobSucceeded {
        job_id: String,
        outputs: JobOutputs,
    },
    JobFailed {
        job_id: String,
        error: String,
    },
    JobSkipped {
        job_id: String,
        reason: String,
    },
    StepStarted {
        job_id: String,
        step_id: String,
    },
    StepCompleted {
        job_id: String,
        step_id: String,
    },
    StepFailed {
        job_id: String,
        step_id: String,
        error: String,
    },
    StepWarning(StepWarning),
    ChangeSetReconciled {
        job_id: String,
        changeset: String,
        changed: bool,
    },
    ReleasePublished {
        job_id: String,
        version: String,
        url: Option<String>,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to the registered handlers
///
/// Cheap to clone; every job gets a copy so steps can report progress.
#[derive(Clone, Default)]
pub struct EventSink {
    handlers: Vec<EventHandler>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

type JobResult = (String, Result<JobOutputs, PipelineError>);

/// Main pipeline execution engine
pub struct ExecutionEngine {
    scheduler: ExecutionScheduler,
    jobs: HashMap<String, Arc<dyn Job>>,
    events: EventSink,
    warnings: Arc<Mutex<Vec<StepWarning>>>,
}

impl ExecutionEngine {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventSink::new();

        let collected = warnings.clone();
        events.subscribe(move |event| {
            if let ExecutionEvent::StepWarning(warning) = event {
                if let Ok(mut list) = collected.lock() {
                    list.push(warning);
                }
            }
        });

        Self {
            scheduler: ExecutionScheduler::new(strategy),
            jobs: HashMap::new(),
            events,
            warnings,
        }
    }

    /// Register the implementation of a job node
    pub fn with_job(mut self, id: impl Into<String>, job: Arc<dyn Job>) -> Self {
        self.jobs.insert(id.into(), job);
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Non-fatal step failures seen so far
    pub fn warnings(&self) -> Vec<StepWarning> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Execute the entire pipeline and return its overall status
    ///
    /// A job starts only once every dependency has succeeded and its gate
    /// holds. Jobs downstream of a failed or skipped job are skipped.
    pub async fn execute(
        &self,
        pipeline: &mut Pipeline,
        ctx: Arc<PipelineContext>,
    ) -> Result<ExecutionStatus, PipelineError> {
        let execution_id = pipeline.state.execution_id;
        info!("Starting pipeline execution: {} ({})", pipeline.name, execution_id);
        self.events.emit(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
        });

        pipeline.state.start(pipeline.graph().len());
        let mut running: JoinSet<JobResult> = JoinSet::new();

        loop {
            let mut progressed = false;

            for (job_id, reason) in self.scheduler.blocked_jobs(pipeline) {
                self.mark_skipped(pipeline, &job_id, reason);
                progressed = true;
            }

            for job_id in self.scheduler.next_jobs(pipeline) {
                progressed = true;
                let decision = match pipeline.node(&job_id) {
                    Some(node) => node.predicate.evaluate(&ctx.trigger, &ctx.gating),
                    None => continue,
                };
                match decision {
                    GateDecision::Run => self.start_job(pipeline, &job_id, &ctx, &mut running),
                    GateDecision::Skip(reason) => self.mark_skipped(pipeline, &job_id, reason),
                }
            }

            pipeline.update_counts();
            if progressed {
                continue;
            }

            match running.join_next().await {
                Some(Ok((job_id, result))) => self.finish_job(pipeline, &job_id, result),
                Some(Err(e)) => {
                    // Job tasks are wrapped, so only a cancelled runtime lands here
                    error!("Job task could not be joined: {}", e);
                    return Err(PipelineError::Aborted {
                        job: pipeline.running_jobs().join(", "),
                        reason: e.to_string(),
                    });
                }
                None if pipeline.is_complete() => break,
                None => {
                    error!("No jobs ready to run and none running - pipeline stuck");
                    pipeline.state.finish(ExecutionStatus::Failed);
                    return Err(PipelineError::Graph(
                        "Pipeline stuck - no runnable jobs".to_string(),
                    ));
                }
            }
        }

        pipeline.update_counts();
        let status = pipeline.overall_status();
        pipeline.state.finish(status);

        info!("Pipeline execution finished: {} - {:?}", pipeline.name, status);
        self.events.emit(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        });

        Ok(status)
    }

    fn start_job(
        &self,
        pipeline: &mut Pipeline,
        job_id: &str,
        ctx: &Arc<PipelineContext>,
        running: &mut JoinSet<JobResult>,
    ) {
        let Some(job) = self.jobs.get(job_id).cloned() else {
            self.finish_job(pipeline, job_id, Err(PipelineError::UnknownJob(job_id.to_string())));
            return;
        };

        info!("Starting job: {}", job_id);
        pipeline.set_job_state(job_id, JobState::Running { started_at: Utc::now() });
        self.events.emit(ExecutionEvent::JobStarted {
            job_id: job_id.to_string(),
        });

        let job_ctx = JobContext {
            job_id: job_id.to_string(),
            pipeline: ctx.clone(),
            upstream: pipeline.upstream_outputs(job_id),
            events: self.events.clone(),
        };
        let id = job_id.to_string();

        running.spawn(async move {
            // Inner task so a panicking job fails only itself
            let handle = tokio::spawn(async move { job.run(&job_ctx).await });
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(PipelineError::Aborted {
                    job: id.clone(),
                    reason: e.to_string(),
                }),
            };
            (id, result)
        });
    }

    fn finish_job(
        &self,
        pipeline: &mut Pipeline,
        job_id: &str,
        result: Result<JobOutputs, PipelineError>,
    ) {
        let started_at = match pipeline.job_state(job_id) {
            Some(JobState::Running { started_at }) => *started_at,
            _ => Utc::now(),
        };

        match result {
            Ok(outputs) => {
                info!("Job {} succeeded", job_id);
                pipeline.set_job_state(
                    job_id,
                    JobState::Succeeded {
                        outputs: outputs.clone(),
                        started_at,
                        completed_at: Utc::now(),
                    },
                );
                self.events.emit(ExecutionEvent::JobSucceeded {
                    job_id: job_id.to_string(),
                    outputs,
                });
            }
            Err(e) => {
                let error = e.to_string();
                error!("Job {} failed: {}", job_id, error);
                pipeline.set_job_state(
                    job_id,
                    JobState::Failed {
                        error: error.clone(),
                        started_at,
                        failed_at: Utc::now(),
                    },
                );
                self.events.emit(ExecutionEvent::JobFailed {
                    job_id: job_id.to_string(),
                    error,
                });
            }
        }
        pipeline.update_counts();
    }

    fn mark_skipped(&self, pipeline: &mut Pipeline, job_id: &str, reason: String) {
        warn!("Skipping job {}: {}", job_id, reason);
        pipeline.set_job_state(job_id, JobState::Skipped { reason: reason.clone() });
        self.events.emit(ExecutionEvent::JobSkipped {
            job_id: job_id.to_string(),
            reason,
        });
    }
}
