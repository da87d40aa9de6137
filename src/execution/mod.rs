//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use engine::{EventHandler, EventSink, ExecutionEngine, ExecutionEvent};
pub use executor::{ExecutionResult, SequenceReport, StepExecutor, StepWarning};
pub use runner::{ProcessRunner, RunnerError, StepOutput, StepRunner};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
