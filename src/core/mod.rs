//! Core domain models for the release pipeline
//!
//! This module defines the trigger event, the gated job graph, steps and
//! their runtime state.

pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod job;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod trigger;
pub mod version;

pub use context::*;
pub use error::PipelineError;
pub use gate::{ConditionPattern, GateDecision, GateSettings, Predicate};
pub use job::{JobGraph, JobNode};
pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use trigger::{EventKind, TriggerEvent};
pub use version::VersionIdentifier;
