//! CLI command definitions

use crate::core::{EventKind, TriggerEvent};
use crate::execution::SchedulingStrategy;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Where the trigger event comes from
///
/// Either a JSON event file, or flags that fall back to the variables CI
/// platforms set.
#[derive(Debug, Args, Clone, Default)]
pub struct TriggerArgs {
    /// JSON trigger event (`kind`, `ref`, `head_commit_message`, `actor`).
    /// Takes precedence over the other trigger flags.
    #[arg(long)]
    pub event: Option<PathBuf>,

    /// Platform event name, e.g. `push` or `pull_request`
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    pub event_name: Option<String>,

    /// Full ref that triggered the run
    #[arg(long = "ref", env = "GITHUB_REF")]
    pub git_ref: Option<String>,

    /// Head commit message
    #[arg(long, default_value = "")]
    pub message: String,

    /// Identity of whoever caused the event
    #[arg(long, env = "GITHUB_ACTOR", default_value = "")]
    pub actor: String,
}

impl TriggerArgs {
    /// Build the trigger event, inferring its kind from the event name and ref
    pub fn to_event(&self, tag_prefix: &str) -> Result<TriggerEvent> {
        if let Some(path) = &self.event {
            return TriggerEvent::from_file(path);
        }

        let git_ref = self
            .git_ref
            .as_deref()
            .context("No trigger ref: pass --ref, --event or set GITHUB_REF")?;
        let event_name = self.event_name.as_deref().unwrap_or("push");
        let kind = EventKind::infer(event_name, git_ref, tag_prefix);

        Ok(TriggerEvent::new(kind, git_ref, &self.message, &self.actor))
    }
}

/// Run the pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub trigger: TriggerArgs,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Evaluate gates without running anything
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    #[command(flatten)]
    pub trigger: TriggerArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output the parsed configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
}

impl From<SchedulingStrategyArg> for SchedulingStrategy {
    fn from(arg: SchedulingStrategyArg) -> Self {
        match arg {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
        }
    }
}
