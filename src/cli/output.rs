//! CLI output formatting

use crate::{
    core::{ExecutionStatus, GateDecision, JobState, PlannedJob},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
    {
        progress.set_style(style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule sized to the terminal
pub fn rule() -> String {
    let width = term_size::dimensions().map(|(w, _)| w).unwrap_or(80).min(100);
    style("─".repeat(width)).dim().to_string()
}

/// Format a job state for display
pub fn format_job_state(state: &JobState) -> String {
    match state {
        JobState::Pending => style("PENDING").dim().to_string(),
        JobState::Running { .. } => style("RUNNING").yellow().to_string(),
        JobState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        JobState::Failed { .. } => style("FAILED").red().to_string(),
        JobState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> &'static Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Succeeded => &CHECK,
        ExecutionStatus::Failed => &CROSS,
        ExecutionStatus::Running => &SPINNER,
        ExecutionStatus::Skipped => &SKIP,
        ExecutionStatus::Pending => &INFO,
    }
}

/// One-line run summary for history listings
pub fn format_run_summary(summary: &RunSummary) -> String {
    format!(
        "{}{} - {} - {} {} - {}{}",
        status_icon(summary.status),
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        style(summary.event_kind).cyan(),
        summary.trigger_ref,
        format_status(summary.status),
        summary
            .version
            .as_ref()
            .map(|v| format!(" ({})", style(v).green()))
            .unwrap_or_default(),
    )
}

/// Format a gate decision from a dry run
pub fn format_planned_job(job: &PlannedJob) -> String {
    match &job.decision {
        GateDecision::Run => format!("{}{} {}", CHECK, style(&job.id).bold(), style("would run").green()),
        GateDecision::Skip(reason) => format!(
            "{}{} {} ({})",
            SKIP,
            style(&job.id).bold(),
            style("would be skipped").dim(),
            reason
        ),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
        } => format!(
            "{}Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::JobStarted { job_id } => {
            format!("{}{}", SPINNER, style(job_id).cyan().bold())
        }
        ExecutionEvent::JobSucceeded { job_id, .. } => {
            format!("{}{}", CHECK, style(job_id).green().bold())
        }
        ExecutionEvent::JobFailed { job_id, error } => {
            format!("{}{}: {}", CROSS, style(job_id).red().bold(), style(error).dim())
        }
        ExecutionEvent::JobSkipped { job_id, reason } => {
            format!("{}{} skipped: {}", SKIP, style(job_id).dim(), reason)
        }
        ExecutionEvent::StepStarted { job_id, step_id } => {
            format!("  {}{} {}", SPINNER, style(job_id).dim(), style(step_id).cyan())
        }
        ExecutionEvent::StepCompleted { job_id, step_id } => {
            format!("  {}{} {}", CHECK, style(job_id).dim(), style(step_id).green())
        }
        ExecutionEvent::StepFailed {
            job_id,
            step_id,
            error,
        } => format!(
            "  {}{} {}: {}",
            CROSS,
            style(job_id).dim(),
            style(step_id).red(),
            style(error).dim()
        ),
        ExecutionEvent::StepWarning(warning) => format!(
            "  {}{} {} failed (non-fatal, flagged for review): {}",
            WARN,
            style(&warning.job_id).dim(),
            style(&warning.step_id).yellow(),
            style(&warning.message).dim()
        ),
        ExecutionEvent::ChangeSetReconciled {
            changeset, changed, ..
        } => {
            if *changed {
                format!("  {}{} committed", INFO, style(changeset).cyan())
            } else {
                format!("  {}{} unchanged", INFO, style(changeset).dim())
            }
        }
        ExecutionEvent::ReleasePublished { version, url, .. } => format!(
            "  {}Published {}{}",
            ROCKET,
            style(format!("Release {}", version)).green().bold(),
            url.as_ref()
                .map(|u| format!(" {}", style(u).dim()))
                .unwrap_or_default()
        ),
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{}Pipeline ({}) {}",
            status_icon(*status),
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
