use anyhow::{Context, Result};
use release_pipeline::{
    cli::{
        commands::{HistoryCommand, PlanCommand, RunCommand, ValidateCommand},
        output::*,
        Cli, Command,
    },
    core::{config::PipelineConfig, step::SecretName, GateDecision, JobState, PipelineContext, Secrets},
    execution::{ExecutionEvent, ProcessRunner},
    jobs::standard_engine,
    persistence::{create_summary, PersistenceBackend, RunSummary},
    publish::GitHubReleases,
    vcs::GitCli,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::from_args();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    // Execute command
    let code = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.config.as_deref()).await?,
        Command::Plan(cmd) => plan_pipeline(cmd, cli.config.as_deref())?,
        Command::Validate(cmd) => validate_pipeline(cmd, cli.config.as_deref())?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    Ok(ExitCode::from(code))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load pipeline config {}", path.display())),
        None => PipelineConfig::builtin(),
    }
}

async fn run_pipeline(cmd: &RunCommand, config_path: Option<&Path>) -> Result<u8> {
    let config = load_config(config_path)?;
    let gating = config.gating.to_settings()?;
    let trigger = cmd.trigger.to_event(&gating.tag_prefix)?;

    println!(
        "{}Loaded pipeline: {} ({} {})",
        INFO,
        style(&config.name).bold(),
        style(trigger.kind).cyan(),
        trigger.git_ref
    );

    let secrets = Secrets::from_env(&config.secrets);
    let push_token = secrets.get(SecretName::Push).cloned();
    let ctx = Arc::new(PipelineContext::new(trigger, gating, secrets));

    let runner = Arc::new(ProcessRunner::new(config.repository.path.clone()));
    let vcs = Arc::new(GitCli::from_config(&config.repository, push_token.clone()));
    let endpoint = Arc::new(GitHubReleases::from_config(&config.release.endpoint, push_token));

    let mut engine = standard_engine(&config, runner, vcs, endpoint, cmd.strategy.into());
    let mut pipeline = config.to_pipeline()?;

    // Set up event handler for console output
    let progress = create_progress_bar(pipeline.graph().len());
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        bar.println(format_execution_event(&event));
        if matches!(
            event,
            ExecutionEvent::JobSucceeded { .. }
                | ExecutionEvent::JobFailed { .. }
                | ExecutionEvent::JobSkipped { .. }
        ) {
            bar.inc(1);
        }
    });

    let result = engine.execute(&mut pipeline, ctx.clone()).await;
    progress.finish_and_clear();

    let status = match result {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            println!("\n{}{} {}", CROSS, style(&pipeline.name).bold(), style("aborted").red());
            return Ok(1);
        }
    };

    println!("\n{}", rule());
    for id in pipeline.execution_order() {
        if let Some(state) = pipeline.job_state(id) {
            let detail = match state {
                JobState::Failed { error, .. } => format!(" {}", style(error).dim()),
                JobState::Skipped { reason } => format!(" {}", style(reason).dim()),
                _ => String::new(),
            };
            println!("  {:<18} {}{}", id, format_job_state(state), detail);
        }
    }

    let warnings = engine.warnings();
    if !warnings.is_empty() {
        println!("\n{}{} step(s) failed without failing the run:", WARN, warnings.len());
        for warning in &warnings {
            println!("  {} / {}: {}", warning.job_id, style(&warning.step_id).yellow(), warning.message);
        }
    }

    if let (Some(started), Some(completed)) = (pipeline.state.started_at, pipeline.state.completed_at) {
        if let Ok(duration) = completed.signed_duration_since(started).to_std() {
            println!("\n  Duration: {}", style(format_duration(duration)).dim());
        }
    }

    // Save to history
    if !cmd.no_history {
        let summary = create_summary(&pipeline, &ctx, warnings);
        match save_history(&summary).await {
            Ok(()) => println!(
                "{}Run saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            ),
            Err(e) => warn!("Failed to save run history: {:#}", e),
        }
    }

    println!("\n{}{} {}", status_line_icon(status.exit_code()), style(&pipeline.name).bold(), format_status(status));
    Ok(status.exit_code() as u8)
}

fn status_line_icon(exit_code: i32) -> &'static console::Emoji<'static, 'static> {
    if exit_code == 0 {
        &CHECK
    } else {
        &CROSS
    }
}

fn plan_pipeline(cmd: &PlanCommand, config_path: Option<&Path>) -> Result<u8> {
    let config = load_config(config_path)?;
    let gating = config.gating.to_settings()?;
    let trigger = cmd.trigger.to_event(&gating.tag_prefix)?;
    let ctx = PipelineContext::new(trigger, gating, Secrets::new());

    let planned = config.to_pipeline()?.plan(&ctx);

    if cmd.json {
        let jobs: Vec<_> = planned
            .iter()
            .map(|job| match &job.decision {
                GateDecision::Run => serde_json::json!({ "id": job.id, "run": true }),
                GateDecision::Skip(reason) => {
                    serde_json::json!({ "id": job.id, "run": false, "reason": reason })
                }
            })
            .collect();
        let data = serde_json::json!({ "trigger": ctx.trigger, "jobs": jobs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    println!(
        "{}Plan for {} {}",
        INFO,
        style(ctx.trigger.kind).cyan(),
        ctx.trigger.git_ref
    );
    for job in &planned {
        println!("  {}", format_planned_job(job));
    }

    Ok(0)
}

fn validate_pipeline(cmd: &ValidateCommand, config_path: Option<&Path>) -> Result<u8> {
    println!("{}Validating pipeline...", INFO);

    match load_config(config_path) {
        Ok(config) => {
            println!("{}Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.step_count()).cyan());
            println!("  Tracking branch: {}", style(&config.repository.tracking_branch).cyan());
            println!("  Release endpoint: {}", style(&config.release.endpoint.repository).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(0)
        }
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(1)
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<u8> {
    let store = history_store().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_run(exec_id).await? {
            Some(summary) => print_run_details(&summary, cmd.verbose)?,
            None => println!("{}Run not found", WARN),
        }
        return Ok(0);
    }

    let runs = store.list_runs(cmd.pipeline.as_deref(), cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if runs.is_empty() {
        println!("{}No runs found", INFO);
        return Ok(0);
    }

    println!("{}Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(0)
}

fn print_run_details(summary: &RunSummary, verbose: bool) -> Result<()> {
    println!("{}Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Trigger: {} {}", summary.event_kind, summary.trigger_ref);
    println!("  Status: {}", format_status(summary.status));
    if let Some(version) = &summary.version {
        println!("  Version: {}", style(version).green());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }

    println!("  Jobs:");
    for job in &summary.jobs {
        match &job.detail {
            Some(detail) => println!("    {:<18} {} {}", job.id, job.status, style(detail).dim()),
            None => println!("    {:<18} {}", job.id, job.status),
        }
    }

    for warning in &summary.warnings {
        println!("  {}{} / {}: {}", WARN, warning.job_id, warning.step_id, warning.message);
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

async fn save_history(summary: &RunSummary) -> Result<()> {
    history_store().await?.save_run(summary).await
}

#[cfg(feature = "sqlite")]
async fn history_store() -> Result<Box<dyn PersistenceBackend>> {
    let store = release_pipeline::persistence::SqliteRunStore::with_default_path().await?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn history_store() -> Result<Box<dyn PersistenceBackend>> {
    warn!("Built without the sqlite feature; history is not persisted");
    Ok(Box::new(release_pipeline::persistence::InMemoryPersistence::new()))
}
