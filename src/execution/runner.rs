//! Step runners - the uniform "run step" abstraction over external tools

use crate::core::{Secrets, Step};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Errors that prevent a step from producing an exit status
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Step '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("Failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Secret '{secret}' required by variable {var} is not available")]
    MissingSecret { var: String, secret: String },
}

/// Captured result of a finished step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl StepOutput {
    pub fn success() -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 0,
        }
    }

    /// Whether the step reported zero status
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of stderr (or stdout), for failure messages
    pub fn summary_line(&self) -> Option<&str> {
        self.stderr
            .lines()
            .rev()
            .chain(self.stdout.lines().rev())
            .map(str::trim)
            .find(|l| !l.is_empty())
    }
}

/// Trait for step execution - allows for different implementations
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run a step to completion and report its exit status
    async fn run(&self, step: &Step, secrets: &Secrets) -> Result<StepOutput, RunnerError>;
}

/// Runs steps as local subprocesses
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    working_dir: PathBuf,
}

impl ProcessRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }
}

#[async_trait]
impl StepRunner for ProcessRunner {
    async fn run(&self, step: &Step, secrets: &Secrets) -> Result<StepOutput, RunnerError> {
        let (program, args) = step
            .command
            .split_first()
            .ok_or_else(|| RunnerError::EmptyCommand(step.id.clone()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.working_dir)
            .envs(&step.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (var, name) in &step.secret_env {
            let secret = secrets.get(*name).ok_or_else(|| RunnerError::MissingSecret {
                var: var.clone(),
                secret: name.to_string(),
            })?;
            command.env(var, secret.expose());
        }

        debug!("Spawning step {}: {}", step.id, step.display_command());
        let start = Instant::now();

        let child = command.spawn().map_err(|e| RunnerError::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let output = timeout(Duration::from_secs(step.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| RunnerError::Timeout(step.timeout_secs))?
            .map_err(|e| RunnerError::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let result = StepOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if result.succeeded() {
            debug!(
                "Step {} finished in {}ms ({} bytes of output)",
                step.id,
                result.duration_ms,
                result.stdout.len()
            );
        } else {
            warn!("Step {} exited with code {}", step.id, exit_code);
        }

        Ok(result)
    }
}
