//! System git backend
//!
//! Every command runs with an isolated environment (only PATH and HOME are
//! inherited) and with the committer identity passed as `-c` overrides, so
//! the outcome does not depend on whoever's global config is installed.

use crate::core::{config::RepositoryConfig, Secret};
use crate::vcs::{PushOutcome, VcsError, VersionControl};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Child environment variable the credential helper reads the token from
const TOKEN_ENV: &str = "RELEASE_PIPELINE_GIT_TOKEN";

const CREDENTIAL_HELPER: &str =
    "!f() { echo username=x-access-token; echo \"password=${RELEASE_PIPELINE_GIT_TOKEN}\"; }; f";

/// Git backend using the system git binary
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
    remote: String,
    branch: String,
    committer_name: String,
    committer_email: String,
    token: Option<Secret>,
}

impl GitCli {
    pub fn new(
        repo_path: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            repo_path: repo_path.into(),
            remote: remote.into(),
            branch: branch.into(),
            committer_name: "release-pipeline".to_string(),
            committer_email: "release-pipeline@users.noreply.github.com".to_string(),
            token: None,
        }
    }

    pub fn from_config(config: &RepositoryConfig, token: Option<Secret>) -> Self {
        Self::new(&config.path, &config.remote, &config.tracking_branch)
            .with_identity(&config.committer_name, &config.committer_email)
            .with_token(token)
    }

    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.committer_name = name.into();
        self.committer_email = email.into();
        self
    }

    /// Token used for pull and push over HTTPS
    pub fn with_token(mut self, token: Option<Secret>) -> Self {
        self.token = token;
        self
    }

    /// Create a git command with isolated environment
    fn git_cmd(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.repo_path);

        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        if let Ok(home) = std::env::var("HOME") {
            cmd.env("HOME", home);
        }
        // Never block on an interactive prompt
        cmd.env("GIT_TERMINAL_PROMPT", "0");

        cmd.arg("-c").arg(format!("user.name={}", self.committer_name));
        cmd.arg("-c").arg(format!("user.email={}", self.committer_email));
        cmd.arg("-c").arg("core.quotePath=false");
        cmd
    }

    /// A git command that talks to the remote
    ///
    /// The token travels through the child environment and a credential
    /// helper configured via `GIT_CONFIG_*`, never through argv.
    fn remote_cmd(&self) -> Command {
        let mut cmd = self.git_cmd();
        if let Some(token) = &self.token {
            cmd.env("GIT_CONFIG_COUNT", "2");
            // An empty helper resets any helpers from other config files
            cmd.env("GIT_CONFIG_KEY_0", "credential.helper");
            cmd.env("GIT_CONFIG_VALUE_0", "");
            cmd.env("GIT_CONFIG_KEY_1", "credential.helper");
            cmd.env("GIT_CONFIG_VALUE_1", CREDENTIAL_HELPER);
            cmd.env(TOKEN_ENV, token.expose());
        }
        cmd
    }

    async fn output(&self, mut cmd: Command, args: &[&str]) -> Result<Output, VcsError> {
        debug!("git {}", args.join(" "));
        cmd.args(args)
            .output()
            .await
            .map_err(|e| VcsError::Spawn(e.to_string()))
    }

    /// Run a local command and return its trimmed stdout
    async fn run_checked(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.output(self.git_cmd(), args).await?;
        if !output.status.success() {
            return Err(command_failed(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn stash_head(&self) -> Result<Option<String>, VcsError> {
        let args = ["rev-parse", "-q", "--verify", "refs/stash"];
        let output = self.output(self.git_cmd(), &args).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    fn path_args(paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| p.to_string_lossy().to_string()).collect()
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn stash(&self) -> Result<bool, VcsError> {
        let before = self.stash_head().await?;
        self.run_checked(&["stash", "push", "-m", "release-pipeline: reconcile"])
            .await?;
        let after = self.stash_head().await?;
        Ok(after.is_some() && after != before)
    }

    async fn pull(&self) -> Result<(), VcsError> {
        let args = [
            "pull",
            "--no-rebase",
            "--no-edit",
            self.remote.as_str(),
            self.branch.as_str(),
        ];
        let output = self.output(self.remote_cmd(), &args).await?;
        if output.status.success() {
            return Ok(());
        }

        let detail = combined_output(&output);
        if is_merge_conflict(&detail) {
            Err(VcsError::Conflict {
                operation: "pull".to_string(),
                detail,
            })
        } else {
            Err(command_failed(&args, &output))
        }
    }

    async fn stash_pop(&self) -> Result<(), VcsError> {
        let output = self.output(self.git_cmd(), &["stash", "pop"]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(VcsError::Conflict {
                operation: "stash pop".to_string(),
                detail: combined_output(&output),
            })
        }
    }

    async fn stage(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        let paths = Self::path_args(paths);
        let mut args = vec!["add", "-A", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args).await.map(|_| ())
    }

    async fn has_staged_changes(&self, paths: &[PathBuf]) -> Result<bool, VcsError> {
        let paths = Self::path_args(paths);
        let mut args = vec!["diff", "--cached", "--quiet", "--"];
        args.extend(paths.iter().map(String::as_str));

        let output = self.output(self.git_cmd(), &args).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(command_failed(&args, &output)),
        }
    }

    async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<String, VcsError> {
        let paths = Self::path_args(paths);
        let mut args = vec!["commit", "--quiet", "-m", message, "--only", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args).await?;
        self.run_checked(&["rev-parse", "HEAD"]).await
    }

    async fn push(&self) -> Result<PushOutcome, VcsError> {
        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        let args = ["push", self.remote.as_str(), refspec.as_str()];
        let output = self.output(self.remote_cmd(), &args).await?;
        if output.status.success() {
            return Ok(PushOutcome::Pushed);
        }

        let detail = combined_output(&output);
        if is_push_rejection(&detail) {
            Ok(PushOutcome::Rejected(detail))
        } else {
            Err(command_failed(&args, &output))
        }
    }

    fn tracking_branch(&self) -> &str {
        &self.branch
    }
}

fn combined_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    format!("{}{}", stdout, stderr).trim().to_string()
}

fn command_failed(args: &[&str], output: &Output) -> VcsError {
    VcsError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        stderr: combined_output(output),
    }
}

fn is_merge_conflict(detail: &str) -> bool {
    ["CONFLICT", "Automatic merge failed", "would be overwritten", "unmerged files"]
        .iter()
        .any(|needle| detail.contains(needle))
}

fn is_push_rejection(detail: &str) -> bool {
    ["[rejected]", "non-fast-forward", "fetch first", "[remote rejected]"]
        .iter()
        .any(|needle| detail.contains(needle))
}
