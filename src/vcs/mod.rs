//! Version control for the commit-if-changed reconciliation
//!
//! The release job only needs a handful of operations on the working tree,
//! expressed by the `VersionControl` trait. `GitCli` drives the system git
//! binary; tests substitute an in-memory implementation.

pub mod git;
pub mod reconcile;

pub use git::GitCli;
pub use reconcile::{push_if_changed, ChangeSet, ReconcileOutcome, ReconcileState, ReconcileUnit};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Version-control errors
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("git command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The working tree could not be brought in line with the remote
    #[error("{operation} conflicted: {detail}")]
    Conflict { operation: String, detail: String },

    #[error("Failed to run git: {0}")]
    Spawn(String),
}

/// Result of pushing the tracking branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The remote advanced past the local state
    Rejected(String),
}

/// Working-tree operations used by reconciliation
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Set aside uncommitted modifications. Returns whether anything was saved.
    async fn stash(&self) -> Result<bool, VcsError>;

    /// Merge the latest tracking-branch state into the working tree
    async fn pull(&self) -> Result<(), VcsError>;

    /// Restore the modifications saved by `stash`
    async fn stash_pop(&self) -> Result<(), VcsError>;

    /// Stage exactly these paths
    async fn stage(&self, paths: &[PathBuf]) -> Result<(), VcsError>;

    /// Whether the index differs from HEAD under these paths
    async fn has_staged_changes(&self, paths: &[PathBuf]) -> Result<bool, VcsError>;

    /// Commit only these paths, returning the new commit id. Other staged
    /// entries stay in the index.
    async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<String, VcsError>;

    /// Push local commits to the tracking branch
    async fn push(&self) -> Result<PushOutcome, VcsError>;

    /// Name of the branch pushes go to
    fn tracking_branch(&self) -> &str;
}
