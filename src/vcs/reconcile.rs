//! Idempotent commit-if-changed reconciliation of regenerated files

use crate::core::PipelineError;
use crate::vcs::{PushOutcome, VcsError, VersionControl};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// A named set of paths produced by a regeneration step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub name: String,
    pub paths: Vec<PathBuf>,
    /// Commit message, carrying the suppression marker
    pub commit_message: String,
}

impl ChangeSet {
    pub fn new(
        name: impl Into<String>,
        paths: Vec<PathBuf>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            paths,
            commit_message: commit_message.into(),
        }
    }
}

/// Result of reconciling one change set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    /// Regeneration was a no-op; nothing committed
    NoDiff,
    Committed { commit: String },
    /// The working tree could not be merged with the tracking branch
    Conflict { detail: String },
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ReconcileOutcome::Committed { .. })
    }
}

/// Lifecycle of a reconciliation unit: Pending -> Regenerated -> terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Pending,
    Regenerated,
    NoDiff,
    Committed,
    Conflicted,
}

impl ReconcileState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReconcileState::NoDiff | ReconcileState::Committed | ReconcileState::Conflicted
        )
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReconcileState::Pending => "pending",
            ReconcileState::Regenerated => "regenerated",
            ReconcileState::NoDiff => "no-diff",
            ReconcileState::Committed => "committed",
            ReconcileState::Conflicted => "conflicted",
        };
        f.write_str(label)
    }
}

/// One change set moving through the reconciliation state machine.
/// Each unit is reconciled at most once.
#[derive(Debug, Clone)]
pub struct ReconcileUnit {
    changeset: ChangeSet,
    state: ReconcileState,
}

impl ReconcileUnit {
    pub fn new(changeset: ChangeSet) -> Self {
        Self {
            changeset,
            state: ReconcileState::Pending,
        }
    }

    pub fn changeset(&self) -> &ChangeSet {
        &self.changeset
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Record that the regeneration steps completed
    pub fn mark_regenerated(&mut self) -> Result<(), PipelineError> {
        if self.state != ReconcileState::Pending {
            return Err(self.invalid());
        }
        self.state = ReconcileState::Regenerated;
        Ok(())
    }

    /// Commit the change set if, and only if, it differs from the
    /// tracking branch
    ///
    /// Local modifications are stashed around the pull so the regenerated
    /// files land on top of the latest remote state.
    pub async fn reconcile(
        &mut self,
        vcs: &dyn VersionControl,
    ) -> Result<ReconcileOutcome, PipelineError> {
        if self.state != ReconcileState::Regenerated {
            return Err(self.invalid());
        }

        let outcome = match self.attempt(vcs).await {
            Ok(outcome) => outcome,
            Err(VcsError::Conflict { operation, detail }) => ReconcileOutcome::Conflict {
                detail: format!("{}: {}", operation, detail),
            },
            Err(e) => {
                self.state = ReconcileState::Conflicted;
                return Err(e.into());
            }
        };

        self.state = match &outcome {
            ReconcileOutcome::NoDiff => {
                info!("{}: no changes to commit", self.changeset.name);
                ReconcileState::NoDiff
            }
            ReconcileOutcome::Committed { commit } => {
                info!("{}: committed {}", self.changeset.name, commit);
                ReconcileState::Committed
            }
            ReconcileOutcome::Conflict { detail } => {
                warn!("{}: reconciliation conflicted: {}", self.changeset.name, detail);
                ReconcileState::Conflicted
            }
        };
        Ok(outcome)
    }

    async fn attempt(&self, vcs: &dyn VersionControl) -> Result<ReconcileOutcome, VcsError> {
        let stashed = vcs.stash().await?;
        vcs.pull().await?;
        if stashed {
            vcs.stash_pop().await?;
        }

        vcs.stage(&self.changeset.paths).await?;
        if !vcs.has_staged_changes(&self.changeset.paths).await? {
            return Ok(ReconcileOutcome::NoDiff);
        }

        let commit = vcs
            .commit(&self.changeset.commit_message, &self.changeset.paths)
            .await?;
        Ok(ReconcileOutcome::Committed { commit })
    }

    fn invalid(&self) -> PipelineError {
        PipelineError::InvalidReconcile {
            changeset: self.changeset.name.clone(),
            state: self.state.to_string(),
        }
    }
}

/// Push the tracking branch when at least one reconciliation committed.
/// Returns whether a push happened.
pub async fn push_if_changed(
    vcs: &dyn VersionControl,
    outcomes: &[ReconcileOutcome],
) -> Result<bool, PipelineError> {
    if !outcomes.iter().any(ReconcileOutcome::changed) {
        info!("No regenerated artifacts changed, skipping push");
        return Ok(false);
    }

    match vcs.push().await? {
        PushOutcome::Pushed => {
            info!("Pushed reconciled artifacts to {}", vcs.tracking_branch());
            Ok(true)
        }
        PushOutcome::Rejected(detail) => Err(PipelineError::PushConflict {
            branch: vcs.tracking_branch().to_string(),
            detail,
        }),
    }
}
