//! Trigger events delivered by the invoking platform

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Kind of event that started the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Routine commit pushed to a branch
    Push,
    /// Pull request opened or updated
    PullRequest,
    /// Tag pushed
    TagPush,
}

impl EventKind {
    /// Classify a platform event name and ref
    ///
    /// `pull_request` and `pull_request_target` are pull requests; any other
    /// event whose ref starts with `tag_prefix` is a tag push.
    pub fn infer(event_name: &str, git_ref: &str, tag_prefix: &str) -> Self {
        if event_name.starts_with("pull_request") {
            EventKind::PullRequest
        } else if git_ref.starts_with(tag_prefix) {
            EventKind::TagPush
        } else {
            EventKind::Push
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull-request",
            EventKind::TagPush => "tag-push",
        };
        f.write_str(name)
    }
}

/// The event that started a pipeline run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub kind: EventKind,

    /// Full ref, e.g. `refs/tags/v1.2.0` or `refs/heads/dev`
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Message of the head commit (may be empty, e.g. for tag events)
    #[serde(default)]
    pub head_commit_message: String,

    /// Identity of whoever caused the event
    #[serde(default)]
    pub actor: String,
}

impl TriggerEvent {
    pub fn new(
        kind: EventKind,
        git_ref: impl Into<String>,
        head_commit_message: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
            head_commit_message: head_commit_message.into(),
            actor: actor.into(),
        }
    }

    /// Load an event from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid trigger event JSON")
    }

    /// Load an event from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn is_tag_push(&self) -> bool {
        self.kind == EventKind::TagPush
    }
}
