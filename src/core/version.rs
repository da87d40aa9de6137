//! Release version identifiers derived from tag refs

use crate::core::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version identifier taken from a tag ref, e.g. `v2.3.1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionIdentifier(String);

impl VersionIdentifier {
    /// Strip `prefix` from `git_ref` and check the remainder is well formed
    ///
    /// The remainder must be non-empty, must not contain path separators or
    /// whitespace, and must not be `.` or `..`.
    pub fn from_ref(git_ref: &str, prefix: &str) -> Result<Self, PipelineError> {
        let malformed = |reason: String| PipelineError::MalformedRef {
            git_ref: git_ref.to_string(),
            reason,
        };

        let version = git_ref
            .strip_prefix(prefix)
            .ok_or_else(|| malformed(format!("missing prefix '{}'", prefix)))?;

        Self::validate(version, git_ref)
    }

    /// Accept an already-stripped version, e.g. one passed between jobs
    pub fn parse(version: &str) -> Result<Self, PipelineError> {
        Self::validate(version, version)
    }

    fn validate(version: &str, git_ref: &str) -> Result<Self, PipelineError> {
        let malformed = |reason: String| PipelineError::MalformedRef {
            git_ref: git_ref.to_string(),
            reason,
        };

        if version.is_empty() {
            return Err(malformed("empty version".to_string()));
        }
        if version.contains(['/', '\\']) {
            return Err(malformed("version contains a path separator".to_string()));
        }
        if version.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(malformed("version contains whitespace".to_string()));
        }
        if version == "." || version == ".." {
            return Err(malformed("version is a relative path".to_string()));
        }

        Ok(Self(version.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Title of the release record published for this version
    pub fn release_title(&self) -> String {
        format!("Release {}", self.0)
    }
}

impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
