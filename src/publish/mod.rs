//! Release publication to the source-hosting release endpoint

pub mod github;

pub use github::GitHubReleases;

use crate::core::{SecretName, VersionIdentifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Release endpoint errors
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: release token missing or invalid")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    /// The endpoint refused the record, typically because the tag already
    /// has a release
    #[error("Release rejected: {0}")]
    Rejected(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// A tagged release record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub tag_name: String,
    pub name: String,
    /// Branch the tag is created from when it does not exist yet
    pub target_commitish: String,
}

impl ReleaseRecord {
    pub fn for_version(version: &VersionIdentifier, target: impl Into<String>) -> Self {
        Self {
            tag_name: version.to_string(),
            name: version.release_title(),
            target_commitish: target.into(),
        }
    }
}

/// What the endpoint reports back for a created release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRelease {
    pub id: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[async_trait]
pub trait ReleaseEndpoint: Send + Sync {
    async fn publish(&self, record: &ReleaseRecord) -> Result<PublishedRelease, PublishError>;

    /// Secret the endpoint authenticates with, if any
    fn credential(&self) -> Option<SecretName> {
        None
    }
}
