//! GitHub-compatible releases API client

use crate::core::{config::ReleaseEndpointConfig, Secret, SecretName};
use crate::publish::{PublishError, PublishedRelease, ReleaseEndpoint, ReleaseRecord};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::{debug, info};

const USER_AGENT: &str = concat!("release-pipeline/", env!("CARGO_PKG_VERSION"));

/// Creates release records through `POST /repos/{owner}/{repo}/releases`
#[derive(Debug, Clone)]
pub struct GitHubReleases {
    api_url: String,
    repository: String,
    token: Option<Secret>,
    client: Client,
}

impl GitHubReleases {
    pub fn new(
        api_url: impl Into<String>,
        repository: impl Into<String>,
        token: Option<Secret>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            repository: repository.into(),
            token,
            client: Client::new(),
        }
    }

    pub fn from_config(config: &ReleaseEndpointConfig, token: Option<Secret>) -> Self {
        Self::new(&config.api_url, &config.repository, token)
    }

    pub fn releases_url(&self) -> String {
        format!(
            "{}/repos/{}/releases",
            self.api_url.trim_end_matches('/'),
            self.repository
        )
    }
}

#[async_trait]
impl ReleaseEndpoint for GitHubReleases {
    async fn publish(&self, record: &ReleaseRecord) -> Result<PublishedRelease, PublishError> {
        let url = self.releases_url();
        debug!("POST {} (tag {})", url, record.tag_name);

        let mut request = self
            .client
            .post(&url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/vnd.github+json")
            .json(record);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let release: PublishedRelease = response.json().await?;
            info!("Published release {} ({})", record.name, release.id);
            return Ok(release);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PublishError::Unauthorized),
            StatusCode::NOT_FOUND => Err(PublishError::NotFound(body)),
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => {
                Err(PublishError::Rejected(body))
            }
            _ => Err(PublishError::Server(format!("{}: {}", status, body))),
        }
    }

    fn credential(&self) -> Option<SecretName> {
        Some(SecretName::Push)
    }
}
