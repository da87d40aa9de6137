//! Pipeline configuration from YAML

use crate::core::{
    gate::{ConditionPattern, GateSettings},
    job::JobGraph,
    step::{FailurePolicy, SecretName, Step},
    Pipeline,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Configuration shipped with the binary
pub const DEFAULT_PIPELINE_YAML: &str = include_str!("../../pipeline.yml");

const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    #[serde(default)]
    pub gating: GatingConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    pub release: ReleaseConfig,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

/// Trigger gating configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingConfig {
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    /// Sentinel in the head commit message that disables the pipeline
    #[serde(default = "default_suppression_marker")]
    pub suppression_marker: String,

    /// Whether `suppression_marker` is a regular expression
    #[serde(default)]
    pub use_regex: bool,

    /// Automation account whose events never trigger the pipeline
    #[serde(default)]
    pub bot_actor: String,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            tag_prefix: default_tag_prefix(),
            suppression_marker: default_suppression_marker(),
            use_regex: false,
            bot_actor: String::new(),
        }
    }
}

impl GatingConfig {
    fn marker_pattern(&self) -> Result<ConditionPattern> {
        if self.use_regex {
            let regex = Regex::new(&self.suppression_marker).with_context(|| {
                format!("Invalid suppression marker regex: {}", self.suppression_marker)
            })?;
            Ok(ConditionPattern::Regex(regex))
        } else {
            Ok(ConditionPattern::Simple(self.suppression_marker.clone()))
        }
    }

    /// Build the settings gates are evaluated with
    pub fn to_settings(&self) -> Result<GateSettings> {
        Ok(GateSettings {
            tag_prefix: self.tag_prefix.clone(),
            suppression_marker: self.marker_pattern()?,
            bot_actor: self.bot_actor.clone(),
        })
    }
}

fn default_tag_prefix() -> String {
    "refs/tags/".to_string()
}

fn default_suppression_marker() -> String {
    "[skip ci]".to_string()
}

/// Version-control settings for the reconciliation pushes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Working tree the release job runs in
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,

    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch generated artifacts are pushed back to
    #[serde(default = "default_tracking_branch")]
    pub tracking_branch: String,

    #[serde(default = "default_committer_name")]
    pub committer_name: String,

    #[serde(default = "default_committer_email")]
    pub committer_email: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
            remote: default_remote(),
            tracking_branch: default_tracking_branch(),
            committer_name: default_committer_name(),
            committer_email: default_committer_email(),
        }
    }
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_tracking_branch() -> String {
    "main".to_string()
}

fn default_committer_name() -> String {
    "release-pipeline".to_string()
}

fn default_committer_email() -> String {
    "release-pipeline@users.noreply.github.com".to_string()
}

/// Environment variables the credentials are read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_push_token_env")]
    pub push_token_env: String,

    #[serde(default = "default_registry_token_env")]
    pub registry_token_env: String,

    #[serde(default = "default_coverage_token_env")]
    pub coverage_token_env: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            push_token_env: default_push_token_env(),
            registry_token_env: default_registry_token_env(),
            coverage_token_env: default_coverage_token_env(),
        }
    }
}

impl SecretsConfig {
    pub fn variables(&self) -> [(SecretName, &str); 3] {
        [
            (SecretName::Push, self.push_token_env.as_str()),
            (SecretName::Registry, self.registry_token_env.as_str()),
            (SecretName::Coverage, self.coverage_token_env.as_str()),
        ]
    }
}

fn default_push_token_env() -> String {
    "GH_ACCESS_TOKEN".to_string()
}

fn default_registry_token_env() -> String {
    "PYPI_TOKEN".to_string()
}

fn default_coverage_token_env() -> String {
    "CODECOV_TOKEN".to_string()
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier within its list
    pub id: String,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// Program and arguments
    pub run: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Environment variables bound to secrets
    #[serde(default)]
    pub secret_env: BTreeMap<String, SecretName>,

    #[serde(default)]
    pub policy: FailurePolicy,

    /// Timeout for this step (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Steps of the verification job, run in field order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default)]
    pub provision: Vec<StepConfig>,

    /// Installation of the package under test
    #[serde(default)]
    pub install: Vec<StepConfig>,

    /// One installation step per optional runtime dependency
    #[serde(default)]
    pub optional_tools: Vec<StepConfig>,

    #[serde(default)]
    pub lint: Vec<StepConfig>,

    /// Tests with coverage instrumentation
    #[serde(default)]
    pub test: Vec<StepConfig>,

    /// Always best-effort, whatever the configured policy
    #[serde(default)]
    pub coverage_upload: Vec<StepConfig>,

    #[serde(default)]
    pub docs: Vec<StepConfig>,
}

impl VerifyConfig {
    /// The full ordered step sequence
    pub fn steps(&self, default_timeout_secs: u64) -> Vec<Step> {
        let to_steps = |configs: &[StepConfig]| -> Vec<Step> {
            configs
                .iter()
                .map(|c| Step::from_config(c, default_timeout_secs))
                .collect()
        };

        let mut steps = Vec::new();
        steps.extend(to_steps(&self.provision));
        steps.extend(to_steps(&self.install));
        steps.extend(to_steps(&self.optional_tools));
        steps.extend(to_steps(&self.lint));
        steps.extend(to_steps(&self.test));
        steps.extend(
            to_steps(&self.coverage_upload)
                .into_iter()
                .map(|s| s.with_policy(FailurePolicy::BestEffort)),
        );
        steps.extend(to_steps(&self.docs));
        steps
    }

    fn lists(&self) -> [(&'static str, &[StepConfig]); 7] {
        [
            ("verify.provision", &self.provision),
            ("verify.install", &self.install),
            ("verify.optional_tools", &self.optional_tools),
            ("verify.lint", &self.lint),
            ("verify.test", &self.test),
            ("verify.coverage_upload", &self.coverage_upload),
            ("verify.docs", &self.docs),
        ]
    }
}

/// A derived artifact regenerated and reconciled by the release job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedArtifactConfig {
    /// Change-set name used in logs and outputs
    pub name: String,

    /// Steps that regenerate the artifact
    pub regenerate: Vec<StepConfig>,

    /// Targeted checks run against the regenerated artifact
    #[serde(default)]
    pub verify: Vec<StepConfig>,

    /// Paths (relative to the repository) that make up the change set
    pub paths: Vec<PathBuf>,

    /// Message of the reconciliation commit
    pub commit_message: String,
}

/// Where release records are published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseEndpointConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// `owner/name` slug of the hosted repository
    pub repository: String,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

/// Release job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default)]
    pub provision: Vec<StepConfig>,

    #[serde(default)]
    pub install: Vec<StepConfig>,

    pub namespace_cache: DerivedArtifactConfig,

    pub documentation: DerivedArtifactConfig,

    /// Build of the distributable packages
    #[serde(default)]
    pub build: Vec<StepConfig>,

    /// Upload of the built packages to the registry
    #[serde(default)]
    pub upload: Vec<StepConfig>,

    pub endpoint: ReleaseEndpointConfig,
}

impl ReleaseConfig {
    fn lists(&self) -> [(&'static str, &[StepConfig]); 8] {
        [
            ("release.provision", &self.provision),
            ("release.install", &self.install),
            ("release.namespace_cache.regenerate", &self.namespace_cache.regenerate),
            ("release.namespace_cache.verify", &self.namespace_cache.verify),
            ("release.documentation.regenerate", &self.documentation.regenerate),
            ("release.documentation.verify", &self.documentation.verify),
            ("release.build", &self.build),
            ("release.upload", &self.upload),
        ]
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The configuration shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(DEFAULT_PIPELINE_YAML).context("Built-in pipeline configuration is invalid")
    }

    pub fn default_timeout(&self) -> u64 {
        self.default_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        let marker = self.gating.marker_pattern()?;

        if self.gating.tag_prefix.is_empty() {
            anyhow::bail!("gating.tag_prefix must not be empty");
        }

        if self.default_timeout_secs == Some(0) {
            anyhow::bail!("default_timeout_secs must be greater than zero");
        }

        for (list, steps) in self.verify.lists().into_iter().chain(self.release.lists()) {
            let mut seen_ids = HashSet::new();
            for step in steps {
                if !seen_ids.insert(&step.id) {
                    anyhow::bail!("Duplicate step ID '{}' in {}", step.id, list);
                }
                if step.run.is_empty() || step.run[0].trim().is_empty() {
                    anyhow::bail!("Step '{}' in {} has an empty command", step.id, list);
                }
                if step.timeout_secs == Some(0) {
                    anyhow::bail!("Step '{}' in {} has a zero timeout", step.id, list);
                }
            }
        }

        for artifact in [&self.release.namespace_cache, &self.release.documentation] {
            if artifact.regenerate.is_empty() {
                anyhow::bail!("Derived artifact '{}' has no regenerate steps", artifact.name);
            }
            if artifact.paths.is_empty() {
                anyhow::bail!("Derived artifact '{}' has no paths", artifact.name);
            }
            // Without the marker the pushed commit would trigger another run
            if !marker.matches(&artifact.commit_message) {
                anyhow::bail!(
                    "Commit message for '{}' must contain the suppression marker {}",
                    artifact.name,
                    marker.display()
                );
            }
        }

        let slug = &self.release.endpoint.repository;
        if slug.split('/').filter(|part| !part.is_empty()).count() != 2 {
            anyhow::bail!("release.endpoint.repository must be 'owner/name', got '{}'", slug);
        }

        Ok(())
    }

    /// Number of steps across both step-running jobs
    pub fn step_count(&self) -> usize {
        self.verify
            .lists()
            .into_iter()
            .chain(self.release.lists())
            .map(|(_, steps)| steps.len())
            .sum()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Ok(Pipeline::new(self.name.clone(), JobGraph::release_workflow()?))
    }
}
