//! Step domain model

use crate::core::config::StepConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Credentials a step may have bound into its environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretName {
    /// Source-control push token
    Push,
    /// Package-registry token
    Registry,
    /// Coverage-service token
    Coverage,
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecretName::Push => "push",
            SecretName::Registry => "registry",
            SecretName::Coverage => "coverage",
        };
        f.write_str(name)
    }
}

/// What happens to the owning job when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the remaining sequence and fail the job
    #[default]
    FailFast,
    /// Report a warning and carry on
    BestEffort,
}

/// An atomic unit of work executed by a `StepRunner`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Unique step identifier within its job
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Program followed by its arguments
    pub command: Vec<String>,

    /// Plain environment bindings
    pub env: BTreeMap<String, String>,

    /// Environment variables bound to secrets at spawn time
    pub secret_env: BTreeMap<String, SecretName>,

    pub policy: FailurePolicy,

    /// Wall-clock timeout in seconds
    pub timeout_secs: u64,
}

impl Step {
    /// Create a fail-fast step with no environment bindings
    pub fn new(id: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            command,
            env: BTreeMap::new(),
            secret_env: BTreeMap::new(),
            policy: FailurePolicy::FailFast,
            timeout_secs,
        }
    }

    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, default_timeout_secs: u64) -> Self {
        Step {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            command: config.run.clone(),
            env: config.env.clone(),
            secret_env: config.secret_env.clone(),
            policy: config.policy,
            timeout_secs: config.timeout_secs.unwrap_or(default_timeout_secs),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_secret(mut self, var: impl Into<String>, secret: SecretName) -> Self {
        self.secret_env.insert(var.into(), secret);
        self
    }

    pub fn is_best_effort(&self) -> bool {
        self.policy == FailurePolicy::BestEffort
    }

    /// Command line for logs. Secrets never appear here since they are only
    /// bound through the environment.
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}
