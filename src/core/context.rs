//! Pipeline context - the immutable inputs every job is invoked with

use crate::core::{
    config::SecretsConfig,
    gate::GateSettings,
    step::SecretName,
    trigger::TriggerEvent,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Named output values a job publishes on success
pub type JobOutputs = BTreeMap<String, String>;

/// An opaque credential. Debug and Display never reveal the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for binding into a child process or request header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Injected credentials
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<SecretName, Secret>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read credentials from the environment variables named in the config.
    /// Unset or empty variables leave the secret absent.
    pub fn from_env(config: &SecretsConfig) -> Self {
        let mut secrets = Self::new();
        for (name, var) in config.variables() {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    secrets.insert(name, Secret::new(value));
                }
            }
        }
        secrets
    }

    pub fn insert(&mut self, name: SecretName, secret: Secret) {
        self.values.insert(name, secret);
    }

    pub fn with(mut self, name: SecretName, value: impl Into<String>) -> Self {
        self.insert(name, Secret::new(value));
        self
    }

    pub fn get(&self, name: SecretName) -> Option<&Secret> {
        self.values.get(&name)
    }
}

/// Execution context for a pipeline run
///
/// Built once from the trigger event and injected secrets, shared read-only
/// by every job. Cross-job data flows only through `JobOutputs`.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub trigger: TriggerEvent,

    pub gating: GateSettings,

    pub secrets: Secrets,
}

impl PipelineContext {
    pub fn new(trigger: TriggerEvent, gating: GateSettings, secrets: Secrets) -> Self {
        Self {
            trigger,
            gating,
            secrets,
        }
    }
}

/// Outputs of the upstream jobs a job depends on
#[derive(Debug, Clone, Default)]
pub struct UpstreamOutputs {
    outputs: BTreeMap<String, JobOutputs>,
}

impl UpstreamOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, job_id: impl Into<String>, outputs: JobOutputs) {
        self.outputs.insert(job_id.into(), outputs);
    }

    /// Get a named output of an upstream job
    pub fn get(&self, job_id: &str, key: &str) -> Option<&String> {
        self.outputs.get(job_id).and_then(|o| o.get(key))
    }
}
