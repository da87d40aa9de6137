//! Release job: re-verify, reconcile derived artifacts, publish

use crate::{
    core::{
        config::{DerivedArtifactConfig, ReleaseConfig},
        job::RESOLVE_VERSION,
        JobOutputs, PipelineError, SecretName, Step, VersionIdentifier,
    },
    execution::{ExecutionEvent, SequenceReport, StepRunner},
    jobs::{Job, JobContext, VERSION_OUTPUT},
    publish::{ReleaseEndpoint, ReleaseRecord},
    vcs::{push_if_changed, ChangeSet, ReconcileOutcome, ReconcileUnit, VersionControl},
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// A file set regenerated from source and pushed back when it changes
#[derive(Debug, Clone)]
pub struct DerivedArtifact {
    pub regenerate: Vec<Step>,
    /// Checks run against the regenerated files before they are committed
    pub verify: Vec<Step>,
    pub changeset: ChangeSet,
}

impl DerivedArtifact {
    pub fn from_config(config: &DerivedArtifactConfig, default_timeout_secs: u64) -> Self {
        Self {
            regenerate: steps(&config.regenerate, default_timeout_secs),
            verify: steps(&config.verify, default_timeout_secs),
            changeset: ChangeSet::new(
                &config.name,
                config.paths.clone(),
                &config.commit_message,
            ),
        }
    }
}

/// The release job's steps, in execution order
#[derive(Debug, Clone)]
pub struct ReleasePlan {
    /// Fresh provisioning and install
    pub setup: Vec<Step>,
    pub namespace_cache: DerivedArtifact,
    pub documentation: DerivedArtifact,
    pub build: Vec<Step>,
    pub upload: Vec<Step>,
}

impl ReleasePlan {
    pub fn from_config(config: &ReleaseConfig, default_timeout_secs: u64) -> Self {
        let mut setup = steps(&config.provision, default_timeout_secs);
        setup.extend(steps(&config.install, default_timeout_secs));

        Self {
            setup,
            namespace_cache: DerivedArtifact::from_config(&config.namespace_cache, default_timeout_secs),
            documentation: DerivedArtifact::from_config(&config.documentation, default_timeout_secs),
            build: steps(&config.build, default_timeout_secs),
            upload: steps(&config.upload, default_timeout_secs),
        }
    }

    fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.setup
            .iter()
            .chain(&self.namespace_cache.regenerate)
            .chain(&self.namespace_cache.verify)
            .chain(&self.documentation.regenerate)
            .chain(&self.documentation.verify)
            .chain(&self.build)
            .chain(&self.upload)
    }

    /// Secrets any fail-fast step binds
    pub fn required_secrets(&self) -> BTreeSet<SecretName> {
        self.all_steps()
            .filter(|s| !s.is_best_effort())
            .flat_map(|s| s.secret_env.values().copied())
            .collect()
    }
}

fn steps(configs: &[crate::core::config::StepConfig], default_timeout_secs: u64) -> Vec<Step> {
    configs
        .iter()
        .map(|c| Step::from_config(c, default_timeout_secs))
        .collect()
}

/// Publishes a release once version resolution and verification succeeded
pub struct ReleaseCoordinator {
    plan: ReleasePlan,
    runner: Arc<dyn StepRunner>,
    vcs: Arc<dyn VersionControl>,
    endpoint: Arc<dyn ReleaseEndpoint>,
}

impl ReleaseCoordinator {
    pub fn new(
        plan: ReleasePlan,
        runner: Arc<dyn StepRunner>,
        vcs: Arc<dyn VersionControl>,
        endpoint: Arc<dyn ReleaseEndpoint>,
    ) -> Self {
        Self {
            plan,
            runner,
            vcs,
            endpoint,
        }
    }

    pub fn plan(&self) -> &ReleasePlan {
        &self.plan
    }

    /// Secrets needed before the first side effect: those bound by
    /// fail-fast steps plus the endpoint's credential
    pub fn required_secrets(&self) -> BTreeSet<SecretName> {
        let mut required = self.plan.required_secrets();
        required.extend(self.endpoint.credential());
        required
    }

    /// Regenerate, check and reconcile one derived artifact
    async fn refresh(
        &self,
        ctx: &JobContext,
        artifact: &DerivedArtifact,
        report: &mut SequenceReport,
    ) -> Result<ReconcileOutcome, PipelineError> {
        let executor = ctx.executor(self.runner.as_ref());
        let mut unit = ReconcileUnit::new(artifact.changeset.clone());

        report.merge(executor.run_sequence(&artifact.regenerate, ctx.secrets()).await?);
        // A failed check here means a broken artifact; never commit it
        report.merge(executor.run_sequence(&artifact.verify, ctx.secrets()).await?);
        unit.mark_regenerated()?;

        let outcome = unit.reconcile(self.vcs.as_ref()).await?;
        if let ReconcileOutcome::Conflict { detail } = &outcome {
            return Err(PipelineError::ReconciliationConflict {
                changeset: artifact.changeset.name.clone(),
                detail: detail.clone(),
            });
        }

        ctx.emit(ExecutionEvent::ChangeSetReconciled {
            job_id: ctx.job_id.clone(),
            changeset: artifact.changeset.name.clone(),
            changed: outcome.changed(),
        });
        Ok(outcome)
    }
}

#[async_trait]
impl Job for ReleaseCoordinator {
    async fn run(&self, ctx: &JobContext) -> Result<JobOutputs, PipelineError> {
        let version = VersionIdentifier::parse(ctx.upstream_output(RESOLVE_VERSION, VERSION_OUTPUT)?)?;
        info!("Releasing {}", version);

        // Fail before any side effect rather than halfway through publishing
        for name in self.required_secrets() {
            if ctx.secrets().get(name).is_none() {
                return Err(PipelineError::MissingSecret(name));
            }
        }

        let executor = ctx.executor(self.runner.as_ref());
        let mut report = executor.run_sequence(&self.plan.setup, ctx.secrets()).await?;

        let namespaces = self.refresh(ctx, &self.plan.namespace_cache, &mut report).await?;
        let docs = self.refresh(ctx, &self.plan.documentation, &mut report).await?;

        let pushed = push_if_changed(self.vcs.as_ref(), &[namespaces.clone(), docs.clone()]).await?;

        let record = ReleaseRecord::for_version(&version, self.vcs.tracking_branch());
        let release = self.endpoint.publish(&record).await?;
        ctx.emit(ExecutionEvent::ReleasePublished {
            job_id: ctx.job_id.clone(),
            version: version.to_string(),
            url: release.html_url.clone(),
        });

        report.merge(executor.run_sequence(&self.plan.build, ctx.secrets()).await?);
        report.merge(executor.run_sequence(&self.plan.upload, ctx.secrets()).await?);
        info!("Release {} complete", version);

        let mut outputs = JobOutputs::new();
        outputs.insert(VERSION_OUTPUT.to_string(), version.to_string());
        outputs.insert("namespaces_changed".to_string(), namespaces.changed().to_string());
        outputs.insert("docs_changed".to_string(), docs.changed().to_string());
        outputs.insert("pushed".to_string(), pushed.to_string());
        if let Some(url) = release.html_url {
            outputs.insert("release_url".to_string(), url);
        }
        outputs.insert("warnings".to_string(), report.warnings.len().to_string());
        Ok(outputs)
    }
}
