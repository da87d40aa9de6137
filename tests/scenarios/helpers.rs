//! Test doubles and a harness for running the standard release workflow

use async_trait::async_trait;
use release_pipeline::core::config::PipelineConfig;
use release_pipeline::core::{
    EventKind, ExecutionStatus, JobState, Pipeline, PipelineContext, SecretName, Secrets, Step,
    TriggerEvent,
};
use release_pipeline::execution::{
    ExecutionEvent, RunnerError, SchedulingStrategy, StepOutput, StepRunner, StepWarning,
};
use release_pipeline::jobs::standard_engine;
use release_pipeline::publish::{PublishError, PublishedRelease, ReleaseEndpoint, ReleaseRecord};
use release_pipeline::vcs::{PushOutcome, VcsError, VersionControl};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const NAMESPACES: &str = "biosimulators_utils/utils/identifiers_org.namespaces.json";
pub const DOCS_INDEX: &str = "docs/index.html";

/// Ordered record of side effects across all test doubles
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }
}

/// Step runner that fails the listed steps and writes files for the
/// regeneration steps
pub struct ScriptedRunner {
    journal: Journal,
    repo: Arc<SimulatedRepo>,
    failing: Mutex<HashSet<String>>,
    writes: Mutex<HashMap<String, Vec<(PathBuf, String)>>>,
}

impl ScriptedRunner {
    pub fn new(journal: Journal, repo: Arc<SimulatedRepo>) -> Self {
        Self {
            journal,
            repo,
            failing: Mutex::new(HashSet::new()),
            writes: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_step(&self, step_id: &str) {
        self.failing.lock().unwrap().insert(step_id.to_string());
    }

    /// Make `step_id` write `content` to `path` in the working tree
    pub fn writes(&self, step_id: &str, path: &str, content: &str) {
        self.writes
            .lock()
            .unwrap()
            .entry(step_id.to_string())
            .or_default()
            .push((PathBuf::from(path), content.to_string()));
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run(&self, step: &Step, secrets: &Secrets) -> Result<StepOutput, RunnerError> {
        self.journal.record(format!("step:{}", step.id));

        for (var, name) in &step.secret_env {
            if secrets.get(*name).is_none() {
                return Err(RunnerError::MissingSecret {
                    var: var.clone(),
                    secret: name.to_string(),
                });
            }
        }

        if self.failing.lock().unwrap().contains(&step.id) {
            return Ok(StepOutput::failure(1, format!("{} reported errors", step.id)));
        }

        let writes = self.writes.lock().unwrap().get(&step.id).cloned().unwrap_or_default();
        for (path, content) in writes {
            self.repo.write(path, &content);
        }
        Ok(StepOutput::success())
    }
}

type Tree = BTreeMap<PathBuf, String>;

#[derive(Debug, Default)]
struct RepoState {
    remote: Tree,
    remote_version: u64,
    /// Remote version last merged locally
    base_version: u64,
    head: Tree,
    index: Tree,
    worktree: Tree,
    /// Worktree changes, plus newly added files that `stash pop` re-stages
    stash: Option<(Tree, Tree)>,
    /// Committed locally but not pushed yet
    unpushed: Tree,
    commits: Vec<String>,
    pushes: usize,
    conflict_on_pull: bool,
    /// Written to the remote by someone else right before our push
    concurrent_write: Option<(PathBuf, String)>,
}

impl RepoState {
    fn worktree_changes(&self) -> Tree {
        self.worktree
            .iter()
            .filter(|(path, content)| self.head.get(*path) != Some(*content))
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect()
    }
}

fn under(path: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}

/// A working tree plus the remote it tracks, all in memory
pub struct SimulatedRepo {
    journal: Journal,
    branch: String,
    state: Mutex<RepoState>,
}

impl SimulatedRepo {
    pub fn new(journal: Journal, branch: &str) -> Self {
        Self {
            journal,
            branch: branch.to_string(),
            state: Mutex::new(RepoState::default()),
        }
    }

    /// Add a file to both the remote and the local checkout
    pub fn seed(&self, path: &str, content: &str) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let path = PathBuf::from(path);
        for tree in [&mut state.remote, &mut state.head, &mut state.index, &mut state.worktree] {
            tree.insert(path.clone(), content.to_string());
        }
    }

    pub fn write(&self, path: PathBuf, content: &str) {
        self.state.lock().unwrap().worktree.insert(path, content.to_string());
    }

    /// Write and `git add` a file that no change set owns
    pub fn stage_file(&self, path: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        state.worktree.insert(PathBuf::from(path), content.to_string());
        state.index.insert(PathBuf::from(path), content.to_string());
    }

    pub fn conflict_on_pull(&self) {
        self.state.lock().unwrap().conflict_on_pull = true;
    }

    /// Let another writer push `content` to `path` just before our next push
    pub fn race_next_push(&self, path: &str, content: &str) {
        self.state.lock().unwrap().concurrent_write = Some((PathBuf::from(path), content.to_string()));
    }

    pub fn remote_file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().remote.get(Path::new(path)).cloned()
    }

    /// Local commit messages, oldest first
    pub fn commits(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn pushes(&self) -> usize {
        self.state.lock().unwrap().pushes
    }
}

#[async_trait]
impl VersionControl for SimulatedRepo {
    async fn stash(&self) -> Result<bool, VcsError> {
        let mut state = self.state.lock().unwrap();
        let changes = state.worktree_changes();
        if changes.is_empty() {
            return Ok(false);
        }
        let added: Tree = state
            .index
            .iter()
            .filter(|(path, _)| !state.head.contains_key(*path))
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        state.worktree = state.head.clone();
        state.index = state.head.clone();
        state.stash = Some((changes, added));
        Ok(true)
    }

    async fn pull(&self) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        if state.conflict_on_pull {
            return Err(VcsError::Conflict {
                operation: "pull".to_string(),
                detail: format!("CONFLICT (content): Merge conflict in {}", NAMESPACES),
            });
        }

        let pending = state.worktree_changes();
        let mut head = state.remote.clone();
        head.extend(state.unpushed.clone());
        state.index = head.clone();
        state.worktree = head.clone();
        state.worktree.extend(pending);
        state.head = head;
        state.base_version = state.remote_version;
        Ok(())
    }

    async fn stash_pop(&self) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        if let Some((changes, added)) = state.stash.take() {
            state.worktree.extend(changes);
            state.index.extend(added);
        }
        Ok(())
    }

    async fn stage(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        let staged: Tree = state
            .worktree
            .iter()
            .filter(|(path, _)| under(path, paths))
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        state.index.extend(staged);
        Ok(())
    }

    async fn has_staged_changes(&self, paths: &[PathBuf]) -> Result<bool, VcsError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .index
            .iter()
            .any(|(path, content)| under(path, paths) && state.head.get(path) != Some(content)))
    }

    async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<String, VcsError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let changes: Tree = state
            .index
            .iter()
            .filter(|(path, content)| under(path, paths) && state.head.get(*path) != Some(*content))
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        state.head.extend(changes.clone());
        state.unpushed.extend(changes);
        state.commits.push(message.to_string());
        self.journal.record(format!("commit:{}", message));
        Ok(format!("{:07x}", state.commits.len()))
    }

    async fn push(&self) -> Result<PushOutcome, VcsError> {
        let mut state = self.state.lock().unwrap();
        if let Some((path, content)) = state.concurrent_write.take() {
            state.remote.insert(path, content);
            state.remote_version += 1;
        }

        if state.base_version != state.remote_version {
            self.journal.record("push:rejected");
            return Ok(PushOutcome::Rejected(format!(
                "! [rejected] HEAD -> {} (fetch first)",
                self.branch
            )));
        }

        let unpushed = std::mem::take(&mut state.unpushed);
        state.remote.extend(unpushed);
        state.remote_version += 1;
        state.base_version = state.remote_version;
        state.pushes += 1;
        self.journal.record("push");
        Ok(PushOutcome::Pushed)
    }

    fn tracking_branch(&self) -> &str {
        &self.branch
    }
}

/// Release endpoint that keeps every record it receives
pub struct RecordingEndpoint {
    journal: Journal,
    records: Mutex<Vec<ReleaseRecord>>,
}

impl RecordingEndpoint {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<ReleaseRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReleaseEndpoint for RecordingEndpoint {
    async fn publish(&self, record: &ReleaseRecord) -> Result<PublishedRelease, PublishError> {
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        self.journal.record(format!("publish:{}", record.name));
        Ok(PublishedRelease {
            id: records.len() as u64,
            html_url: Some(format!(
                "https://github.com/biosimulators/Biosimulators_utils/releases/tag/{}",
                record.tag_name
            )),
        })
    }

    fn credential(&self) -> Option<SecretName> {
        Some(SecretName::Push)
    }
}

pub fn all_secrets() -> Secrets {
    Secrets::new()
        .with(SecretName::Push, "ghp_test")
        .with(SecretName::Registry, "pypi-test")
        .with(SecretName::Coverage, "codecov-test")
}

pub fn tag_push(version: &str) -> TriggerEvent {
    TriggerEvent::new(
        EventKind::TagPush,
        format!("refs/tags/{}", version),
        "Bump version",
        "alice",
    )
}

pub fn branch_push(branch: &str, message: &str) -> TriggerEvent {
    TriggerEvent::new(EventKind::Push, format!("refs/heads/{}", branch), message, "alice")
}

/// Built-in pipeline wired to in-memory collaborators
pub struct Harness {
    pub config: PipelineConfig,
    pub journal: Journal,
    pub repo: Arc<SimulatedRepo>,
    pub runner: Arc<ScriptedRunner>,
    pub endpoint: Arc<RecordingEndpoint>,
}

impl Harness {
    /// Both derived artifacts already committed; regeneration reproduces
    /// them exactly unless a test says otherwise
    pub fn new() -> Self {
        let config = PipelineConfig::builtin().unwrap();
        let journal = Journal::default();
        let repo = Arc::new(SimulatedRepo::new(journal.clone(), &config.repository.tracking_branch));
        repo.seed(NAMESPACES, "{\"namespaces\": 1}");
        repo.seed(DOCS_INDEX, "<h1>docs v1</h1>");

        let runner = Arc::new(ScriptedRunner::new(journal.clone(), repo.clone()));
        runner.writes("fetch-namespaces", NAMESPACES, "{\"namespaces\": 1}");
        runner.writes("sphinx-build", DOCS_INDEX, "<h1>docs v1</h1>");

        let endpoint = Arc::new(RecordingEndpoint::new(journal.clone()));

        Self {
            config,
            journal,
            repo,
            runner,
            endpoint,
        }
    }

    pub async fn run(&self, trigger: TriggerEvent) -> RunResult {
        self.run_with(trigger, all_secrets(), SchedulingStrategy::Sequential).await
    }

    pub async fn run_with(
        &self,
        trigger: TriggerEvent,
        secrets: Secrets,
        strategy: SchedulingStrategy,
    ) -> RunResult {
        let mut engine = standard_engine(
            &self.config,
            self.runner.clone(),
            self.repo.clone(),
            self.endpoint.clone(),
            strategy,
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

        let ctx = PipelineContext::new(trigger, self.config.gating.to_settings().unwrap(), secrets);
        let mut pipeline = self.config.to_pipeline().unwrap();
        let status = engine.execute(&mut pipeline, Arc::new(ctx)).await.unwrap();

        let events = events.lock().unwrap().clone();
        RunResult {
            status,
            pipeline,
            events,
            warnings: engine.warnings(),
        }
    }
}

/// Everything observable about a finished run
pub struct RunResult {
    pub status: ExecutionStatus,
    pub pipeline: Pipeline,
    pub events: Vec<ExecutionEvent>,
    pub warnings: Vec<StepWarning>,
}

impl RunResult {
    pub fn job(&self, id: &str) -> &JobState {
        self.pipeline.job_state(id).unwrap()
    }

    pub fn job_status(&self, id: &str) -> &'static str {
        self.job(id).label()
    }

    pub fn job_error(&self, id: &str) -> String {
        match self.job(id) {
            JobState::Failed { error, .. } => error.clone(),
            other => panic!("Job '{}' did not fail: {:?}", id, other),
        }
    }

    pub fn output(&self, job: &str, key: &str) -> Option<String> {
        self.pipeline.job_outputs(job).and_then(|o| o.get(key)).cloned()
    }

    /// Steps started by `job`, in order
    pub fn steps_run(&self, job: &str) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::StepStarted { job_id, step_id } if job_id == job => {
                    Some(step_id.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn job_started(&self, job: &str) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, ExecutionEvent::JobStarted { job_id } if job_id == job))
    }

    /// Ids of the jobs in the order they started
    pub fn start_order(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::JobStarted { job_id } => Some(job_id.clone()),
                _ => None,
            })
            .collect()
    }
}
