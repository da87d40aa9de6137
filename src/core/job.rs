//! Job graph - nodes, dependency edges and a gate per node

use crate::core::{error::PipelineError, gate::Predicate};
use std::collections::{BTreeMap, HashSet};

/// Job identifiers used by the standard release workflow
pub const RESOLVE_VERSION: &str = "resolve-version";
pub const VERIFY: &str = "verify";
pub const RELEASE: &str = "release";

/// A node in the job graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNode {
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Upstream jobs that must succeed before this one starts
    pub dependencies: Vec<String>,

    /// Gate evaluated against the trigger event
    pub predicate: Predicate,
}

impl JobNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            dependencies: Vec::new(),
            predicate,
        }
    }

    pub fn depends_on(mut self, job_id: impl Into<String>) -> Self {
        self.dependencies.push(job_id.into());
        self
    }
}

/// Directed acyclic graph of jobs
#[derive(Debug, Clone)]
pub struct JobGraph {
    nodes: BTreeMap<String, JobNode>,

    /// Topological order, deterministic for a given set of nodes
    execution_order: Vec<String>,
}

impl JobGraph {
    /// Build a graph, rejecting duplicate ids, unknown dependencies and cycles
    pub fn new(nodes: Vec<JobNode>) -> Result<Self, PipelineError> {
        let mut map = BTreeMap::new();
        for node in nodes {
            if map.contains_key(&node.id) {
                return Err(PipelineError::Graph(format!("Duplicate job ID: {}", node.id)));
            }
            map.insert(node.id.clone(), node);
        }

        for node in map.values() {
            for dep in &node.dependencies {
                if !map.contains_key(dep) {
                    return Err(PipelineError::Graph(format!(
                        "Job '{}' depends on non-existent job '{}'",
                        node.id, dep
                    )));
                }
            }
        }

        let execution_order = Self::topological_sort(&map)?;

        Ok(Self {
            nodes: map,
            execution_order,
        })
    }

    /// The standard workflow: version resolution and verification run
    /// independently, release waits for both
    pub fn release_workflow() -> Result<Self, PipelineError> {
        let nodes = vec![
            JobNode::new(RESOLVE_VERSION, "Resolve version", Predicate::release()),
            JobNode::new(VERIFY, "Verify", Predicate::unless_suppressed()),
            JobNode::new(RELEASE, "Release", Predicate::release())
                .depends_on(RESOLVE_VERSION)
                .depends_on(VERIFY),
        ];
        Self::new(nodes)
    }

    pub fn node(&self, id: &str) -> Option<&JobNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &JobNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Job ids in dependency order
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Jobs that list `id` as a direct dependency
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.dependencies.iter().any(|d| d == id))
            .map(|n| n.id.as_str())
            .collect()
    }

    fn topological_sort(nodes: &BTreeMap<String, JobNode>) -> Result<Vec<String>, PipelineError> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();

        // BTreeMap keys are sorted, so the order is deterministic
        for id in nodes.keys() {
            Self::visit(id, nodes, &mut visited, &mut in_progress, &mut result)?;
        }

        Ok(result)
    }

    fn visit(
        id: &str,
        nodes: &BTreeMap<String, JobNode>,
        visited: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        if visited.contains(id) {
            return Ok(());
        }
        if !in_progress.insert(id.to_string()) {
            return Err(PipelineError::Graph(format!(
                "Cycle detected in job graph involving '{}'",
                id
            )));
        }

        if let Some(node) = nodes.get(id) {
            for dep in &node.dependencies {
                Self::visit(dep, nodes, visited, in_progress, result)?;
            }
        }

        in_progress.remove(id);
        visited.insert(id.to_string());
        result.push(id.to_string());
        Ok(())
    }
}
