//! Gating predicates evaluated against the trigger event

use crate::core::trigger::TriggerEvent;
use regex::Regex;

/// Pattern for matching a commit message (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum ConditionPattern {
    /// Simple string contains match
    Simple(String),
    /// Regular expression match
    Regex(Regex),
}

impl ConditionPattern {
    /// Check if the pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        match self {
            ConditionPattern::Simple(pattern) => text.contains(pattern.as_str()),
            ConditionPattern::Regex(regex) => regex.is_match(text),
        }
    }

    pub fn display(&self) -> String {
        match self {
            ConditionPattern::Simple(s) => s.clone(),
            ConditionPattern::Regex(r) => format!("[regex: {}]", r.as_str()),
        }
    }
}

/// Pipeline-wide settings the predicates are evaluated with
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Ref prefix identifying tag pushes
    pub tag_prefix: String,

    /// Sentinel in the head commit message that disables the pipeline
    pub suppression_marker: ConditionPattern,

    /// Actor name of the automation account
    pub bot_actor: String,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            tag_prefix: "refs/tags/".to_string(),
            suppression_marker: ConditionPattern::Simple("[skip ci]".to_string()),
            bot_actor: "github-actions[bot]".to_string(),
        }
    }
}

impl GateSettings {
    /// True when the head commit carries the suppression marker
    pub fn is_suppressed(&self, event: &TriggerEvent) -> bool {
        self.suppression_marker.matches(&event.head_commit_message)
    }

    /// True when the event was authored by the automation account
    pub fn is_bot(&self, event: &TriggerEvent) -> bool {
        !self.bot_actor.is_empty() && event.actor == self.bot_actor
    }
}

/// Outcome of evaluating a predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    Skip(String),
}

impl GateDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, GateDecision::Run)
    }
}

/// Boolean condition over the trigger event deciding whether a job runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Always,
    TagPush,
    NotSuppressed,
    NotBot,
    /// Every inner predicate must hold; the first failing one gives the reason
    All(Vec<Predicate>),
}

impl Predicate {
    /// Gate for jobs that run on every trigger except suppressed or
    /// bot-authored events
    pub fn unless_suppressed() -> Self {
        Predicate::All(vec![Predicate::NotSuppressed, Predicate::NotBot])
    }

    /// Gate for release jobs: tag pushes that are neither suppressed nor
    /// bot-authored
    pub fn release() -> Self {
        Predicate::All(vec![
            Predicate::TagPush,
            Predicate::NotSuppressed,
            Predicate::NotBot,
        ])
    }

    pub fn evaluate(&self, event: &TriggerEvent, settings: &GateSettings) -> GateDecision {
        match self {
            Predicate::Always => GateDecision::Run,
            Predicate::TagPush => {
                if event.is_tag_push() {
                    GateDecision::Run
                } else {
                    GateDecision::Skip(format!("{} event is not a tag push", event.kind))
                }
            }
            Predicate::NotSuppressed => {
                if settings.is_suppressed(event) {
                    GateDecision::Skip(format!(
                        "head commit carries suppression marker {}",
                        settings.suppression_marker.display()
                    ))
                } else {
                    GateDecision::Run
                }
            }
            Predicate::NotBot => {
                if settings.is_bot(event) {
                    GateDecision::Skip(format!("event authored by automation actor '{}'", event.actor))
                } else {
                    GateDecision::Run
                }
            }
            Predicate::All(inner) => inner
                .iter()
                .map(|p| p.evaluate(event, settings))
                .find(|d| !d.should_run())
                .unwrap_or(GateDecision::Run),
        }
    }
}
