//! Scenario-based tests for the release workflow

mod helpers;

mod fail_fast;
mod gating;
mod push_conflict;
mod reconcile;
mod tag_release;
