//! Mock VCS stages for testing
//!
//! One struct implements every stage trait. Outcomes are scripted per call
//! (queues fall back to the happy path when empty) and every call is
//! recorded, both locally and in the shared event log.

use super::Events;
use async_trait::async_trait;
use refinery::error::{Error, Result};
use refinery::vcs::{
    BranchCleaner, ConflictCheck, ConflictChecker, Fetcher, Merger, RebaseOutcome, Rebaser,
    Stages, TestOutcome, TestRunner,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Concurrency {
    active: HashMap<String, usize>,
    active_total: usize,
    max_per_target: HashMap<String, usize>,
    max_total: usize,
}

/// Scripted implementation of every pipeline stage
pub struct MockStages {
    events: Events,
    calls: Mutex<Vec<String>>,
    // Scripted outcomes
    conflict_results: Mutex<VecDeque<ConflictCheck>>,
    test_results: Mutex<VecDeque<TestOutcome>>,
    rebase_results: Mutex<VecDeque<RebaseOutcome>>,
    conflict_delay: Mutex<Duration>,
    concurrency: Mutex<Concurrency>,
    // Error injection
    error_on_fetch: Mutex<Option<String>>,
    error_on_merge: Mutex<Option<String>>,
    error_on_cleanup: Mutex<Option<String>>,
    error_on_rebase: Mutex<Option<String>>,
}

impl MockStages {
    /// Create stages that succeed at everything, with their own event log
    pub fn new() -> Self {
        Self::with_events(super::events())
    }

    /// Create stages recording into a shared event log
    pub fn with_events(events: Events) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            conflict_results: Mutex::new(VecDeque::new()),
            test_results: Mutex::new(VecDeque::new()),
            rebase_results: Mutex::new(VecDeque::new()),
            conflict_delay: Mutex::new(Duration::ZERO),
            concurrency: Mutex::new(Concurrency::default()),
            error_on_fetch: Mutex::new(None),
            error_on_merge: Mutex::new(None),
            error_on_cleanup: Mutex::new(None),
            error_on_rebase: Mutex::new(None),
        }
    }

    /// Bundle as engine stages
    pub fn stages(self: &Arc<Self>) -> Stages {
        Stages::uniform(self.clone())
    }

    // === Scripting methods ===

    /// Queue a conflict for the next conflict check
    pub fn push_conflict(&self, files: &[&str]) {
        self.conflict_results
            .lock()
            .unwrap()
            .push_back(ConflictCheck::Conflicted {
                files: files.iter().map(ToString::to_string).collect(),
            });
    }

    /// Queue test outcomes, consumed one per attempt
    pub fn push_tests(&self, outcomes: &[bool]) {
        let mut queue = self.test_results.lock().unwrap();
        for passed in outcomes {
            queue.push_back(if *passed {
                TestOutcome::Passed
            } else {
                TestOutcome::Failed {
                    output: "FAILED test_widget".to_string(),
                }
            });
        }
    }

    /// Queue a conflicted rebase
    pub fn push_rebase_conflict(&self, files: &[&str]) {
        self.rebase_results
            .lock()
            .unwrap()
            .push_back(RebaseOutcome::Conflicted {
                files: files.iter().map(ToString::to_string).collect(),
            });
    }

    /// Hold each conflict check for `delay` to expose overlap
    pub fn set_conflict_delay(&self, delay: Duration) {
        *self.conflict_delay.lock().unwrap() = delay;
    }

    // === Error injection methods ===

    /// Make `fetch` return an error
    pub fn fail_fetch(&self, msg: &str) {
        *self.error_on_fetch.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `merge` return an error
    pub fn fail_merge(&self, msg: &str) {
        *self.error_on_merge.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `delete_branch` return an error
    pub fn fail_cleanup(&self, msg: &str) {
        *self.error_on_cleanup.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `rebase` return an error
    pub fn fail_rebase(&self, msg: &str) {
        *self.error_on_rebase.lock().unwrap() = Some(msg.to_string());
    }

    // === Inspection methods ===

    /// All recorded calls, e.g. `fetch feat main`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls of one stage
    pub fn calls_to(&self, stage: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split_whitespace().next() == Some(stage))
            .collect()
    }

    /// Most conflict checks seen running at once for `target`
    pub fn max_parallel_for(&self, target: &str) -> usize {
        self.concurrency
            .lock()
            .unwrap()
            .max_per_target
            .get(target)
            .copied()
            .unwrap_or(0)
    }

    /// Most conflict checks seen running at once overall
    pub fn max_parallel_total(&self) -> usize {
        self.concurrency.lock().unwrap().max_total
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call.clone());
        self.events.lock().unwrap().push(call);
    }

    fn enter(&self, target: &str) {
        let mut c = self.concurrency.lock().unwrap();
        let active = c.active.entry(target.to_string()).or_default();
        *active += 1;
        let now = *active;
        c.active_total += 1;
        let total = c.active_total;
        let max = c.max_per_target.entry(target.to_string()).or_default();
        *max = (*max).max(now);
        c.max_total = c.max_total.max(total);
    }

    fn exit(&self, target: &str) {
        let mut c = self.concurrency.lock().unwrap();
        if let Some(active) = c.active.get_mut(target) {
            *active -= 1;
        }
        c.active_total -= 1;
    }
}

impl Default for MockStages {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MockStages {
    async fn fetch(&self, branch: &str, target: &str) -> Result<()> {
        self.record(format!("fetch {branch} {target}"));
        match self.error_on_fetch.lock().unwrap().clone() {
            Some(msg) => Err(Error::Vcs(msg)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConflictChecker for MockStages {
    async fn check_conflicts(&self, branch: &str, target: &str) -> Result<ConflictCheck> {
        self.record(format!("check {branch} {target}"));
        self.enter(target);
        let delay = *self.conflict_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.exit(target);
        Ok(self
            .conflict_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConflictCheck::Clean))
    }
}

#[async_trait]
impl TestRunner for MockStages {
    async fn run_tests(&self, command: &str, target: &str) -> Result<TestOutcome> {
        self.record(format!("test {target} {command}"));
        Ok(self
            .test_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TestOutcome::Passed))
    }
}

#[async_trait]
impl Merger for MockStages {
    async fn merge(&self, branch: &str, target: &str) -> Result<String> {
        self.record(format!("merge {branch} {target}"));
        match self.error_on_merge.lock().unwrap().clone() {
            Some(msg) => Err(Error::Vcs(msg)),
            None => Ok(format!("sha-{}", branch.replace('/', "-"))),
        }
    }
}

#[async_trait]
impl BranchCleaner for MockStages {
    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.record(format!("delete {branch}"));
        match self.error_on_cleanup.lock().unwrap().clone() {
            Some(msg) => Err(Error::Vcs(msg)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Rebaser for MockStages {
    async fn rebase(&self, branch: &str, onto: &str) -> Result<RebaseOutcome> {
        self.record(format!("rebase {branch} {onto}"));
        if let Some(msg) = self.error_on_rebase.lock().unwrap().clone() {
            return Err(Error::Vcs(msg));
        }
        Ok(self
            .rebase_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RebaseOutcome::Rebased))
    }
}
