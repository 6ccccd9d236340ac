//! Shared test utilities

#![allow(dead_code)]

mod mock_stages;
mod mock_tracker;
mod temp_git;

pub use mock_stages::MockStages;
pub use mock_tracker::{CloseCall, MockTracker, UpdateCall};
pub use temp_git::{TempGitRig, git_available};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use refinery::config::MergeQueueConfig;
use refinery::error::{Error, Result};
use refinery::escalation::{EscalationRequest, Escalator};
use refinery::types::{IssueStatus, MERGE_REQUEST_KIND, MergeRequest};
use std::sync::{Arc, Mutex};

/// Event log shared between mocks so tests can assert cross-collaborator order
pub type Events = Arc<Mutex<Vec<String>>>;

/// New empty event log
pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

/// Position of the first event starting with `prefix`
pub fn position(events: &Events, prefix: &str) -> Option<usize> {
    events
        .lock()
        .unwrap()
        .iter()
        .position(|e| e.starts_with(prefix))
}

/// Description block for a merge request
pub fn description(branch: &str, target: &str, worker: &str) -> String {
    format!("Ready to merge.\n\nbranch: {branch}\ntarget: {target}\nworker: {worker}\n")
}

/// Open merge request created `age_minutes` ago
pub fn make_mr(id: &str, priority: u32, age_minutes: i64, description: &str) -> MergeRequest {
    MergeRequest {
        id: id.to_string(),
        title: format!("Merge {id}"),
        description: description.to_string(),
        status: IssueStatus::Open,
        priority,
        issue_type: MERGE_REQUEST_KIND.to_string(),
        created_at: Utc::now() - Duration::minutes(age_minutes),
        assignee: None,
        notes: None,
    }
}

/// Open merge request for `branch` into main by worker `nux`
pub fn simple_mr(id: &str, branch: &str) -> MergeRequest {
    make_mr(id, 2, 10, &description(branch, "main", "nux"))
}

/// Configuration suited to fast tests: no tests, short poll
pub fn test_config() -> MergeQueueConfig {
    MergeQueueConfig {
        run_tests: false,
        poll_interval: std::time::Duration::from_millis(20),
        ..MergeQueueConfig::default()
    }
}

/// Escalator that records every request
#[derive(Default)]
pub struct RecordingEscalator {
    requests: Mutex<Vec<EscalationRequest>>,
    error: Mutex<Option<String>>,
}

impl RecordingEscalator {
    /// Requests received so far
    pub fn requests(&self) -> Vec<EscalationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Make `escalate` return an error (after recording)
    pub fn fail(&self, msg: &str) {
        *self.error.lock().unwrap() = Some(msg.to_string());
    }
}

#[async_trait]
impl Escalator for RecordingEscalator {
    async fn escalate(&self, request: &EscalationRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        match self.error.lock().unwrap().clone() {
            Some(msg) => Err(Error::Escalation(msg)),
            None => Ok(()),
        }
    }
}
