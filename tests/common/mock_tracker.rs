//! Mock issue tracker for testing
//!
//! Keeps items in memory and applies updates the way the real tracker
//! does, so tests can assert on the resulting item state as well as on the
//! calls made.

use super::Events;
use async_trait::async_trait;
use refinery::engine::selector::readiness_order;
use refinery::error::{Error, Result};
use refinery::tracker::{Tracker, UpdateOptions};
use refinery::types::{IssueStatus, MergeRequest};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Call record for `update`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub id: String,
    pub options: UpdateOptions,
}

/// Call record for `close_with_reason`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseCall {
    pub reason: String,
    pub ids: Vec<String>,
}

/// In-memory tracker with call tracking and error injection
pub struct MockTracker {
    items: Mutex<Vec<MergeRequest>>,
    notes: Mutex<HashMap<String, Vec<String>>>,
    events: Events,
    // Call tracking
    ready_calls: AtomicUsize,
    update_calls: Mutex<Vec<UpdateCall>>,
    close_calls: Mutex<Vec<CloseCall>>,
    // Error injection
    error_on_ready: Mutex<Option<String>>,
    error_on_update: Mutex<Option<String>>,
    error_on_update_for: Mutex<HashMap<String, String>>,
    error_on_close: Mutex<Option<String>>,
}

impl MockTracker {
    /// Create an empty tracker with its own event log
    pub fn new() -> Self {
        Self::with_events(super::events())
    }

    /// Create an empty tracker recording into a shared event log
    pub fn with_events(events: Events) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            notes: Mutex::new(HashMap::new()),
            events,
            ready_calls: AtomicUsize::new(0),
            update_calls: Mutex::new(Vec::new()),
            close_calls: Mutex::new(Vec::new()),
            error_on_ready: Mutex::new(None),
            error_on_update: Mutex::new(None),
            error_on_update_for: Mutex::new(HashMap::new()),
            error_on_close: Mutex::new(None),
        }
    }

    /// Add an item
    pub fn add(&self, mr: MergeRequest) {
        self.items.lock().unwrap().push(mr);
    }

    // === Error injection methods ===

    /// Make `ready_with_type` return an error
    pub fn fail_ready(&self, msg: &str) {
        *self.error_on_ready.lock().unwrap() = Some(msg.to_string());
    }

    /// Make every `update` return an error
    pub fn fail_update(&self, msg: &str) {
        *self.error_on_update.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `update` return an error for one item only
    pub fn fail_update_for(&self, id: &str, msg: &str) {
        self.error_on_update_for
            .lock()
            .unwrap()
            .insert(id.to_string(), msg.to_string());
    }

    /// Make `close_with_reason` return an error
    pub fn fail_close(&self, msg: &str) {
        *self.error_on_close.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear all injected errors
    pub fn clear_errors(&self) {
        *self.error_on_ready.lock().unwrap() = None;
        *self.error_on_update.lock().unwrap() = None;
        self.error_on_update_for.lock().unwrap().clear();
        *self.error_on_close.lock().unwrap() = None;
    }

    // === Inspection methods ===

    /// Current copy of an item
    pub fn get(&self, id: &str) -> Option<MergeRequest> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|mr| mr.id == id)
            .cloned()
    }

    /// Current status of an item
    pub fn status_of(&self, id: &str) -> Option<IssueStatus> {
        self.get(id).map(|mr| mr.status)
    }

    /// Notes attached to an item, oldest first
    pub fn notes_for(&self, id: &str) -> Vec<String> {
        self.notes
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `ready_with_type` calls
    pub fn ready_calls(&self) -> usize {
        self.ready_calls.load(Ordering::SeqCst)
    }

    /// Recorded `update` calls, including failed ones
    pub fn update_calls(&self) -> Vec<UpdateCall> {
        self.update_calls.lock().unwrap().clone()
    }

    /// Recorded `close_with_reason` calls, including failed ones
    pub fn close_calls(&self) -> Vec<CloseCall> {
        self.close_calls.lock().unwrap().clone()
    }

    /// Total write calls made
    pub fn mutation_count(&self) -> usize {
        self.update_calls.lock().unwrap().len() + self.close_calls.lock().unwrap().len()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Default for MockTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tracker for MockTracker {
    async fn ready_with_type(&self, kind: &str) -> Result<Vec<MergeRequest>> {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.error_on_ready.lock().unwrap().clone() {
            return Err(Error::Tracker(msg));
        }

        let mut ready: Vec<MergeRequest> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|mr| mr.status == IssueStatus::Open && mr.issue_type == kind)
            .cloned()
            .collect();
        ready.sort_by(readiness_order);
        Ok(ready)
    }

    async fn update(&self, id: &str, options: &UpdateOptions) -> Result<()> {
        self.update_calls.lock().unwrap().push(UpdateCall {
            id: id.to_string(),
            options: options.clone(),
        });
        if let Some(msg) = self.error_on_update.lock().unwrap().clone() {
            return Err(Error::Tracker(msg));
        }
        if let Some(msg) = self.error_on_update_for.lock().unwrap().get(id).cloned() {
            return Err(Error::Tracker(msg));
        }

        let mut items = self.items.lock().unwrap();
        let Some(item) = items.iter_mut().find(|mr| mr.id == id) else {
            return Err(Error::Tracker(format!("no issue {id}")));
        };
        if let Some(status) = options.status {
            item.status = status;
            self.log(format!("update {id} {status}"));
        }
        if let Some(ref assignee) = options.assignee {
            item.assignee = Some(assignee.clone());
        }
        if let Some(ref notes) = options.notes {
            item.notes = Some(notes.clone());
            self.notes
                .lock()
                .unwrap()
                .entry(id.to_string())
                .or_default()
                .push(notes.clone());
        }
        Ok(())
    }

    async fn close_with_reason(&self, reason: &str, ids: &[&str]) -> Result<()> {
        self.close_calls.lock().unwrap().push(CloseCall {
            reason: reason.to_string(),
            ids: ids.iter().map(ToString::to_string).collect(),
        });
        if let Some(msg) = self.error_on_close.lock().unwrap().clone() {
            return Err(Error::Tracker(msg));
        }

        let mut items = self.items.lock().unwrap();
        for id in ids {
            if let Some(item) = items.iter_mut().find(|mr| mr.id == *id) {
                item.status = IssueStatus::Closed;
            }
            self.log(format!("close {id}"));
        }
        Ok(())
    }
}
