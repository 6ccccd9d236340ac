//! Issue tracker collaborator
//!
//! The engine only needs three operations from the tracker: list ready
//! items of a kind, update fields of one item, and close items with a
//! reason. Status writes go through [`Tracker::update`], which the tracker
//! is trusted to apply atomically per item.

mod bd;

pub use bd::BdTracker;

use crate::error::Result;
use crate::types::{IssueStatus, MergeRequest};
use async_trait::async_trait;

/// Partial update of a tracked item; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// New status
    pub status: Option<IssueStatus>,
    /// New assignee
    pub assignee: Option<String>,
    /// Note attached to the item
    pub notes: Option<String>,
}

impl UpdateOptions {
    /// Update that only changes status
    pub const fn status(status: IssueStatus) -> Self {
        Self {
            status: Some(status),
            assignee: None,
            notes: None,
        }
    }

    /// Attach a note
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Set the assignee
    #[must_use]
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }
}

/// Tracker operations consumed by the engine
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Ready items of the given issue type
    ///
    /// Callers rely on the order: priority descending, then oldest first.
    async fn ready_with_type(&self, kind: &str) -> Result<Vec<MergeRequest>>;

    /// Apply a partial update to one item
    async fn update(&self, id: &str, options: &UpdateOptions) -> Result<()>;

    /// Close items with an audit reason
    async fn close_with_reason(&self, reason: &str, ids: &[&str]) -> Result<()>;
}
