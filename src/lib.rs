//! refinery - merge queue processor for agent-produced merge requests
//!
//! Worker agents finish their changes on a branch and file a
//! `merge-request` item in the issue tracker. refinery polls the tracker,
//! claims the most urgent ready item, integrates its branch into the
//! target (fetch, conflict check, tests, merge, cleanup) and writes the
//! outcome back: merged items are closed, failed items are reopened and
//! handed back to their worker, and items that keep failing are escalated.
//!
//! ```text
//! tracker ──ready──▶ Engineer ──claim──▶ Pipeline ──result──▶ Reconciler
//!                                           │                    │
//!                                        Stages (git)      Escalator (routes)
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod tracker;
pub mod types;
pub mod vcs;

pub use config::{ConflictStrategy, MergeQueueConfig};
pub use engine::{EngineOptions, Engineer, ItemOutcome};
pub use error::{Error, Result};
