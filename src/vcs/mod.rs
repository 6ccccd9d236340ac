//! Version control stages used by the integration pipeline
//!
//! Each pipeline stage is its own capability so it can be implemented,
//! mocked and tested in isolation. [`GitWorkspace`] implements all of them
//! on top of the `git` CLI; [`Stages`] bundles one implementation per stage.

mod git;

pub use git::{GitWorkspace, REFINERY_DIR};

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of a dry-run integration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    /// Source integrates cleanly; the merged result is staged for testing
    Clean,
    /// Source conflicts with the target
    Conflicted {
        /// Conflicting paths
        files: Vec<String>,
    },
}

/// Result of one test attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// Tests passed
    Passed,
    /// Tests failed
    Failed {
        /// Tail of the test output
        output: String,
    },
}

/// Result of an automated rebase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// Source was rebased and published
    Rebased,
    /// Rebase stopped on conflicts and was abandoned
    Conflicted {
        /// Conflicting paths
        files: Vec<String>,
    },
}

/// Brings source and target branches up to date
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `branch` and `target` from the remote
    async fn fetch(&self, branch: &str, target: &str) -> Result<()>;
}

/// Attempts a dry-run integration of a source branch
#[async_trait]
pub trait ConflictChecker: Send + Sync {
    /// Integrate `branch` into `target` without publishing
    async fn check_conflicts(&self, branch: &str, target: &str) -> Result<ConflictCheck>;
}

/// Runs the configured test command against the merged result
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Run one test attempt for the staged result of `target`
    async fn run_tests(&self, command: &str, target: &str) -> Result<TestOutcome>;
}

/// Publishes the staged integration
#[async_trait]
pub trait Merger: Send + Sync {
    /// Finalize the merge of `branch` into `target`, returning the merge commit
    async fn merge(&self, branch: &str, target: &str) -> Result<String>;
}

/// Removes merged source branches
#[async_trait]
pub trait BranchCleaner: Send + Sync {
    /// Delete `branch` from the remote
    async fn delete_branch(&self, branch: &str) -> Result<()>;
}

/// Rebases a source branch onto its target
#[async_trait]
pub trait Rebaser: Send + Sync {
    /// Rebase `branch` onto the current `onto` and publish it
    async fn rebase(&self, branch: &str, onto: &str) -> Result<RebaseOutcome>;
}

/// One implementation per pipeline stage
#[derive(Clone)]
pub struct Stages {
    /// Fetch stage
    pub fetcher: Arc<dyn Fetcher>,
    /// Conflict check stage
    pub conflicts: Arc<dyn ConflictChecker>,
    /// Test stage
    pub tests: Arc<dyn TestRunner>,
    /// Merge stage
    pub merger: Arc<dyn Merger>,
    /// Cleanup stage
    pub cleaner: Arc<dyn BranchCleaner>,
    /// Rebase used by the auto-rebase strategy
    pub rebaser: Arc<dyn Rebaser>,
}

impl Stages {
    /// Use a single backend for every stage
    pub fn uniform<B>(backend: Arc<B>) -> Self
    where
        B: Fetcher + ConflictChecker + TestRunner + Merger + BranchCleaner + Rebaser + 'static,
    {
        Self {
            fetcher: backend.clone(),
            conflicts: backend.clone(),
            tests: backend.clone(),
            merger: backend.clone(),
            cleaner: backend.clone(),
            rebaser: backend,
        }
    }
}
