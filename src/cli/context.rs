//! Shared command context for CLI commands
//!
//! Loads everything `run`, `once` and `recover` need from the rig and
//! wires the engine's collaborators together.

use refinery::config::MergeQueueConfig;
use refinery::engine::{ClaimLedger, EngineOptions, Engineer, EscalationPolicy};
use refinery::error::Result;
use refinery::escalation::{
    EscalationConfig, Escalator, LogMailer, RoutingEscalator, detect_sender_from_env,
};
use refinery::tracker::{BdTracker, Tracker};
use refinery::vcs::{GitWorkspace, Stages};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything loaded from the rig before the engine starts
pub struct CommandContext {
    /// Rig root
    pub rig: PathBuf,
    /// Resolved merge queue configuration
    pub config: MergeQueueConfig,
    /// Escalation routes and contacts
    pub escalation: EscalationConfig,
    /// Issue tracker for the rig
    pub tracker: Arc<dyn Tracker>,
}

impl CommandContext {
    /// Load configuration for the rig at `path`
    pub fn new(path: &Path) -> Result<Self> {
        let rig = path.to_path_buf();
        let config = MergeQueueConfig::load(&rig)?;
        let escalation = EscalationConfig::load_or_create(&EscalationConfig::path(&rig))?;
        let tracker: Arc<dyn Tracker> = Arc::new(BdTracker::new(&rig));

        Ok(Self {
            rig,
            config,
            escalation,
            tracker,
        })
    }

    /// Build the engine with git stages, the on-disk claim ledger and
    /// routed escalation
    pub fn engine(&self) -> Result<Engineer> {
        let stages = Stages::uniform(Arc::new(GitWorkspace::new(&self.rig)));
        let policy = EscalationPolicy {
            stale_threshold: self.escalation.stale_threshold(),
            max_reescalations: self.escalation.max_reescalations,
            ..EscalationPolicy::default()
        };
        let escalator: Arc<dyn Escalator> = Arc::new(
            RoutingEscalator::new(self.escalation.clone(), Arc::new(LogMailer))
                .with_tracker(self.tracker.clone()),
        );

        let options = EngineOptions {
            ledger: ClaimLedger::open(&self.rig)?,
            escalation: Some((escalator, policy)),
            sender: detect_sender_from_env(),
        };

        Ok(Engineer::with_options(
            self.config.clone(),
            self.tracker.clone(),
            stages,
            options,
        ))
    }
}
