//! Merge queue engine
//!
//! The engine polls the tracker for ready merge requests and drives each
//! one through the integration pipeline:
//!
//! 1. **Select** - take the front of the tracker's ready list ([`selector`])
//! 2. **Claim** - move the item to `in_progress` before any other work
//! 3. **Process** - run the pipeline under the target's lock ([`Pipeline`])
//! 4. **Reconcile** - close on success, hand back on failure ([`Reconciler`])
//!
//! Cycles never overlap. Within a cycle up to `max_concurrent` items run at
//! once, but items sharing an effective target branch take turns.

mod claim;
mod locks;
mod pipeline;
mod reconcile;
pub mod selector;

pub use claim::{ClaimLedger, ClaimManager, ClaimRecord, LEDGER_VERSION};
pub use locks::TargetLocks;
pub use pipeline::Pipeline;
pub use reconcile::{EscalationPolicy, Reconciler};

use crate::config::{ConflictStrategy, MergeQueueConfig};
use crate::error::{Error, Result};
use crate::escalation::Escalator;
use crate::tracker::Tracker;
use crate::types::{MERGE_REQUEST_KIND, MergeRequest, ProcessResult};
use crate::vcs::Stages;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Optional collaborators for an [`Engineer`]
pub struct EngineOptions {
    /// Where claims are recorded for crash recovery
    pub ledger: ClaimLedger,
    /// Escalation hook and policy for repeated failures
    pub escalation: Option<(Arc<dyn Escalator>, EscalationPolicy)>,
    /// Sender identity for escalations
    pub sender: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ledger: ClaimLedger::in_memory(),
            escalation: None,
            sender: String::new(),
        }
    }
}

/// Result of one item processed during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Merge request id
    pub id: String,
    /// Final pipeline result
    pub result: ProcessResult,
}

/// Drives one claimed item from pipeline to reconciliation
struct Worker {
    pipeline: Pipeline,
    reconciler: Reconciler,
    claims: Arc<ClaimManager>,
    locks: TargetLocks,
    strategy: ConflictStrategy,
}

impl Worker {
    async fn drive(&self, mr: MergeRequest) -> ItemOutcome {
        let target = mr
            .fields()
            .ok()
            .map(|fields| self.pipeline.target_for(&fields).to_string());
        let _slot = match target {
            Some(ref target) => Some(self.locks.acquire(target).await),
            None => None,
        };

        let mut result = self.pipeline.process(&mr).await;
        if self.strategy == ConflictStrategy::AutoRebase
            && (result.is_conflict() || result.tests_failed())
        {
            result = self.rebase_and_resubmit(&mr, result).await;
        }

        if self.reconciler.reconcile(&mr, &result).await {
            self.claims.release(&mr.id);
        } else {
            warn!(mr_id = %mr.id, "claim kept, item will be reopened by recovery");
        }
        ItemOutcome { id: mr.id, result }
    }

    /// One automated rebase and one more pass through the pipeline
    async fn rebase_and_resubmit(&self, mr: &MergeRequest, first: ProcessResult) -> ProcessResult {
        info!(mr_id = %mr.id, error = %first.error(), "attempting automatic rebase");
        match self.pipeline.rebase(mr).await {
            None => {
                let retried = self.pipeline.process(mr).await;
                if !retried.is_success() {
                    info!(mr_id = %mr.id, "resubmission after rebase failed, assigning back");
                }
                retried
            }
            Some(failure) => {
                warn!(mr_id = %mr.id, error = %failure.error(), "automatic rebase failed");
                failure
            }
        }
    }
}

/// The merge queue processing engine
pub struct Engineer {
    config: Arc<MergeQueueConfig>,
    tracker: Arc<dyn Tracker>,
    claims: Arc<ClaimManager>,
    worker: Arc<Worker>,
    stop: CancellationToken,
}

impl Engineer {
    /// Create an engine with an in-memory claim ledger and no escalation
    pub fn new(config: MergeQueueConfig, tracker: Arc<dyn Tracker>, stages: Stages) -> Self {
        Self::with_options(config, tracker, stages, EngineOptions::default())
    }

    /// Create an engine with explicit collaborators
    pub fn with_options(
        config: MergeQueueConfig,
        tracker: Arc<dyn Tracker>,
        stages: Stages,
        options: EngineOptions,
    ) -> Self {
        let config = Arc::new(config);
        let claims = Arc::new(ClaimManager::new(tracker.clone(), options.ledger));

        let mut reconciler = Reconciler::new(tracker.clone()).with_sender(options.sender);
        if let Some((escalator, policy)) = options.escalation {
            reconciler = reconciler.with_escalator(escalator, policy);
        }

        let worker = Arc::new(Worker {
            pipeline: Pipeline::new(stages, config.clone()),
            reconciler,
            claims: claims.clone(),
            locks: TargetLocks::default(),
            strategy: config.conflict_strategy(),
        });

        Self {
            config,
            tracker,
            claims,
            worker,
            stop: CancellationToken::new(),
        }
    }

    /// Resolved configuration
    pub fn config(&self) -> &MergeQueueConfig {
        &self.config
    }

    /// Request shutdown; safe to call any number of times
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Token cancelled by [`Engineer::stop`]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    fn shutdown_requested(&self, cancel: &CancellationToken) -> bool {
        cancel.is_cancelled() || self.stop.is_cancelled()
    }

    /// Run until `cancel` fires or [`Engineer::stop`] is called
    ///
    /// Fails immediately when the merge queue is disabled. Tracker and
    /// ledger errors inside a cycle are logged and the loop keeps going.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if !self.config.enabled {
            return Err(Error::Disabled);
        }
        let period = self.config.poll_interval;
        if period.is_zero() {
            return Err(Error::Config("poll_interval must be positive".to_string()));
        }

        info!(
            target_branch = %self.config.target_branch,
            poll_interval = ?period,
            max_concurrent = self.config.worker_slots(),
            "merge queue starting"
        );

        match self.recover().await {
            Ok(ids) if !ids.is_empty() => warn!(count = ids.len(), "reopened stranded claims"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "claim recovery failed"),
        }

        if !self.shutdown_requested(&cancel) {
            self.cycle().await?;
        }

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.shutdown_requested(&cancel) {
                info!("merge queue stopped");
                return Ok(());
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("merge queue cancelled");
                    return Ok(());
                }
                () = self.stop.cancelled() => {
                    info!("merge queue stopped");
                    return Ok(());
                }
                _ = ticker.tick() => self.cycle().await?,
            }
        }
    }

    async fn cycle(&self) -> Result<()> {
        match self.process_once().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(error = %e, "cycle failed");
                Ok(())
            }
        }
    }

    /// Reopen items left `in_progress` by an interrupted run
    pub async fn recover(&self) -> Result<Vec<String>> {
        self.claims.recover_stranded().await
    }

    /// Run exactly one cycle
    ///
    /// An empty ready list is not an error. A tracker error while listing or
    /// claiming aborts the cycle; items already claimed are still processed
    /// and reconciled before the error is returned.
    pub async fn process_once(&self) -> Result<Vec<ItemOutcome>> {
        if self.stop.is_cancelled() {
            return Ok(Vec::new());
        }

        let ready = self.tracker.ready_with_type(MERGE_REQUEST_KIND).await?;
        self.worker.reconciler.retain_failures(&ready);
        let batch = selector::select_batch(ready, self.config.worker_slots());
        if batch.is_empty() {
            debug!("no ready merge requests");
            return Ok(Vec::new());
        }

        let mut running = JoinSet::new();
        let mut claim_error = None;
        for mr in batch {
            info!(mr_id = %mr.id, title = %mr.title, priority = mr.priority, "processing");
            if let Err(e) = self.claims.claim(&mr).await {
                error!(mr_id = %mr.id, error = %e, "claim failed");
                claim_error = Some(e);
                break;
            }
            let worker = self.worker.clone();
            running.spawn(async move { worker.drive(mr).await });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "merge request task failed"),
            }
        }

        claim_error.map_or(Ok(outcomes), Err)
    }
}
