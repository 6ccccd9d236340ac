//! Per-target exclusion
//!
//! Pipelines for different targets run in parallel; pipelines for the same
//! effective target take turns. Slots nobody holds or waits on are dropped
//! on the next acquire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Lazily created lock per target branch
#[derive(Default)]
pub struct TargetLocks {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TargetLocks {
    /// Wait for exclusive use of `target`
    pub async fn acquire(&self, target: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.retain(|name, slot| name == target || Arc::strong_count(slot) > 1);
            slots.entry(target.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Number of targets with a live slot
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no target has a slot
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
