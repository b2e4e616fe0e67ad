//! Processed-event set.
//!
//! Best-effort, per-process deduplication keyed by Stripe event id. Entries
//! are never evicted and nothing is persisted, so a restart or a second
//! instance will process a redelivered event again. Suppressing duplicates
//! across restarts or instances needs a shared store.

use std::sync::Arc;

use dashmap::DashSet;

/// Ids of events this process has already accepted.
///
/// Cloning is cheap and every clone shares the same set.
#[derive(Debug, Clone, Default)]
pub struct ProcessedEvents {
    ids: Arc<DashSet<String>>,
}

impl ProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically record `event_id`.
    ///
    /// Returns `true` for the first caller only. Concurrent callers racing on
    /// the same id see exactly one `true`.
    pub fn mark_processed(&self, event_id: &str) -> bool {
        self.ids.insert(event_id.to_string())
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.ids.contains(event_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
