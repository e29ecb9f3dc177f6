//! In-memory status cache: node id → latest health result.
//!
//! The map is copy-on-write behind an `RwLock<Arc<..>>`. Readers clone the
//! `Arc` and get an immutable snapshot that later writes never touch, so a
//! reader sees either the old or the new record for a node, never a mix.
//! Writers replace whole records; there is no history and no expiry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::types::{HealthResult, NodeId};

/// Immutable point-in-time view of the cache.
pub type StatusSnapshot = Arc<HashMap<NodeId, HealthResult>>;

/// Thread-safe, memory-only cache of the latest probe result per node.
#[derive(Clone, Default)]
pub struct StatusCache {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest result for a node, replacing any previous one.
    pub fn set(&self, node_id: NodeId, result: HealthResult) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut guard).insert(node_id, result);
    }

    /// Store a batch of results under a single write, keyed by each result's node id.
    ///
    /// Later entries for the same id win.
    pub fn set_many(&self, results: impl IntoIterator<Item = HealthResult>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let map = Arc::make_mut(&mut guard);
        let mut written = 0usize;
        for result in results {
            map.insert(result.node_id, result);
            written += 1;
        }
        debug!(written, total = map.len(), "status cache updated");
    }

    pub fn get(&self, node_id: NodeId) -> Option<HealthResult> {
        self.snapshot().get(&node_id).cloned()
    }

    /// All cached results, in ascending node id order.
    pub fn get_all(&self) -> Vec<HealthResult> {
        let snapshot = self.snapshot();
        let mut results: Vec<HealthResult> = snapshot.values().cloned().collect();
        results.sort_by_key(|r| r.node_id);
        results
    }

    /// A consistent view of the whole cache.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(HashMap::new());
        debug!("status cache cleared");
    }
}
