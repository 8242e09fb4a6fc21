// Runtime telemetry for quorum clients. One slot per configured client,
// created once at engine-construction time and mutated only inside
// `QuorumEngine::check_merkle_tree_hash`. A single reader-writer lock
// guards the whole vector, write-locked for the duration of one full
// round so a snapshot reader never observes a torn update and two
// rounds never interleave their writes.

use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QuorumClientStatistic {
    pub group: String,
    pub alias: String,
    pub base_url: String,
    pub response_time_seconds: f64,
    pub last_error: Option<String>,
}

/// Shared, lock-guarded statistics table.
#[derive(Clone)]
pub struct QuorumStats(Arc<RwLock<Vec<QuorumClientStatistic>>>);

impl QuorumStats {
    pub fn new(initial: Vec<QuorumClientStatistic>) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    /// A read-locked copy of the current statistics. Never observes a
    /// round mid-update because rounds hold the write lock for their
    /// whole duration.
    pub async fn snapshot(&self) -> Vec<QuorumClientStatistic> {
        self.0.read().await.clone()
    }

    pub(crate) fn inner(&self) -> &Arc<RwLock<Vec<QuorumClientStatistic>>> {
        &self.0
    }
}
