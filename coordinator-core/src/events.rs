// Typed broadcast hooks. `IssuedMilestone` and `IssuedCheckpointBlock`
// fire strictly after the corresponding durable action has succeeded;
// `SoftError` fires at the point a soft condition is detected, whether
// or not it aborts the enclosing operation; `QuorumFinished` fires once
// per quorum round regardless of outcome.

use coordinator_base::{BlockId, CheckpointIndex, CoordinatorError, MilestoneId, MilestoneIndex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub enum Event {
    IssuedCheckpointBlock {
        checkpoint_index: CheckpointIndex,
        chunk_index: u32,
        chunk_count: u32,
        block_id: BlockId,
    },
    IssuedMilestone {
        index: MilestoneIndex,
        milestone_id: MilestoneId,
        block_id: BlockId,
    },
    SoftError {
        message: String,
    },
    QuorumFinished {
        elapsed: Duration,
        error: Option<String>,
    },
}

/// Broadcast event bus. Subscribers that lag behind the default capacity
/// drop the oldest events rather than stalling a publisher; callers that
/// need every event should subscribe before issuance starts and drain
/// promptly.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, event: Event) {
        // No subscribers is a normal, expected state; a dropped `Result`
        // here is not an error.
        let _ = self.tx.send(event);
    }

    pub(crate) fn publish_soft_error(&self, err: &CoordinatorError) {
        tracing::warn!(error = %err, "soft error");
        self.publish(Event::SoftError { message: err.to_string() });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
