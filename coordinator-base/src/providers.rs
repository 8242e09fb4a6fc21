// Process-boundary contracts. Everything here is implemented by the
// surrounding node software, not by this workspace: merkle computation,
// signing, sending, migration state, and sync status are all injected.
// Every call here suspends, so every trait is async except the
// back-pressure predicate, which the source models as a plain
// zero-argument function.

use crate::{BlockId, MilestoneId, MilestoneIndex, MilestoneMerkleRoots, Result};
use async_trait::async_trait;

/// Computes the whiteflag merkle roots for a candidate milestone. Must be
/// deterministic on its inputs; the coordinator runs it on a context
/// decoupled from shutdown signals so a cancelled run never leaves a
/// half-signed milestone in flight.
#[async_trait]
pub trait MerkleRootProvider: Send + Sync {
    async fn compute_white_flag(
        &self,
        index: MilestoneIndex,
        timestamp: u64,
        parents: &[BlockId],
        previous_milestone_id: MilestoneId,
    ) -> Result<MilestoneMerkleRoots>;
}

/// Signs an assembled milestone payload. Individual failures are soft
/// (the assembler retries); exhaustion of the retry budget is critical.
#[async_trait]
pub trait SignerProvider: Send + Sync {
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Broadcasts an assembled block (milestone or checkpoint) and returns
/// its id.
#[async_trait]
pub trait SendBlockProvider: Send + Sync {
    async fn send_block(&self, payload: &[u8], referenced_index: Option<MilestoneIndex>) -> Result<BlockId>;
}

/// The amount unspent in the last migration treasury output, fetched
/// just-in-time when a migration receipt is attached to a milestone.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LatestTreasuryOutput {
    pub milestone_id: MilestoneId,
    pub amount: u64,
}

/// A migration receipt attached to a milestone: a batch of funds to
/// settle against the treasury. `sum()` is the amount the milestone's
/// new treasury output must subtract from the previous one. `funds` is
/// returned in whatever order the migrator holds it; the caller is
/// responsible for sorting it before attaching it to a milestone.
pub trait MigrationReceipt: Send + Sync {
    fn sum(&self) -> u64;
    fn funds(&self) -> Vec<(String, u64)>;
}

/// Optional collaborator: fetches a pending migration receipt, if any,
/// and records migrator-side state before and after a milestone that
/// attaches one is sent.
#[async_trait]
pub trait MigratorProvider: Send + Sync {
    async fn current_receipt(&self) -> Result<Option<Box<dyn MigrationReceipt>>>;
    async fn treasury_output(&self) -> Result<LatestTreasuryOutput>;
    async fn persist_pre_send(&self) -> Result<()>;
    async fn persist_post_send(&self) -> Result<()>;
}

/// Reports whether the attached node considers itself caught up with
/// the rest of the network. Gates every `IssueCheckpoint`/`IssueMilestone`
/// call.
#[async_trait]
pub trait SyncStatusProvider: Send + Sync {
    async fn is_node_synced(&self) -> bool;
}

/// A registered congestion predicate. The back-pressure gate fires if
/// any registered predicate returns `true`. Synchronous and cheap by
/// contract: callers register these before the run loop starts.
pub trait BackPressureFunc: Fn() -> bool + Send + Sync {}
impl<T: Fn() -> bool + Send + Sync> BackPressureFunc for T {}
