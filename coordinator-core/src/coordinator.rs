// The top-level state machine: serializes `Bootstrap`, `IssueCheckpoint`,
// and `IssueMilestone` under a single milestone mutex that covers the
// whole pipeline from sync-check through state persistence, gates on
// synchronization and back-pressure, sequences quorum -> sign -> persist
// -> broadcast, and publishes events after each durable action commits.

use crate::backpressure::BackPressureGate;
use crate::events::{Event, EventBus};
use coordinator_assemble::{canonicalize_parents, CheckpointAssembler, MilestoneAssembler, TreasuryTransactionPayload};
use coordinator_base::{
    BackPressureFunc, BlockId, CheckpointIndex, CoordinatorError, MerkleRootProvider, MigratorProvider,
    MilestoneId, MilestoneIndex, Result, SendBlockProvider, SignerProvider, SyncStatusProvider,
};
use coordinator_quorum::{QuorumEngine, QuorumStats};
use coordinator_state::{LatestMilestoneInfo, State, StateStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio::sync::Mutex;

enum Phase {
    Uninitialized,
    Initialized { state: State, bootstrapped: bool },
}

pub struct IssuanceCoordinatorConfig {
    pub state_file_path: PathBuf,
    pub milestone_interval: Duration,
    pub signing_retry_amount: u32,
    pub signing_retry_timeout: Duration,
}

/// The collaborators the core does not itself implement: merkle
/// computation, signing, sending, sync status, and the optional
/// migrator and quorum engine.
pub struct IssuanceCoordinatorDeps {
    pub merkle: Arc<dyn MerkleRootProvider>,
    pub signer: Arc<dyn SignerProvider>,
    pub sender: Arc<dyn SendBlockProvider>,
    pub sync_status: Arc<dyn SyncStatusProvider>,
    pub migrator: Option<Arc<dyn MigratorProvider>>,
    pub quorum: Option<QuorumEngine>,
}

pub struct IssuanceCoordinator {
    phase: Mutex<Phase>,
    state_file_path: PathBuf,
    milestone_interval: Duration,
    signing_retry_amount: u32,
    signing_retry_timeout: Duration,
    merkle: Arc<dyn MerkleRootProvider>,
    signer: Arc<dyn SignerProvider>,
    sender: Arc<dyn SendBlockProvider>,
    sync_status: Arc<dyn SyncStatusProvider>,
    migrator: Option<Arc<dyn MigratorProvider>>,
    quorum: Option<QuorumEngine>,
    back_pressure: BackPressureGate,
    events: EventBus,
}

impl IssuanceCoordinator {
    pub fn new(config: IssuanceCoordinatorConfig, deps: IssuanceCoordinatorDeps) -> Self {
        Self {
            phase: Mutex::new(Phase::Uninitialized),
            state_file_path: config.state_file_path,
            milestone_interval: config.milestone_interval,
            signing_retry_amount: config.signing_retry_amount,
            signing_retry_timeout: config.signing_retry_timeout,
            merkle: deps.merkle,
            signer: deps.signer,
            sender: deps.sender,
            sync_status: deps.sync_status,
            migrator: deps.migrator,
            quorum: deps.quorum,
            back_pressure: BackPressureGate::new(),
            events: EventBus::default(),
        }
    }

    pub fn add_back_pressure_func(&self, predicate: impl BackPressureFunc + 'static) {
        self.back_pressure.register(predicate);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn quorum_stats(&self) -> Option<QuorumStats> {
        self.quorum.as_ref().map(|q| q.stats())
    }

    pub fn interval(&self) -> Duration {
        self.milestone_interval
    }

    pub async fn state(&self) -> Option<State> {
        match &*self.phase.lock().await {
            Phase::Uninitialized => None,
            Phase::Initialized { state, .. } => Some(*state),
        }
    }

    /// `bootstrap = true` seeds genesis (or resumes-as-genesis) state in
    /// memory without touching the state file; `bootstrap = false` loads
    /// and cross-checks the persisted file. All failures here are
    /// critical: a coordinator that cannot establish its starting state
    /// must not proceed.
    pub async fn init_state(&self, bootstrap: bool, start_index: u32, observed: LatestMilestoneInfo) -> Result<()> {
        let mut phase = self.phase.lock().await;
        if bootstrap {
            if StateStore::load(&self.state_file_path).await?.is_some() {
                return Err(CoordinatorError::NetworkBootstrapped);
            }
            let start_index = start_index.max(1);
            if observed.index != MilestoneIndex(start_index - 1) {
                return Err(CoordinatorError::InitState(format!(
                    "observed index {:?} does not match startIndex-1 ({})",
                    observed.index,
                    start_index - 1
                )));
            }
            if start_index != 1 && observed.milestone_id.is_null() {
                return Err(CoordinatorError::InitState(
                    "bootstrapping past index 1 requires a non-zero observed milestone id".into(),
                ));
            }
            let state = State {
                latest_milestone_index: MilestoneIndex(start_index - 1),
                latest_milestone_id: observed.milestone_id,
                latest_milestone_block_id: BlockId::NULL,
                latest_milestone_time: observed.timestamp,
            };
            *phase = Phase::Initialized { state, bootstrapped: false };
            Ok(())
        } else {
            let state = StateStore::load(&self.state_file_path)
                .await?
                .ok_or_else(|| CoordinatorError::InitState("state file missing on resume".into()))?;
            if observed.index != state.latest_milestone_index {
                return Err(CoordinatorError::InitState(format!(
                    "observed index {:?} does not match persisted index {:?}",
                    observed.index, state.latest_milestone_index
                )));
            }
            *phase = Phase::Initialized { state, bootstrapped: true };
            Ok(())
        }
    }

    /// No-op returning the last block id if already bootstrapped.
    /// Otherwise issues the first milestone, whose parents are the
    /// seeded `LatestMilestoneBlockID` (null at index 1).
    pub async fn bootstrap(&self) -> Result<BlockId> {
        let mut phase = self.phase.lock().await;
        let state = match &*phase {
            Phase::Uninitialized => {
                return Err(CoordinatorError::InitState("bootstrap called before InitState".into()))
            }
            Phase::Initialized { bootstrapped: true, state } => return Ok(state.latest_milestone_block_id),
            Phase::Initialized { state, .. } => *state,
        };

        let parents = vec![state.latest_milestone_block_id];
        let new_index = MilestoneIndex(state.latest_milestone_index.0 + 1);
        let result = self
            .create_and_send_milestone(&mut phase, parents, new_index, state.latest_milestone_id)
            .await;

        match result {
            Ok(block_id) => {
                if let Phase::Initialized { bootstrapped, .. } = &mut *phase {
                    *bootstrapped = true;
                }
                Ok(block_id)
            }
            // Bootstrap failures are always critical, even a soft gate
            // or quorum failure: a coordinator that fails to emit its
            // first milestone cannot be considered bootstrapped.
            Err(e) if e.is_critical() => Err(e),
            Err(e) => Err(CoordinatorError::BootstrapFailed(e.to_string())),
        }
    }

    pub async fn issue_checkpoint(
        &self,
        checkpoint_index: CheckpointIndex,
        last_checkpoint_block_id: BlockId,
        tips: Vec<BlockId>,
    ) -> Result<BlockId> {
        let _phase = self.phase.lock().await;
        if tips.is_empty() {
            return Err(CoordinatorError::NoTipsGiven);
        }
        self.check_sync_and_backpressure().await?;

        let assembler = CheckpointAssembler::new(self.sender.as_ref());
        let events = &self.events;
        assembler
            .issue(checkpoint_index, last_checkpoint_block_id, tips, |outcome| {
                events.publish(Event::IssuedCheckpointBlock {
                    checkpoint_index: outcome.checkpoint_index,
                    chunk_index: outcome.chunk_index,
                    chunk_count: outcome.chunk_count,
                    block_id: outcome.block_id,
                });
            })
            .await
    }

    pub async fn issue_milestone(&self, parents: Vec<BlockId>) -> Result<BlockId> {
        let mut phase = self.phase.lock().await;
        self.check_sync_and_backpressure().await?;
        let state = match &*phase {
            Phase::Initialized { state, .. } => *state,
            Phase::Uninitialized => {
                return Err(CoordinatorError::InitState("issue_milestone called before InitState".into()))
            }
        };
        let new_index = MilestoneIndex(state.latest_milestone_index.0 + 1);
        self.create_and_send_milestone(&mut phase, parents, new_index, state.latest_milestone_id)
            .await
    }

    async fn check_sync_and_backpressure(&self) -> Result<()> {
        if !self.sync_status.is_node_synced().await {
            return Err(CoordinatorError::NodeNotSynced);
        }
        if self.back_pressure.fires() {
            return Err(CoordinatorError::NodeLoadTooHigh);
        }
        Ok(())
    }

    /// The 11-step emission procedure. Any failure here is critical and
    /// leaves an `_old` state file for operator intervention, except a
    /// quorum error, which retains its supplied classification.
    async fn create_and_send_milestone(
        &self,
        phase: &mut Phase,
        parents: Vec<BlockId>,
        new_index: MilestoneIndex,
        previous_milestone_id: MilestoneId,
    ) -> Result<BlockId> {
        let parents = canonicalize_parents(parents);
        let timestamp = unix_now();

        let roots = self
            .merkle
            .compute_white_flag(new_index, timestamp, &parents, previous_milestone_id)
            .await
            .map_err(|e| CoordinatorError::MerkleRootComputation(e.to_string()))?;

        if let Some(quorum) = &self.quorum {
            let start = Instant::now();
            let result = quorum
                .check_merkle_tree_hash(roots, new_index, timestamp, parents.clone(), previous_milestone_id)
                .await;
            let elapsed = start.elapsed();
            self.events.publish(Event::QuorumFinished {
                elapsed,
                error: result.as_ref().err().map(|e| e.to_string()),
            });
            if let Err(e) = result {
                if !e.is_critical() {
                    self.events.publish_soft_error(&e);
                }
                return Err(e);
            }
        }

        let (receipt, migrator_used) = self.build_receipt().await?;

        let assembler = MilestoneAssembler::new(self.signer.as_ref(), self.signing_retry_amount, self.signing_retry_timeout);
        let events = &self.events;
        let signed = assembler
            .assemble(new_index, timestamp, parents, previous_milestone_id, roots, receipt, |soft| {
                events.publish_soft_error(&soft);
            })
            .await?;

        let milestone_id = signed.compute_id()?;

        StateStore::rename_to_old(&self.state_file_path).await?;

        let bytes = signed.to_bytes()?;
        let block_id = self
            .sender
            .send_block(&bytes, Some(new_index))
            .await
            .map_err(|e| CoordinatorError::SendBlock(e.to_string()))?;

        if migrator_used {
            if let Some(migrator) = &self.migrator {
                migrator
                    .persist_post_send()
                    .await
                    .map_err(|e| CoordinatorError::MigratorState(e.to_string()))?;
            }
        }

        let new_state = State {
            latest_milestone_index: new_index,
            latest_milestone_id: milestone_id,
            latest_milestone_block_id: block_id,
            latest_milestone_time: timestamp,
        };
        StateStore::write(&self.state_file_path, &new_state).await?;
        *phase = Phase::Initialized { state: new_state, bootstrapped: true };

        self.events.publish(Event::IssuedMilestone {
            index: new_index,
            milestone_id,
            block_id,
        });

        Ok(block_id)
    }

    /// Fetches a pending migration receipt, if any, and persists
    /// migrator-side state *before* the milestone carrying it is sent.
    async fn build_receipt(&self) -> Result<(Option<TreasuryTransactionPayload>, bool)> {
        let Some(migrator) = &self.migrator else {
            return Ok((None, false));
        };
        let pending = migrator
            .current_receipt()
            .await
            .map_err(|e| CoordinatorError::MigratorState(e.to_string()))?;
        let Some(pending) = pending else {
            return Ok((None, false));
        };

        migrator
            .persist_pre_send()
            .await
            .map_err(|e| CoordinatorError::MigratorState(e.to_string()))?;
        let treasury = migrator
            .treasury_output()
            .await
            .map_err(|e| CoordinatorError::TreasuryOutput(e.to_string()))?;

        let mut funds = pending.funds();
        funds.sort();

        let payload = TreasuryTransactionPayload {
            input_milestone_id: treasury.milestone_id,
            output_amount: treasury.amount.saturating_sub(pending.sum()),
            funds,
        };
        Ok((Some(payload), true))
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coordinator_base::{AppliedMerkleRoot, Digest, InclusionMerkleRoot};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FakeMerkle;

    #[async_trait]
    impl MerkleRootProvider for FakeMerkle {
        async fn compute_white_flag(
            &self,
            _index: MilestoneIndex,
            _timestamp: u64,
            _parents: &[BlockId],
            _previous_milestone_id: MilestoneId,
        ) -> Result<coordinator_base::MilestoneMerkleRoots> {
            Ok(coordinator_base::MilestoneMerkleRoots {
                inclusion_merkle_root: InclusionMerkleRoot(Digest::NULL),
                applied_merkle_root: AppliedMerkleRoot(Digest::NULL),
            })
        }
    }

    struct FakeSigner;

    #[async_trait]
    impl SignerProvider for FakeSigner {
        async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
            Ok(payload.to_vec())
        }
    }

    struct CountingSender(Arc<AtomicU32>);

    #[async_trait]
    impl SendBlockProvider for CountingSender {
        async fn send_block(&self, _payload: &[u8], _referenced_index: Option<MilestoneIndex>) -> Result<BlockId> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            let mut bytes = [0u8; 32];
            bytes[31] = n as u8;
            Ok(BlockId(Digest(bytes)))
        }
    }

    struct FlaggableSync(Arc<AtomicBool>);

    #[async_trait]
    impl SyncStatusProvider for FlaggableSync {
        async fn is_node_synced(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn build_coordinator(state_file_path: PathBuf, synced: Arc<AtomicBool>) -> IssuanceCoordinator {
        IssuanceCoordinator::new(
            IssuanceCoordinatorConfig {
                state_file_path,
                milestone_interval: Duration::from_secs(10),
                signing_retry_amount: 3,
                signing_retry_timeout: Duration::from_millis(1),
            },
            IssuanceCoordinatorDeps {
                merkle: Arc::new(FakeMerkle),
                signer: Arc::new(FakeSigner),
                sender: Arc::new(CountingSender(Arc::new(AtomicU32::new(0)))),
                sync_status: Arc::new(FlaggableSync(synced)),
                migrator: None,
                quorum: None,
            },
        )
    }

    fn genesis_observed() -> LatestMilestoneInfo {
        LatestMilestoneInfo {
            index: MilestoneIndex(0),
            timestamp: 0,
            milestone_id: MilestoneId::NULL,
        }
    }

    #[tokio::test]
    async fn bootstrap_issues_first_milestone_and_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let synced = Arc::new(AtomicBool::new(true));
        let coordinator = build_coordinator(path.clone(), synced);

        coordinator.init_state(true, 1, genesis_observed()).await.unwrap();
        let block_id = coordinator.bootstrap().await.unwrap();

        let state = coordinator.state().await.unwrap();
        assert_eq!(state.latest_milestone_index, MilestoneIndex(1));
        assert_eq!(state.latest_milestone_block_id, block_id);

        let persisted = StateStore::load(&path).await.unwrap().unwrap();
        assert_eq!(persisted, state);
    }

    #[tokio::test]
    async fn second_bootstrap_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let synced = Arc::new(AtomicBool::new(true));
        let coordinator = build_coordinator(path.clone(), synced);

        coordinator.init_state(true, 1, genesis_observed()).await.unwrap();
        let first = coordinator.bootstrap().await.unwrap();
        let second = coordinator.bootstrap().await.unwrap();
        assert_eq!(first, second);

        let state = coordinator.state().await.unwrap();
        assert_eq!(state.latest_milestone_index, MilestoneIndex(1));
    }

    #[tokio::test]
    async fn rebootstrap_on_existing_state_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let synced = Arc::new(AtomicBool::new(true));
        let first = build_coordinator(path.clone(), synced.clone());
        first.init_state(true, 1, genesis_observed()).await.unwrap();
        first.bootstrap().await.unwrap();

        let second = build_coordinator(path.clone(), synced);
        let result = second.init_state(true, 1, genesis_observed()).await;
        match result {
            Err(CoordinatorError::NetworkBootstrapped) => {}
            other => panic!("expected NetworkBootstrapped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn issue_milestone_increments_index_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let synced = Arc::new(AtomicBool::new(true));
        let coordinator = build_coordinator(path, synced);
        coordinator.init_state(true, 1, genesis_observed()).await.unwrap();
        coordinator.bootstrap().await.unwrap();

        let parents = vec![coordinator.state().await.unwrap().latest_milestone_block_id];
        coordinator.issue_milestone(parents).await.unwrap();
        let state = coordinator.state().await.unwrap();
        assert_eq!(state.latest_milestone_index, MilestoneIndex(2));
    }

    #[tokio::test]
    async fn issue_checkpoint_with_no_tips_is_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let synced = Arc::new(AtomicBool::new(true));
        let coordinator = build_coordinator(path, synced);
        coordinator.init_state(true, 1, genesis_observed()).await.unwrap();
        coordinator.bootstrap().await.unwrap();

        let result = coordinator.issue_checkpoint(CheckpointIndex(0), BlockId::NULL, vec![]).await;
        match result {
            Err(CoordinatorError::NoTipsGiven) => {}
            other => panic!("expected NoTipsGiven, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn issue_milestone_while_not_synced_is_a_soft_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let synced = Arc::new(AtomicBool::new(true));
        let coordinator = build_coordinator(path, synced.clone());
        coordinator.init_state(true, 1, genesis_observed()).await.unwrap();
        coordinator.bootstrap().await.unwrap();

        synced.store(false, Ordering::SeqCst);
        let parents = vec![coordinator.state().await.unwrap().latest_milestone_block_id];
        let result = coordinator.issue_milestone(parents).await;
        match result {
            Err(e @ CoordinatorError::NodeNotSynced) => assert!(!e.is_critical()),
            other => panic!("expected NodeNotSynced, got {other:?}"),
        }

        let state = coordinator.state().await.unwrap();
        assert_eq!(state.latest_milestone_index, MilestoneIndex(1));
    }

    #[tokio::test]
    async fn back_pressure_veto_blocks_issuance_without_touching_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let synced = Arc::new(AtomicBool::new(true));
        let coordinator = build_coordinator(path, synced);
        coordinator.init_state(true, 1, genesis_observed()).await.unwrap();
        coordinator.bootstrap().await.unwrap();

        coordinator.add_back_pressure_func(|| true);
        let parents = vec![coordinator.state().await.unwrap().latest_milestone_block_id];
        let result = coordinator.issue_milestone(parents).await;
        match result {
            Err(e @ CoordinatorError::NodeLoadTooHigh) => assert!(!e.is_critical()),
            other => panic!("expected NodeLoadTooHigh, got {other:?}"),
        }

        let state = coordinator.state().await.unwrap();
        assert_eq!(state.latest_milestone_index, MilestoneIndex(1));
    }
}
