// Wires the state machine in `coordinator-core` to the standalone
// collaborators in `standalone` and drives the milestone interval loop.
// None of this is part of the core's public contract — CLI parsing,
// config loading, logger wiring, and process lifecycle live here in the
// binary instead — but a runnable binary needs it regardless.

use crate::standalone::{AlwaysSynced, LoggingSender, PlaceholderMerkle, PlaceholderSigner};
use coordinator_base::{CoordinatorError, MilestoneId, MilestoneIndex, Result};
use coordinator_core::{Event, IssuanceCoordinator, IssuanceCoordinatorConfig, IssuanceCoordinatorDeps};
use coordinator_quorum::QuorumEngine;
use coordinator_state::{CoordinatorConfig, LatestMilestoneInfo, StateStore};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path).await?;

    if StateStore::halted(&config.state_file_path).await {
        return Err(CoordinatorError::InitState(format!(
            "{}_old is present without a fresh state file: a previous emission halted between \
             rename and write, an operator must resolve this before the coordinator can resume",
            config.state_file_path
        )));
    }

    let quorum = build_quorum(&config)?;

    let coordinator = Arc::new(IssuanceCoordinator::new(
        IssuanceCoordinatorConfig {
            state_file_path: PathBuf::from(&config.state_file_path),
            milestone_interval: config.milestone_interval,
            signing_retry_amount: config.signing_retry_amount,
            signing_retry_timeout: config.signing_retry_timeout,
        },
        IssuanceCoordinatorDeps {
            merkle: Arc::new(PlaceholderMerkle),
            signer: Arc::new(PlaceholderSigner),
            sender: Arc::new(LoggingSender),
            sync_status: Arc::new(AlwaysSynced),
            migrator: None,
            quorum,
        },
    ));

    spawn_event_logger(&coordinator);

    match StateStore::load(&config.state_file_path).await? {
        None => {
            let genesis = LatestMilestoneInfo {
                index: MilestoneIndex(0),
                timestamp: 0,
                milestone_id: MilestoneId::NULL,
            };
            coordinator.init_state(true, 1, genesis).await?;
            let block_id = coordinator.bootstrap().await?;
            tracing::info!(%block_id, "bootstrapped first milestone");
        }
        Some(state) => {
            let observed = LatestMilestoneInfo {
                index: state.latest_milestone_index,
                timestamp: state.latest_milestone_time,
                milestone_id: state.latest_milestone_id,
            };
            coordinator
                .init_state(false, state.latest_milestone_index.0, observed)
                .await?;
            tracing::info!(index = state.latest_milestone_index.0, "resumed from persisted state");
        }
    }

    run_issuance_loop(coordinator).await
}

async fn load_config(config_path: Option<PathBuf>) -> Result<CoordinatorConfig> {
    match config_path {
        Some(path) => CoordinatorConfig::load_from_path(&path)
            .await
            .map_err(|e| CoordinatorError::InitState(format!("failed to load {}: {e}", path.display()))),
        None => Ok(CoordinatorConfig::default()),
    }
}

fn build_quorum(config: &CoordinatorConfig) -> Result<Option<QuorumEngine>> {
    if !config.quorum.enabled {
        return Ok(None);
    }
    QuorumEngine::build(&config.quorum.groups, config.quorum.timeout)
        .map(Some)
        .map_err(|e| CoordinatorError::InitState(format!("failed to build quorum engine: {e}")))
}

/// The interval already issued its bootstrap milestone before this loop
/// starts, so the first tick is drained immediately and every
/// subsequent tick issues the next one. A critical failure stops the
/// loop; a soft failure is logged and the loop waits for the next tick.
async fn run_issuance_loop(coordinator: Arc<IssuanceCoordinator>) -> Result<()> {
    let mut ticker = tokio::time::interval(coordinator.interval());
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // No tip-selection algorithm is wired up in standalone mode, so the
                // only candidate parent is the tip of the milestone chain itself.
                let parents = match coordinator.state().await {
                    Some(state) => vec![state.latest_milestone_block_id],
                    None => continue,
                };
                if let Err(e) = coordinator.issue_milestone(parents).await {
                    if e.is_critical() {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, "milestone not issued this round");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested, waiting for any in-flight issuance to settle");
                return Ok(());
            }
        }
    }
}

fn spawn_event_logger(coordinator: &Arc<IssuanceCoordinator>) {
    let mut events = coordinator.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::IssuedMilestone { index, milestone_id, block_id }) => {
                    tracing::info!(index = index.0, %milestone_id, %block_id, "issued milestone");
                }
                Ok(Event::IssuedCheckpointBlock { checkpoint_index, chunk_index, chunk_count, block_id }) => {
                    tracing::info!(
                        checkpoint_index = checkpoint_index.0,
                        chunk_index,
                        chunk_count,
                        %block_id,
                        "issued checkpoint chunk"
                    );
                }
                Ok(Event::SoftError { message }) => tracing::warn!(%message, "soft error"),
                Ok(Event::QuorumFinished { elapsed, error }) => {
                    tracing::info!(?elapsed, ?error, "quorum round finished");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged, dropped events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
