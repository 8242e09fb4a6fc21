// Quorum cross-check: given a candidate milestone's merkle roots, asks
// every configured verifier node to independently recompute them.
//
// Topology is groups of clients. A group succeeds once at least one of
// its clients replies within the shared deadline and every reply that
// does come back agrees with the locally computed roots. A group with
// no replies at all is a soft failure that aborts the round, even if
// every other group reached consensus; any disagreeing reply is a
// critical failure that abandons the whole round.
//
// All client calls run concurrently regardless of grouping; a single
// writer holds the statistics lock for the whole round so a concurrent
// snapshot reader never observes a torn update and two rounds never
// interleave their writes into the table.

use crate::stats::{QuorumClientStatistic, QuorumStats};
use coordinator_base::{BlockId, CoordinatorError, MilestoneId, MilestoneIndex, MilestoneMerkleRoots, Result};
use coordinator_net::{ComputeWhiteFlagRequest, QuorumClientConfig, QuorumHttpClient};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

struct ClientEntry {
    client: Arc<QuorumHttpClient>,
    group: String,
    alias: String,
}

pub struct QuorumEngine {
    clients: Vec<ClientEntry>,
    group_sizes: BTreeMap<String, u32>,
    stats: QuorumStats,
    timeout: Duration,
}

enum ClientCallOutcome {
    Matched,
    Mismatched,
    Errored(String),
}

struct ClientResult {
    idx: usize,
    group: String,
    alias: String,
    elapsed_secs: f64,
    outcome: ClientCallOutcome,
}

impl QuorumEngine {
    pub fn build(
        groups: &BTreeMap<String, Vec<QuorumClientConfig>>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let mut clients = Vec::new();
        let mut group_sizes = BTreeMap::new();
        let mut initial_stats = Vec::new();

        for (group, client_cfgs) in groups {
            group_sizes.insert(group.clone(), client_cfgs.len() as u32);
            for cfg in client_cfgs {
                let http_client = QuorumHttpClient::new(cfg, timeout)?;
                let alias = http_client.alias().to_string();
                let base_url = http_client.base_url().to_string();
                initial_stats.push(QuorumClientStatistic {
                    group: group.clone(),
                    alias: alias.clone(),
                    base_url,
                    response_time_seconds: 0.0,
                    last_error: None,
                });
                clients.push(ClientEntry {
                    client: Arc::new(http_client),
                    group: group.clone(),
                    alias,
                });
            }
        }

        Ok(Self {
            clients,
            group_sizes,
            stats: QuorumStats::new(initial_stats),
            timeout,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn stats(&self) -> QuorumStats {
        self.stats.clone()
    }

    /// Runs one quorum round. Returns the mismatch error immediately if
    /// any reply disagrees with `local`. Otherwise, every group must
    /// reach consensus (at least one matching reply) for the round to
    /// succeed: a single group that comes back empty-handed aborts the
    /// round with that group's `QuorumGroupNoAnswer`, even if every
    /// other group answered correctly.
    pub async fn check_merkle_tree_hash(
        &self,
        local: MilestoneMerkleRoots,
        index: MilestoneIndex,
        timestamp: u64,
        parents: Vec<BlockId>,
        previous_milestone_id: MilestoneId,
    ) -> Result<()> {
        if self.clients.is_empty() {
            return Ok(());
        }

        let req = ComputeWhiteFlagRequest {
            index,
            timestamp,
            parents,
            previous_milestone_id,
        };

        let total = self.clients.len();
        let round_span = tracing::info_span!("quorum_round", index = index.0, clients = total);

        async move {
            tracing::info!("starting quorum round");
            let (tx, mut rx) = tokio::sync::mpsc::channel::<ClientResult>(total);

            for (idx, entry) in self.clients.iter().enumerate() {
                let client = entry.client.clone();
                let group = entry.group.clone();
                let alias = entry.alias.clone();
                let tx = tx.clone();
                let req = req.clone();
                let client_span = tracing::info_span!("quorum_client", group = %group, alias = %alias);
                tokio::spawn(
                    async move {
                        let start = Instant::now();
                        let outcome = match client.compute_white_flag(&req).await {
                            Ok(resp) => {
                                if resp.inclusion_merkle_root == local.inclusion_merkle_root
                                    && resp.applied_merkle_root == local.applied_merkle_root
                                {
                                    ClientCallOutcome::Matched
                                } else {
                                    ClientCallOutcome::Mismatched
                                }
                            }
                            Err(e) => ClientCallOutcome::Errored(e.to_string()),
                        };
                        let elapsed_secs = start.elapsed().as_secs_f64();
                        tracing::debug!(elapsed_secs, "quorum client responded");
                        let _ = tx
                            .send(ClientResult {
                                idx,
                                group,
                                alias,
                                elapsed_secs,
                                outcome,
                            })
                            .await;
                    }
                    .instrument(client_span),
                );
            }
            drop(tx);

            let mut guard = self.stats.inner().write().await;
            let mut group_valid: BTreeMap<String, u32> = BTreeMap::new();
            let mut mismatch: Option<CoordinatorError> = None;
            let mut received = 0usize;

            let sleep = tokio::time::sleep(self.timeout);
            tokio::pin!(sleep);

            while received < total {
                tokio::select! {
                    maybe = rx.recv() => {
                        let Some(result) = maybe else { break };
                        received += 1;
                        guard[result.idx].response_time_seconds = result.elapsed_secs;
                        guard[result.idx].last_error = match &result.outcome {
                            ClientCallOutcome::Errored(e) => Some(e.clone()),
                            _ => None,
                        };
                        match result.outcome {
                            ClientCallOutcome::Matched => {
                                *group_valid.entry(result.group).or_insert(0) += 1;
                            }
                            ClientCallOutcome::Mismatched => {
                                tracing::error!(group = %result.group, alias = %result.alias, "quorum merkle hash mismatch");
                                if mismatch.is_none() {
                                    mismatch = Some(CoordinatorError::QuorumMerkleHashMismatch {
                                        group: result.group,
                                        alias: result.alias,
                                    });
                                }
                                break;
                            }
                            ClientCallOutcome::Errored(ref e) => {
                                tracing::warn!(group = %result.group, alias = %result.alias, error = %e, "quorum client call failed");
                            }
                        }
                    }
                    _ = &mut sleep => break,
                }
            }
            drop(guard);

            if let Some(err) = mismatch {
                return Err(err);
            }

            // Every group must reach consensus; the first group that
            // comes back empty-handed aborts the round for all of them.
            let mut first_no_answer: Option<CoordinatorError> = None;
            for (group, size) in &self.group_sizes {
                if *size == 0 {
                    continue;
                }
                if group_valid.get(group).copied().unwrap_or(0) == 0 {
                    tracing::warn!(group = %group, "quorum group produced no answer");
                    if first_no_answer.is_none() {
                        first_no_answer = Some(CoordinatorError::QuorumGroupNoAnswer { group: group.clone() });
                    }
                }
            }

            if let Some(err) = first_no_answer {
                return Err(err);
            }

            tracing::info!("quorum round reached consensus");
            Ok(())
        }
        .instrument(round_span)
        .await
    }
}
