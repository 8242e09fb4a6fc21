// Turns (index, timestamp, parents, receipt?, previousMilestoneID, roots)
// into a signed milestone record. The same inputs with the same signer
// key set must produce a byte-identical payload, so parent canonicalization
// happens here rather than being left to the caller.

use crate::parents::canonicalize_parents;
use blake2::{Blake2s256, Digest as _};
use coordinator_base::{
    AppliedMerkleRoot, BlockId, CoordinatorError, Digest, InclusionMerkleRoot, MilestoneId,
    MilestoneIndex, MilestoneMerkleRoots, Result, SignerProvider,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A migration receipt's treasury-facing half, already reduced to the
/// fields the milestone payload carries. Built by the caller (the
/// migrator provider supplies the receipt; the issuance coordinator
/// resolves it against the treasury output before calling the
/// assembler).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreasuryTransactionPayload {
    pub input_milestone_id: MilestoneId,
    pub output_amount: u64,
    /// Sorted `(identifier, amount)` pairs, ascending by identifier.
    pub funds: Vec<(String, u64)>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MilestonePayload {
    pub index: MilestoneIndex,
    pub timestamp: u64,
    pub parents: Vec<BlockId>,
    pub previous_milestone_id: MilestoneId,
    pub inclusion_merkle_root: InclusionMerkleRoot,
    pub applied_merkle_root: AppliedMerkleRoot,
    pub receipt: Option<TreasuryTransactionPayload>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedMilestone {
    pub payload: MilestonePayload,
    pub signature: Vec<u8>,
}

impl SignedMilestone {
    /// Canonical on-wire encoding, also the input to `MilestoneId`
    /// derivation.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(CoordinatorError::from)
    }

    /// Deterministic content-address of the signed milestone. Byte-identical
    /// inputs always hash to the same id, independent of signer identity.
    pub fn compute_id(&self) -> Result<MilestoneId> {
        let bytes = self.to_bytes()?;
        let mut hasher = Blake2s256::new();
        hasher.update(&bytes);
        let digest: [u8; 32] = hasher.finalize().into();
        Ok(MilestoneId(Digest(digest)))
    }
}

pub struct MilestoneAssembler<'a> {
    signer: &'a dyn SignerProvider,
    signing_retry_amount: u32,
    signing_retry_timeout: Duration,
}

impl<'a> MilestoneAssembler<'a> {
    pub fn new(signer: &'a dyn SignerProvider, signing_retry_amount: u32, signing_retry_timeout: Duration) -> Self {
        Self {
            signer,
            signing_retry_amount,
            signing_retry_timeout,
        }
    }

    /// Assembles and signs a milestone. `on_soft_error` is invoked once
    /// per failed signing attempt (never on the final, retries-exhausted
    /// failure, which is returned as a critical error instead) so the
    /// caller can publish it on the `SoftError` event without this crate
    /// knowing about an event bus.
    pub async fn assemble(
        &self,
        index: MilestoneIndex,
        timestamp: u64,
        parents: Vec<BlockId>,
        previous_milestone_id: MilestoneId,
        roots: MilestoneMerkleRoots,
        receipt: Option<TreasuryTransactionPayload>,
        mut on_soft_error: impl FnMut(CoordinatorError),
    ) -> Result<SignedMilestone> {
        let payload = MilestonePayload {
            index,
            timestamp,
            parents: canonicalize_parents(parents),
            previous_milestone_id,
            inclusion_merkle_root: roots.inclusion_merkle_root,
            applied_merkle_root: roots.applied_merkle_root,
            receipt,
        };
        let bytes = serde_json::to_vec(&payload).map_err(CoordinatorError::from)?;

        let mut attempt = 0u32;
        loop {
            match self.signer.sign(&bytes).await {
                Ok(signature) => return Ok(SignedMilestone { payload, signature }),
                Err(e) => {
                    attempt += 1;
                    let soft = CoordinatorError::SigningAttemptFailed(e.to_string());
                    tracing::warn!(attempt, error = %soft, "signing attempt failed");
                    if attempt >= self.signing_retry_amount {
                        return Err(CoordinatorError::SigningRetriesExhausted(e.to_string()));
                    }
                    on_soft_error(soft);
                    tokio::time::sleep(self.signing_retry_timeout).await;
                }
            }
        }
    }
}
