// In-process stand-ins for the collaborators this workspace never
// implements: whiteflag confirmation, the signer, the send path, and
// node sync status. A real deployment attaches `coordinator-core` to a
// node that supplies these over its own RPC surface; this module gives
// the `coordinator` binary something to issue milestones against when
// no such node is attached yet (e.g. bringing up a private network
// before the rest of the stack exists). None of this is cryptographic:
// "signatures" here are content hashes, not proofs of key possession.

use async_trait::async_trait;
use blake2::{Blake2s256, Digest as _};
use coordinator_base::{
    AppliedMerkleRoot, BlockId, Digest, InclusionMerkleRoot, MerkleRootProvider, MilestoneId,
    MilestoneIndex, MilestoneMerkleRoots, Result, SendBlockProvider, SignerProvider, SyncStatusProvider,
};

fn digest_of(parts: &[&[u8]]) -> Digest {
    let mut hasher = Blake2s256::new();
    for part in parts {
        hasher.update(part);
    }
    let bytes: [u8; 32] = hasher.finalize().into();
    Digest(bytes)
}

/// Derives merkle roots deterministically from the candidate milestone's
/// own parameters instead of confirming a subgraph, since no whiteflag
/// engine is attached. Exercises the coordinator's own state machine;
/// not a substitute for real confirmation.
pub struct PlaceholderMerkle;

#[async_trait]
impl MerkleRootProvider for PlaceholderMerkle {
    async fn compute_white_flag(
        &self,
        index: MilestoneIndex,
        timestamp: u64,
        parents: &[BlockId],
        previous_milestone_id: MilestoneId,
    ) -> Result<MilestoneMerkleRoots> {
        let mut buf = Vec::with_capacity(12 + parents.len() * 32 + 32);
        buf.extend_from_slice(&index.0.to_be_bytes());
        buf.extend_from_slice(&timestamp.to_be_bytes());
        for parent in parents {
            buf.extend_from_slice(&(parent.0).0);
        }
        buf.extend_from_slice(&(previous_milestone_id.0).0);

        Ok(MilestoneMerkleRoots {
            inclusion_merkle_root: InclusionMerkleRoot(digest_of(&[b"inclusion", &buf])),
            applied_merkle_root: AppliedMerkleRoot(digest_of(&[b"applied", &buf])),
        })
    }
}

/// Hashes the payload instead of signing it with a managed key. No key
/// material exists anywhere in this workspace; standalone mode has
/// nothing to check a real signature against either, so this is purely
/// a placeholder to drive the assembler's retry and id-derivation logic.
pub struct PlaceholderSigner;

#[async_trait]
impl SignerProvider for PlaceholderSigner {
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(digest_of(&[b"standalone-signature", payload]).0.to_vec())
    }
}

/// Stands in for the networking layer: never actually broadcasts
/// anything, just derives a content-addressed id and logs it.
pub struct LoggingSender;

#[async_trait]
impl SendBlockProvider for LoggingSender {
    async fn send_block(&self, payload: &[u8], referenced_index: Option<MilestoneIndex>) -> Result<BlockId> {
        let id = BlockId(digest_of(&[b"block", payload]));
        tracing::info!(?referenced_index, %id, bytes = payload.len(), "sent block");
        Ok(id)
    }
}

/// Reports the node as always synced: there is no attached node to ask.
pub struct AlwaysSynced;

#[async_trait]
impl SyncStatusProvider for AlwaysSynced {
    async fn is_node_synced(&self) -> bool {
        true
    }
}
