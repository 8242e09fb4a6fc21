// Emits one lightweight record per chunk of at most 7 tips, chaining
// each chunk's parents back to the previous chunk's broadcast block so a
// later milestone can confirm the whole batch by walking the chain.
//
// The "7" comes from the record format's 8-parent limit: one slot is
// always reserved for the chain-back pointer.

use crate::parents::canonicalize_parents;
use coordinator_base::{BlockId, CheckpointIndex, CoordinatorError, Result, SendBlockProvider};
use serde::{Deserialize, Serialize};

pub const MAX_TIPS_PER_CHUNK: usize = 7;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointPayload {
    pub parents: Vec<BlockId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckpointChunkOutcome {
    pub checkpoint_index: CheckpointIndex,
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub block_id: BlockId,
}

pub struct CheckpointAssembler<'a> {
    sender: &'a dyn SendBlockProvider,
}

impl<'a> CheckpointAssembler<'a> {
    pub fn new(sender: &'a dyn SendBlockProvider) -> Self {
        Self { sender }
    }

    /// Broadcasts one record per chunk of `tips`, returning the final
    /// chained block id. `on_chunk` fires once per broadcast chunk, after
    /// that chunk's send succeeds.
    pub async fn issue(
        &self,
        checkpoint_index: CheckpointIndex,
        last_checkpoint_block_id: BlockId,
        tips: Vec<BlockId>,
        mut on_chunk: impl FnMut(CheckpointChunkOutcome),
    ) -> Result<BlockId> {
        let chunks: Vec<Vec<BlockId>> = tips
            .chunks(MAX_TIPS_PER_CHUNK)
            .map(|chunk| chunk.to_vec())
            .collect();
        let chunk_count = chunks.len() as u32;

        let mut chain = last_checkpoint_block_id;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut parents = chunk;
            parents.push(chain);
            let payload = CheckpointPayload {
                parents: canonicalize_parents(parents),
            };
            let bytes = serde_json::to_vec(&payload).map_err(CoordinatorError::from)?;
            let block_id = self.sender.send_block(&bytes, None).await?;
            chain = block_id;
            on_chunk(CheckpointChunkOutcome {
                checkpoint_index,
                chunk_index: i as u32,
                chunk_count,
                block_id,
            });
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coordinator_base::{Digest, MilestoneIndex};
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Mutex;

    struct CountingSender {
        next_byte: AtomicU8,
        sent: Mutex<Vec<Vec<BlockId>>>,
    }

    #[async_trait]
    impl SendBlockProvider for CountingSender {
        async fn send_block(&self, payload: &[u8], _referenced_index: Option<MilestoneIndex>) -> Result<BlockId> {
            let decoded: CheckpointPayload = serde_json::from_slice(payload).unwrap();
            self.sent.lock().unwrap().push(decoded.parents);
            let n = self.next_byte.fetch_add(1, Ordering::SeqCst);
            let mut bytes = [0u8; 32];
            bytes[31] = n + 1;
            Ok(BlockId(Digest(bytes)))
        }
    }

    fn tip(byte: u8) -> BlockId {
        let mut bytes = [0u8; 32];
        bytes[0] = byte;
        BlockId(Digest(bytes))
    }

    #[tokio::test]
    async fn chunks_fifteen_tips_into_seven_seven_one() {
        let sender = CountingSender {
            next_byte: AtomicU8::new(0),
            sent: Mutex::new(Vec::new()),
        };
        let tips: Vec<BlockId> = (1..=15).map(tip).collect();
        let assembler = CheckpointAssembler::new(&sender);
        let mut outcomes = Vec::new();
        assembler
            .issue(CheckpointIndex(0), BlockId::NULL, tips, |outcome| outcomes.push(outcome))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].chunk_count, 3);
        assert_eq!(outcomes[0].chunk_index, 0);
        assert_eq!(outcomes[2].chunk_index, 2);

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent[0].len(), 8); // 7 tips + seed
        assert_eq!(sent[1].len(), 8); // 7 tips + previous chunk's block id
        assert_eq!(sent[2].len(), 2); // 1 tip + previous chunk's block id
    }

    #[tokio::test]
    async fn ten_tips_produce_two_chunks() {
        let sender = CountingSender {
            next_byte: AtomicU8::new(0),
            sent: Mutex::new(Vec::new()),
        };
        let tips: Vec<BlockId> = (1..=10).map(tip).collect();
        let assembler = CheckpointAssembler::new(&sender);
        let mut outcomes = Vec::new();
        let last = assembler
            .issue(CheckpointIndex(0), BlockId::NULL, tips, |outcome| outcomes.push(outcome))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].chunk_count, 2);
        assert_eq!(last, outcomes[1].block_id);
    }
}
