use coordinator_base::BlockId;
use std::collections::BTreeSet;

/// Dedup and sort a parent list. Used identically for merkle-root
/// computation, the quorum request, and the assembled record so all
/// three see the same canonical order.
pub fn canonicalize_parents(parents: Vec<BlockId>) -> Vec<BlockId> {
    parents.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_base::Digest;

    fn block(byte: u8) -> BlockId {
        let mut bytes = [0u8; 32];
        bytes[0] = byte;
        BlockId(Digest(bytes))
    }

    #[test]
    fn dedups_and_sorts() {
        let parents = vec![block(3), block(1), block(3), block(2)];
        let canon = canonicalize_parents(parents);
        assert_eq!(canon, vec![block(1), block(2), block(3)]);
    }
}
