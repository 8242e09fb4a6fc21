mod error;
mod ids;
mod providers;

pub use error::{CoordinatorError, Result, Severity};
pub use ids::{
    AppliedMerkleRoot, BlockId, CheckpointIndex, Digest, InclusionMerkleRoot, MilestoneId,
    MilestoneIndex, MilestoneMerkleRoots,
};
pub use providers::{
    BackPressureFunc, LatestTreasuryOutput, MerkleRootProvider, MigrationReceipt, MigratorProvider,
    SendBlockProvider, SignerProvider, SyncStatusProvider,
};
