use thiserror::Error;

/// Whether a [`CoordinatorError`] is recoverable or requires operator
/// intervention.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    /// Caller may retry after back-off; no durable state was touched.
    Soft,
    /// Issuance must stop; an operator needs to look at the halt signal
    /// (the `_old` state file) before anything resumes.
    Critical,
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("node is not synced")]
    NodeNotSynced,

    #[error("node load is too high")]
    NodeLoadTooHigh,

    #[error("no tips given")]
    NoTipsGiven,

    #[error("quorum group {group:?} produced no answer")]
    QuorumGroupNoAnswer { group: String },

    #[error("quorum group {group:?} reported a merkle hash mismatch from {alias:?}")]
    QuorumMerkleHashMismatch { group: String, alias: String },

    #[error("signing attempt failed: {0}")]
    SigningAttemptFailed(String),

    #[error("exhausted all signing retries: {0}")]
    SigningRetriesExhausted(String),

    #[error("network already bootstrapped: state file is present at bootstrap time")]
    NetworkBootstrapped,

    #[error("state store I/O error: {0}")]
    StateIo(#[from] std::io::Error),

    #[error("state file did not deserialize: {0}")]
    StateDecode(#[from] serde_json::Error),

    #[error("merkle root computation failed: {0}")]
    MerkleRootComputation(String),

    #[error("send-block callback failed: {0}")]
    SendBlock(String),

    #[error("migrator state persistence failed: {0}")]
    MigratorState(String),

    #[error("treasury output lookup failed: {0}")]
    TreasuryOutput(String),

    #[error("InitState failed: {0}")]
    InitState(String),

    #[error("bootstrap failed: {0}")]
    BootstrapFailed(String),
}

impl CoordinatorError {
    /// Operational classification used by the event bus and the binary to
    /// decide whether to log at `warn` and keep going, or log at `error`
    /// and halt.
    pub fn severity(&self) -> Severity {
        use CoordinatorError::*;
        match self {
            NodeNotSynced | NodeLoadTooHigh | NoTipsGiven | QuorumGroupNoAnswer { .. }
            | SigningAttemptFailed(_) => Severity::Soft,
            QuorumMerkleHashMismatch { .. }
            | SigningRetriesExhausted(_)
            | NetworkBootstrapped
            | StateIo(_)
            | StateDecode(_)
            | MerkleRootComputation(_)
            | SendBlock(_)
            | MigratorState(_)
            | TreasuryOutput(_)
            | InitState(_)
            | BootstrapFailed(_) => Severity::Critical,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity() == Severity::Critical
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_errors_stay_soft() {
        assert_eq!(CoordinatorError::NodeNotSynced.severity(), Severity::Soft);
        assert_eq!(CoordinatorError::NoTipsGiven.severity(), Severity::Soft);
    }

    #[test]
    fn critical_errors_stay_critical() {
        assert_eq!(
            CoordinatorError::NetworkBootstrapped.severity(),
            Severity::Critical
        );
        assert_eq!(
            CoordinatorError::SigningRetriesExhausted("retries exhausted".into()).severity(),
            Severity::Critical
        );
    }
}
