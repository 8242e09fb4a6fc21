// Wire protocol for the quorum cross-check: each configured verifier node
// exposes a single HTTP endpoint that computes whiteflag mutations for a
// candidate milestone and reports back the merkle roots it independently
// derived. Everything here is the request/response shape plus a thin
// HTTP client wrapper; the fan-out and classification logic lives in
// `coordinator-quorum`.

use coordinator_base::{AppliedMerkleRoot, BlockId, InclusionMerkleRoot, MilestoneId, MilestoneIndex};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One entry in a quorum group: an operator-configured verifier node.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QuorumClientConfig {
    /// Human-readable name used in statistics and log lines; defaults to
    /// the base URL if not given.
    pub alias: Option<String>,
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl QuorumClientConfig {
    pub fn display_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.base_url)
    }
}

/// Request body sent to a verifier's "compute whiteflag mutations"
/// endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComputeWhiteFlagRequest {
    pub index: MilestoneIndex,
    /// Unix seconds; must equal the timestamp fed to local merkle
    /// computation for the round to be meaningful.
    pub timestamp: u64,
    pub parents: Vec<BlockId>,
    pub previous_milestone_id: MilestoneId,
}

/// Response body: the two merkle roots the verifier computed, plus
/// whatever ancillary fields it chooses to report (ignored here).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComputeWhiteFlagResponse {
    pub inclusion_merkle_root: InclusionMerkleRoot,
    pub applied_merkle_root: AppliedMerkleRoot,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A bound HTTP client for a single verifier. One of these is built per
/// configured [`QuorumClientConfig`] at engine-construction time, with its
/// `reqwest::Client` timeout pinned to the quorum round's timeout.
pub struct QuorumHttpClient {
    alias: String,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    http: reqwest::Client,
}

impl QuorumHttpClient {
    pub fn new(config: &QuorumClientConfig, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            alias: config.display_alias().to_string(),
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask this verifier to compute whiteflag mutations for the given
    /// candidate milestone parameters. The client's own `reqwest::Client`
    /// timeout already bounds this call; callers additionally race it
    /// against the quorum round's shared deadline.
    pub async fn compute_white_flag(
        &self,
        req: &ComputeWhiteFlagRequest,
    ) -> reqwest::Result<ComputeWhiteFlagResponse> {
        let url = format!("{}/whiteflag", self.base_url.trim_end_matches('/'));
        let mut builder = self.http.post(url).json(req);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }
        builder.send().await?.error_for_status()?.json().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_alias_falls_back_to_base_url() {
        let cfg = QuorumClientConfig {
            alias: None,
            base_url: "https://verifier.example".into(),
            username: None,
            password: None,
        };
        assert_eq!(cfg.display_alias(), "https://verifier.example");
    }

    #[test]
    fn display_alias_prefers_configured_name() {
        let cfg = QuorumClientConfig {
            alias: Some("verifier-1".into()),
            base_url: "https://verifier.example".into(),
            username: None,
            password: None,
        };
        assert_eq!(cfg.display_alias(), "verifier-1");
    }
}
