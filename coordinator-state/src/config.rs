use coordinator_net::QuorumClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub state_file_path: String,
    #[serde(with = "duration_secs")]
    pub milestone_interval: Duration,
    pub signing_retry_amount: u32,
    #[serde(with = "duration_secs")]
    pub signing_retry_timeout: Duration,
    pub quorum: QuorumConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            state_file_path: "coordinator.state".to_string(),
            milestone_interval: Duration::from_secs(10),
            signing_retry_amount: 10,
            signing_retry_timeout: Duration::from_secs(2),
            quorum: QuorumConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    pub enabled: bool,
    /// Group name to the ordered list of verifier clients in that group.
    pub groups: BTreeMap<String, Vec<QuorumClientConfig>>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            groups: BTreeMap::new(),
            timeout: Duration::from_secs(2),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl CoordinatorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub async fn load_from_path(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.state_file_path, "coordinator.state");
        assert_eq!(cfg.milestone_interval, Duration::from_secs(10));
        assert_eq!(cfg.signing_retry_amount, 10);
        assert_eq!(cfg.signing_retry_timeout, Duration::from_secs(2));
        assert!(!cfg.quorum.enabled);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let cfg = CoordinatorConfig::from_toml_str("signing_retry_amount = 3\n").unwrap();
        assert_eq!(cfg.signing_retry_amount, 3);
        assert_eq!(cfg.state_file_path, "coordinator.state");
    }
}
