// The durable record of the last-issued milestone. Updated in place under
// the caller's milestone mutex and persisted on every successful
// emission; see `StateStore::persist` for the crash-safe rename dance.

use coordinator_base::{BlockId, CoordinatorError, MilestoneId, MilestoneIndex, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub latest_milestone_index: MilestoneIndex,
    pub latest_milestone_id: MilestoneId,
    pub latest_milestone_block_id: BlockId,
    /// Unix seconds.
    pub latest_milestone_time: u64,
}

impl State {
    pub fn genesis(start_index: MilestoneIndex) -> Self {
        Self {
            latest_milestone_index: MilestoneIndex(start_index.0.saturating_sub(1)),
            latest_milestone_id: MilestoneId::NULL,
            latest_milestone_block_id: BlockId::NULL,
            latest_milestone_time: 0,
        }
    }
}

/// The attached node's own view of index/timestamp/id, used only to
/// cross-check `InitState`; never owned or persisted by the coordinator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LatestMilestoneInfo {
    pub index: MilestoneIndex,
    pub timestamp: u64,
    pub milestone_id: MilestoneId,
}

/// Loads and atomically rewrites the persisted [`State`].
///
/// Persistence is deliberately *not* fully atomic: `persist` renames the
/// existing file to `<path>_old` before the caller sends the milestone's
/// block, then writes the fresh file only after the send succeeds. A
/// crash between those two steps leaves `_old` but no fresh file, which
/// is the operator's halt signal: intervention is required before the
/// coordinator can safely resume.
pub struct StateStore;

impl StateStore {
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<State>> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let state: State = serde_json::from_slice(&bytes)?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoordinatorError::StateIo(e)),
        }
    }

    /// True iff `<path>_old` exists without a fresh file at `path` — the
    /// operator's signal that the last emission halted between rename and
    /// write. Purely a read; does not touch the files.
    pub async fn halted(path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let old_path = old_path_of(path);
        tokio::fs::metadata(&old_path).await.is_ok() && tokio::fs::metadata(path).await.is_err()
    }

    /// Renames `path` to `<path>_old`, tolerating the file not existing
    /// yet (first-ever emission after bootstrap has nothing to rename).
    pub async fn rename_to_old(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match tokio::fs::rename(path, old_path_of(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoordinatorError::StateIo(e)),
        }
    }

    /// Writes the fresh state to `path`. Called only after the milestone
    /// has been successfully broadcast. Restricted to owner read/write,
    /// since the state file's contents are enough to forge a
    /// plausible-looking resume point for this coordinator.
    pub async fn write(path: impl AsRef<Path>, state: &State) -> Result<()> {
        let path = path.as_ref();
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(path, bytes).await?;
        set_owner_read_write(path).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn set_owner_read_write(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owner_read_write(_path: &Path) -> Result<()> {
    Ok(())
}

fn old_path_of(path: &Path) -> std::path::PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push("_old");
    std::path::PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let state = State {
            latest_milestone_index: MilestoneIndex(7),
            latest_milestone_id: MilestoneId::NULL,
            latest_milestone_block_id: BlockId::NULL,
            latest_milestone_time: 1234,
        };
        StateStore::write(&path, &state).await.unwrap();
        let loaded = StateStore::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.state");
        assert!(StateStore::load(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn halted_detects_old_without_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        let state = State::genesis(MilestoneIndex(1));
        StateStore::write(&path, &state).await.unwrap();
        assert!(!StateStore::halted(&path).await);

        StateStore::rename_to_old(&path).await.unwrap();
        assert!(StateStore::halted(&path).await);

        StateStore::write(&path, &state).await.unwrap();
        assert!(!StateStore::halted(&path).await);
    }

    #[tokio::test]
    async fn rename_tolerates_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        StateStore::rename_to_old(&path).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_restricts_permissions_to_owner() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.state");
        StateStore::write(&path, &State::genesis(MilestoneIndex(1))).await.unwrap();
        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
