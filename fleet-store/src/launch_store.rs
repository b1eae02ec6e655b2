//! Atomic file-backed persistence for [`TokenLaunchState`] (§4.7): a crash
//! between "decided to launch" and "recorded the launch" must never be able
//! to produce a double-launch, so every write goes through a temp file in
//! the same directory followed by a rename, which is atomic on the same
//! filesystem.

use fleet_core::{StoreError, TokenLaunchState};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One JSON file per agent, named `<agent_id>.json`, under `dir`.
pub struct LaunchStateStore {
    dir: PathBuf,
}

impl LaunchStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{agent_id}.json"))
    }

    pub fn load(&self, agent_id: &str) -> Result<TokenLaunchState, StoreError> {
        let path = self.path_for(agent_id);
        if !path.exists() {
            return Ok(TokenLaunchState::not_launched(agent_id));
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let state: TokenLaunchState = serde_json::from_str(&raw)?;
        Ok(state)
    }

    /// Writes `state` to a temp file in the same directory, then renames it
    /// over the target path. A crash mid-write leaves the old file intact;
    /// a crash mid-rename is not possible on POSIX (rename is atomic).
    pub fn store(&self, state: &TokenLaunchState) -> Result<(), StoreError> {
        let target = self.path_for(&state.agent_id);
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}-", state.agent_id))
            .suffix(".json.tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let payload = serde_json::to_vec_pretty(state)?;
        {
            let mut file = tmp.as_file();
            file.write_all(&payload).map_err(|e| StoreError::Backend(e.to_string()))?;
            file.sync_all().map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        tmp.persist(&target)
            .map_err(|e| StoreError::Backend(e.error.to_string()))?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl fleet_core::LaunchStore for LaunchStateStore {
    fn load(&self, agent_id: &str) -> Result<TokenLaunchState, StoreError> {
        LaunchStateStore::load(self, agent_id)
    }

    fn store(&self, state: &TokenLaunchState) -> Result<(), StoreError> {
        LaunchStateStore::store(self, state)
    }
}
