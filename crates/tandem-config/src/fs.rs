// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem-backed `ConfigStore` (uses the platform config dir).

use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{ConfigError, ConfigStore};

/// Store configs as JSON files under a base directory.
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at the user config directory (e.g., `~/.config/Tandem`).
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "flyingrobots", "Tandem")
            .ok_or_else(|| ConfigError::Other("could not resolve config dir".into()))?;
        Self::at(proj.config_dir())
    }

    /// Create a store rooted at an explicit directory.
    pub fn at(base: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Directory the store reads from and writes to.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ConfigService;

    #[test]
    fn values_land_in_key_named_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path()).unwrap();
        let svc = ConfigService::new(store);
        svc.save("node", &serde_json::json!({ "node_index": 2 })).unwrap();
        assert!(dir.path().join("node.json").exists());
        let back: serde_json::Value = svc.load("node").unwrap().unwrap();
        assert_eq!(back["node_index"], 2);
    }

    #[test]
    fn absent_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path()).unwrap();
        assert!(matches!(store.load_raw("nope"), Err(ConfigError::NotFound)));
    }
}
