//! Digests of the playlists last written to the local cache.
//!
//! Stored as JSON in `~/.musicl/hashes.json`:
//!
//! ```json
//! { "updated_at": "2024-01-08T10:00:00Z",
//!   "files": { "/home/u/.musicl/playlists/mmt.xml": "<sha256 hex>" } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use musicl_core::config::musicl_root;

use crate::error::{io_err, SyncError};

/// Cached file path to SHA-256 hex digest. Ordered so the file diffs cleanly.
pub type HashStore = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashStoreFile {
    #[serde(default, alias = "synced_at")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: HashStore,
}

impl HashStoreFile {
    /// Reads the manifest under `home`; a missing file is an empty manifest.
    pub fn load(home: &Path) -> Result<Self, SyncError> {
        let path = store_path_at(home);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(io_err(path, e)),
        }
    }

    /// Stamps `updated_at` and replaces the manifest through a sibling temp file.
    pub fn save(&mut self, home: &Path) -> Result<(), SyncError> {
        self.updated_at = Some(Utc::now());
        let path = store_path_at(home);
        let root = musicl_root(home);
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(&tmp, body).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))
    }
}

/// `~/.musicl/hashes.json`
pub fn store_path_at(home: &Path) -> PathBuf {
    musicl_root(home).join("hashes.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_manifest_loads_empty() {
        let home = TempDir::new().unwrap();
        let manifest = HashStoreFile::load(home.path()).unwrap();
        assert!(manifest.files.is_empty());
        assert!(manifest.updated_at.is_none());
    }

    #[test]
    fn save_stamps_time_and_replaces_atomically() {
        let home = TempDir::new().unwrap();
        let mut manifest = HashStoreFile::default();
        manifest
            .files
            .insert("/home/u/.musicl/playlists/mmt.xml".into(), "deadbeef".into());

        manifest.save(home.path()).unwrap();
        assert!(manifest.updated_at.is_some());
        assert!(!store_path_at(home.path()).with_extension("json.tmp").exists());

        let loaded = HashStoreFile::load(home.path()).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn older_synced_at_field_is_accepted() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(musicl_root(home.path())).unwrap();
        std::fs::write(
            store_path_at(home.path()),
            r#"{"synced_at":"2024-01-08T10:00:00Z","files":{"a.xml":"00"}}"#,
        )
        .unwrap();
        let loaded = HashStoreFile::load(home.path()).unwrap();
        assert!(loaded.updated_at.is_some());
        assert_eq!(loaded.files["a.xml"], "00");
    }

    #[test]
    fn corrupt_manifest_is_an_error() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(musicl_root(home.path())).unwrap();
        std::fs::write(store_path_at(home.path()), "{not json").unwrap();
        assert!(matches!(
            HashStoreFile::load(home.path()),
            Err(SyncError::Json(_))
        ));
    }
}
