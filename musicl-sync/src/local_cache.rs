//! Local playlist cache with hash-gated atomic writes.
//!
//! ## `atomic_write`
//!
//! 1. Normalise line endings and SHA-256 the content.
//! 2. Compare with the stored hash; skip if identical.
//! 3. Write to `<path>.musicl.tmp`.
//! 4. Rename to the final path (atomic on POSIX).
//! 5. Update the hash store entry.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use musicl_core::config::musicl_root;
use musicl_core::types::PlaylistId;

use crate::error::{io_err, SyncError};
use crate::hash_store::{HashStore, HashStoreFile};

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Content changed or the file did not exist.
    Written { path: PathBuf },
    /// Content matches the stored hash.
    Unchanged { path: PathBuf },
    /// Dry run: the file would have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }
}

pub(crate) fn sha256_hex(content: &str) -> String {
    let mut h = Sha256::new();
    h.update(content.as_bytes());
    hex::encode(h.finalize())
}

pub(crate) fn atomic_write(
    path: &Path,
    content: &str,
    hashes: &mut HashStore,
    dry_run: bool,
) -> Result<WriteResult, SyncError> {
    let tmp = PathBuf::from(format!("{}.musicl.tmp", path.display()));
    atomic_write_with_tmp(path, content, hashes, dry_run, &tmp)
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &str,
    hashes: &mut HashStore,
    dry_run: bool,
    tmp: &Path,
) -> Result<WriteResult, SyncError> {
    let normalized = content.replace("\r\n", "\n");
    let content = normalized.as_str();
    let digest = sha256_hex(content);

    let key = path.to_string_lossy().to_string();
    if hashes.get(&key) == Some(&digest) && path.exists() {
        tracing::debug!(path = %path.display(), "unchanged");
        return Ok(WriteResult::Unchanged {
            path: path.to_path_buf(),
        });
    }

    if dry_run {
        tracing::info!(path = %path.display(), "[dry-run] would write");
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    hashes.insert(key, digest);
    tracing::info!(path = %path.display(), "wrote");
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// `~/.musicl/playlists/<id>.xml`, tracked by `~/.musicl/hashes.json`.
///
/// Feeds are synced concurrently; the hash store is read, updated and saved
/// under one lock so entries from parallel passes are not lost.
#[derive(Debug)]
pub struct LocalCache {
    home: PathBuf,
    lock: Mutex<()>,
}

impl LocalCache {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> PathBuf {
        musicl_root(&self.home).join("playlists")
    }

    pub fn path_for(&self, id: &PlaylistId) -> PathBuf {
        self.dir().join(format!("{id}.xml"))
    }

    pub fn write(
        &self,
        id: &PlaylistId,
        content: &str,
        dry_run: bool,
    ) -> Result<WriteResult, SyncError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut manifest = HashStoreFile::load(&self.home)?;
        let result = atomic_write(&self.path_for(id), content, &mut manifest.files, dry_run)?;
        if matches!(result, WriteResult::Written { .. }) {
            manifest.save(&self.home)?;
        }
        Ok(result)
    }

    /// [`write`](Self::write) on the blocking thread pool, so the file I/O
    /// and the manifest lock stay off the async workers.
    pub async fn write_detached(
        self: Arc<Self>,
        id: PlaylistId,
        content: String,
        dry_run: bool,
    ) -> Result<WriteResult, SyncError> {
        let path = self.path_for(&id);
        tokio::task::spawn_blocking(move || self.write(&id, &content, dry_run))
            .await
            .map_err(|e| io_err(path, std::io::Error::other(e)))?
    }

    /// Cached copy, if any.
    pub fn read(&self, id: &PlaylistId) -> Result<Option<String>, SyncError> {
        let path = self.path_for(id);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path, e)),
        }
    }
}
