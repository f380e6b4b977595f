//! Directory-backed [`VersionedStore`].
//!
//! The version token of a file is the SHA-256 of its content. A process-local
//! lock makes read-compare-write a single step, so concurrent passes inside one
//! process see real conflicts instead of lost updates.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{io_err, SyncError};
use crate::local_cache::sha256_hex;
use crate::ports::{DirEntry, Versioned, VersionedStore};

#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    async fn read(&self, path: &str) -> Result<Option<String>, SyncError> {
        let full = self.resolve(path);
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(SyncError::StoreAccess {
                path: path.to_string(),
                message: e.to_string(),
            }),
            Err(e) => Err(io_err(full, e)),
        }
    }
}

#[async_trait]
impl VersionedStore for FsStore {
    async fn get_with_version(&self, path: &str) -> Result<Versioned, SyncError> {
        let content = self.read(path).await?;
        let version = content.as_deref().map(sha256_hex);
        Ok(Versioned { content, version })
    }

    async fn put_if_version(
        &self,
        path: &str,
        content: &str,
        expected: Option<&str>,
        message: &str,
    ) -> Result<String, SyncError> {
        let _guard = self.lock.lock().await;

        let current = self.read(path).await?.map(|c| sha256_hex(&c));
        if current.as_deref() != expected {
            tracing::debug!(path, ?expected, ?current, "stale version token");
            return Err(SyncError::VersionConflict {
                path: path.to_string(),
                attempts: 1,
            });
        }

        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        let tmp = PathBuf::from(format!("{}.musicl.tmp", full.display()));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &full).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(full, e));
        }

        tracing::debug!(path, message, "stored");
        Ok(sha256_hex(content))
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, SyncError> {
        let dir = self.resolve(path);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_err(dir, e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let prefix = path.trim_matches('/');
            let rel = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            out.push(DirEntry { name, path: rel });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn public_url(&self, path: &str) -> String {
        format!("file://{}", self.resolve(path).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_path_has_no_content_or_version() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let got = store.get_with_version("docs/mmt.xml").await.unwrap();
        assert_eq!(got, Versioned::default());
    }

    #[tokio::test]
    async fn create_then_update_with_fresh_token() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());

        let v1 = store
            .put_if_version("docs/mmt.xml", "one", None, "create")
            .await
            .unwrap();
        let got = store.get_with_version("docs/mmt.xml").await.unwrap();
        assert_eq!(got.content.as_deref(), Some("one"));
        assert_eq!(got.version.as_deref(), Some(v1.as_str()));

        let v2 = store
            .put_if_version("docs/mmt.xml", "two", Some(&v1), "update")
            .await
            .unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn stale_token_conflicts_and_keeps_content() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let v1 = store.put_if_version("a.xml", "one", None, "m").await.unwrap();
        store.put_if_version("a.xml", "two", Some(&v1), "m").await.unwrap();

        let err = store
            .put_if_version("a.xml", "three", Some(&v1), "m")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        let err = store.put_if_version("a.xml", "four", None, "m").await.unwrap_err();
        assert!(err.is_conflict());

        let got = store.get_with_version("a.xml").await.unwrap();
        assert_eq!(got.content.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn lists_only_files() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        store.put_if_version("docs/b.xml", "b", None, "m").await.unwrap();
        store.put_if_version("docs/a.xml", "a", None, "m").await.unwrap();
        std::fs::create_dir_all(dir.path().join("docs/nested")).unwrap();

        let listed = store.list_directory("docs").await.unwrap();
        let paths: Vec<_> = listed.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["docs/a.xml", "docs/b.xml"]);
        assert!(store.list_directory("absent").await.unwrap().is_empty());
    }
}
