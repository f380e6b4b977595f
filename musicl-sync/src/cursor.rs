//! Feed cursors persisted through the playlist store.
//!
//! Each feed's [`FeedCursor`] lives at `{state_dir}/{playlist_id}.json` next
//! to the playlists, so the cursor follows the data across machines.

use std::sync::Arc;

use musicl_core::config::Settings;
use musicl_core::types::{FeedCursor, PlaylistId};

use crate::error::SyncError;
use crate::ports::VersionedStore;

#[derive(Clone)]
pub struct CursorStore {
    store: Arc<dyn VersionedStore>,
    settings: Settings,
}

impl CursorStore {
    pub fn new(store: Arc<dyn VersionedStore>, settings: Settings) -> Self {
        Self { store, settings }
    }

    /// Stored cursor, or the default when absent or unreadable.
    pub async fn load(&self, id: &PlaylistId) -> Result<FeedCursor, SyncError> {
        let path = self.settings.cursor_path(id);
        let current = self.store.get_with_version(&path).await?;
        let Some(content) = current.content else {
            return Ok(FeedCursor::default());
        };
        match serde_json::from_str(&content) {
            Ok(cursor) => Ok(cursor),
            Err(e) => {
                tracing::warn!(playlist = %id, path, error = %e, "ignoring unreadable cursor");
                Ok(FeedCursor::default())
            }
        }
    }

    /// Persist `cursor` if its episode key differs from the stored one.
    ///
    /// Returns `true` when a write happened. A conflicting concurrent write is
    /// logged and skipped; the next check rewrites it.
    pub async fn save(&self, id: &PlaylistId, cursor: &FeedCursor) -> Result<bool, SyncError> {
        let path = self.settings.cursor_path(id);
        let current = self.store.get_with_version(&path).await?;
        let stored: FeedCursor = current
            .content
            .as_deref()
            .and_then(|c| serde_json::from_str(c).ok())
            .unwrap_or_default();
        if current.content.is_some() && stored.last_seen_episode_key == cursor.last_seen_episode_key
        {
            return Ok(false);
        }

        let body = serde_json::to_string_pretty(cursor)?;
        let message = format!("Update cursor for {id}");
        match self
            .store
            .put_if_version(&path, &body, current.version.as_deref(), &message)
            .await
        {
            Ok(_) => {
                tracing::debug!(playlist = %id, key = ?cursor.last_seen_episode_key, "cursor saved");
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(playlist = %id, "cursor changed concurrently; skipping");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FsStore;
    use chrono::Utc;
    use tempfile::TempDir;

    fn cursor(key: &str) -> FeedCursor {
        FeedCursor {
            last_checked_at: Some(Utc::now()),
            last_seen_episode_key: Some(key.into()),
        }
    }

    #[tokio::test]
    async fn writes_only_when_key_changes() {
        let dir = TempDir::new().unwrap();
        let cursors = CursorStore::new(Arc::new(FsStore::new(dir.path())), Settings::default());
        let id = PlaylistId::from("mmt");

        assert_eq!(cursors.load(&id).await.unwrap(), FeedCursor::default());
        assert!(cursors.save(&id, &cursor("ep-1")).await.unwrap());
        assert!(!cursors.save(&id, &cursor("ep-1")).await.unwrap());
        assert!(cursors.save(&id, &cursor("ep-2")).await.unwrap());

        let loaded = cursors.load(&id).await.unwrap();
        assert_eq!(loaded.last_seen_episode_key.as_deref(), Some("ep-2"));
        assert!(dir.path().join("state/mmt.json").exists());
    }

    #[tokio::test]
    async fn unreadable_cursor_loads_as_default() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("state")).unwrap();
        std::fs::write(dir.path().join("state/mmt.json"), "{oops").unwrap();
        let cursors = CursorStore::new(Arc::new(FsStore::new(dir.path())), Settings::default());
        let loaded = cursors.load(&PlaylistId::from("mmt")).await.unwrap();
        assert_eq!(loaded, FeedCursor::default());
    }
}
