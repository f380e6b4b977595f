//! Playlist discovery: what already lives in the store.

use serde::Serialize;

use musicl_core::config::Config;
use musicl_core::types::{FeedConfig, PlaylistId};
use musicl_detector::{inspect, PlaylistSummary};

use crate::error::SyncError;
use crate::ports::VersionedStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPlaylist {
    pub playlist_id: PlaylistId,
    pub path: String,
    pub summary: PlaylistSummary,
}

/// Inspect every `*.xml` document directly under `playlists_dir`.
pub async fn discover(
    store: &dyn VersionedStore,
    playlists_dir: &str,
) -> Result<Vec<DiscoveredPlaylist>, SyncError> {
    let entries = store.list_directory(playlists_dir).await?;
    let mut found = Vec::new();
    for entry in entries {
        let Some(stem) = entry.name.strip_suffix(".xml") else {
            continue;
        };
        if stem.is_empty() {
            continue;
        }
        let current = store.get_with_version(&entry.path).await?;
        let Some(content) = current.content else {
            tracing::debug!(path = %entry.path, "listed playlist vanished before read");
            continue;
        };
        found.push(DiscoveredPlaylist {
            playlist_id: PlaylistId::from(stem),
            path: entry.path,
            summary: inspect(&content),
        });
    }
    tracing::info!(dir = playlists_dir, count = found.len(), "discovered playlists");
    Ok(found)
}

/// Feed entries for discovered playlists that name a source feed and are not
/// configured yet.
pub fn import_candidates(discovered: &[DiscoveredPlaylist], config: &Config) -> Vec<FeedConfig> {
    discovered
        .iter()
        .filter(|d| config.feed(&d.playlist_id).is_none())
        .filter_map(|d| {
            let source = d.summary.source_feed.as_deref()?.trim();
            if source.is_empty() {
                return None;
            }
            let mut feed = FeedConfig::new(d.playlist_id.clone(), source);
            feed.title = d.summary.title.clone().unwrap_or_default();
            feed.description = d.summary.description.clone().unwrap_or_default();
            feed.author = d.summary.author.clone().unwrap_or_default();
            feed.image_url = d.summary.image_url.clone();
            feed.playlist_guid = d.summary.guid.clone();
            Some(feed)
        })
        .collect()
}
