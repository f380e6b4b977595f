//! Dry-run unified diff support for `musicl diff`.

use serde::Serialize;
use similar::TextDiff;

use musicl_core::types::FeedConfig;

use crate::coordinator::SyncCoordinator;
use crate::SyncError;

/// What a sync of one playlist would change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistDiff {
    pub playlist_id: String,
    /// Store path of the playlist.
    pub path: String,
    /// `None` when the stored document is already current.
    pub unified_diff: Option<String>,
}

impl PlaylistDiff {
    pub fn is_empty(&self) -> bool {
        self.unified_diff.is_none()
    }
}

/// Render what `sync` would write for `feed` and compare it to the stored
/// document. Nothing is written; a move of `lastBuildDate` alone is no diff.
pub async fn diff_playlist(
    coordinator: &SyncCoordinator,
    feed: &FeedConfig,
) -> Result<PlaylistDiff, SyncError> {
    let preview = coordinator.preview(feed).await?;
    let existing = normalize_line_endings(preview.current.as_deref().unwrap_or_default());
    let proposed = normalize_line_endings(&preview.proposed);

    let unified_diff = (existing != proposed).then(|| {
        let old_header = format!("a/{}", preview.path);
        let new_header = format!("b/{}", preview.path);
        TextDiff::from_lines(&existing, &proposed)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string()
    });

    Ok(PlaylistDiff {
        playlist_id: feed.playlist_id.to_string(),
        path: preview.path,
        unified_diff,
    })
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}
