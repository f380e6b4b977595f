//! Domain types shared by every musicl crate.
//!
//! Feed policy ([`FeedConfig`]) is persisted in the YAML config; the cursor it
//! carries is persisted separately through the playlist store. Everything that
//! describes a single fetch ([`Episode`], [`UpstreamChannel`]) is rebuilt on
//! every pass and never written anywhere.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::markup::escape;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable key of a playlist; also the file stem in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlaylistId(pub String);

impl PlaylistId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PlaylistId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PlaylistId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// On-disk shape of a playlist document.
///
/// Detected once from the existing document and then kept for the lifetime of
/// the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PlaylistFormat {
    /// Every entry is a full `<item>` with its own title and enclosure.
    FullItems,
    /// Channel metadata followed by `<podcast:remoteItem>` pointers only.
    #[default]
    RemoteItemsOnly,
}

impl fmt::Display for PlaylistFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaylistFormat::FullItems => write!(f, "full-items"),
            PlaylistFormat::RemoteItemsOnly => write!(f, "remote-items-only"),
        }
    }
}

impl FromStr for PlaylistFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full-items" | "full" => Ok(Self::FullItems),
            "remote-items-only" | "remote-items" | "remote" => Ok(Self::RemoteItemsOnly),
            other => Err(format!(
                "unknown playlist format '{other}'; expected: full-items, remote-items-only"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Pointers
// ---------------------------------------------------------------------------

/// A `(feedGuid, itemGuid)` pair referencing an item hosted in another feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    pub feed_guid: String,
    pub item_guid: String,
}

impl Pointer {
    pub fn new(feed_guid: impl Into<String>, item_guid: impl Into<String>) -> Self {
        Self {
            feed_guid: feed_guid.into(),
            item_guid: item_guid.into(),
        }
    }
}

/// A pointer as stored in a playlist, together with its exact serialization.
///
/// Identity is `item_guid` alone. `raw_form` is emitted verbatim when the item
/// is carried forward, so a document that round-trips keeps its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub feed_guid: String,
    pub item_guid: String,
    pub raw_form: String,
}

impl RemoteItem {
    /// Build a fresh pointer with the canonical self-closing serialization.
    pub fn synthesize(pointer: &Pointer) -> Self {
        let raw_form = format!(
            r#"<podcast:remoteItem feedGuid="{}" itemGuid="{}"/>"#,
            escape(&pointer.feed_guid),
            escape(&pointer.item_guid),
        );
        Self {
            feed_guid: pointer.feed_guid.clone(),
            item_guid: pointer.item_guid.clone(),
            raw_form,
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream feed
// ---------------------------------------------------------------------------

/// Media attachment of an upstream episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// One upstream item as returned by a feed reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// guid, else link.
    pub key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<Enclosure>,
    /// Pointers the reader found attached to this episode.
    #[serde(default)]
    pub pointers: Vec<Pointer>,
}

/// Channel-level metadata of the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpstreamChannel {
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// The feed's own `podcast:guid`, when it declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_guid: Option<String>,
}

// ---------------------------------------------------------------------------
// Playlist channel
// ---------------------------------------------------------------------------

/// Channel metadata written at the top of a playlist document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub title: String,
    pub description: String,
    pub author: String,
    pub link: String,
    /// Upstream feed this playlist is derived from.
    pub source_url: String,
    pub image_url: String,
    /// The playlist's own `podcast:guid`.
    pub guid: String,
    pub language: String,
    pub pub_date: DateTime<Utc>,
    pub last_build_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Feed policy
// ---------------------------------------------------------------------------

/// Progress marker of a monitored feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedCursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_episode_key: Option<String>,
}

/// Identity and policy for one monitored upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub playlist_id: PlaylistId,
    pub source_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Fixed channel `podcast:guid` for the playlist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_guid: Option<String>,
    /// Feed guid used for synthesized pointers when upstream declares none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_guid: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_minutes: Option<u64>,
    /// Lives in the store, not in the config file.
    #[serde(skip)]
    pub cursor: FeedCursor,
}

fn default_enabled() -> bool {
    true
}

impl FeedConfig {
    pub fn new(playlist_id: impl Into<PlaylistId>, source_url: impl Into<String>) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            source_url: source_url.into(),
            title: String::new(),
            description: String::new(),
            author: String::new(),
            image_url: None,
            playlist_guid: None,
            feed_guid: None,
            enabled: true,
            poll_interval_minutes: None,
            cursor: FeedCursor::default(),
        }
    }

    /// Display name: the configured title, else the playlist id.
    pub fn display_name(&self) -> &str {
        if self.title.trim().is_empty() {
            self.playlist_id.as_str()
        } else {
            &self.title
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
