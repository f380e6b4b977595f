//! Collaborator contracts consumed by the coordinator.
//!
//! Concrete implementations live in [`crate::adapters`]; tests substitute
//! their own.

use async_trait::async_trait;
use serde::Serialize;

use musicl_core::types::{Episode, UpstreamChannel};

use crate::error::SyncError;

/// One upstream fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchedFeed {
    pub episodes: Vec<Episode>,
    pub channel: UpstreamChannel,
    /// Unmodified upstream bytes; re-scanned for pointers.
    pub raw_markup: String,
}

#[async_trait]
pub trait FeedReader: Send + Sync {
    /// Fails with [`SyncError::Fetch`] on network or parse problems and with
    /// [`SyncError::EmptyFeed`] when the feed has no episodes.
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, SyncError>;
}

/// Content and version token at a store path. Both are `None` when the path
/// does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Versioned {
    pub content: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
}

/// Remote document store with optimistic concurrency.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    async fn get_with_version(&self, path: &str) -> Result<Versioned, SyncError>;

    /// Write `content` if the current version still equals `expected`.
    ///
    /// `expected = None` means the path must not exist yet. A stale token is
    /// [`SyncError::VersionConflict`]. Returns the new version token.
    async fn put_if_version(
        &self,
        path: &str,
        content: &str,
        expected: Option<&str>,
        message: &str,
    ) -> Result<String, SyncError>;

    /// Files directly under `path`. A missing directory is empty.
    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, SyncError>;

    /// Public URL readers use to fetch `path`.
    fn public_url(&self, path: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub accepted: bool,
    pub detail: String,
}

/// Best-effort "feed changed" announcement. Never fails.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn announce(&self, public_url: &str) -> Announcement;
}

/// Notifier used when announcements are turned off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl ChangeNotifier for DisabledNotifier {
    async fn announce(&self, _public_url: &str) -> Announcement {
        Announcement {
            accepted: false,
            detail: "notifications disabled".to_string(),
        }
    }
}
