//! Concrete collaborators and the factory that picks them from settings.

mod fs_store;
mod github;
mod http_feed;
mod podping;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use musicl_core::config::{resolve_path, Settings, StoreTarget};

pub use fs_store::FsStore;
pub use github::GitHubStore;
pub use http_feed::{parse_feed, HttpFeedReader};
pub use podping::PodpingNotifier;

use crate::error::SyncError;
use crate::ports::{ChangeNotifier, DisabledNotifier, FeedReader, VersionedStore};

/// Store selected by `settings.store`. Relative filesystem roots resolve
/// against `~/.musicl/`.
pub fn store_from_settings(
    home: &Path,
    settings: &Settings,
) -> Result<Arc<dyn VersionedStore>, SyncError> {
    Ok(match &settings.store {
        StoreTarget::Github(target) => {
            Arc::new(GitHubStore::new(target, &settings.notifier.user_agent)?)
        }
        StoreTarget::Filesystem { root } => Arc::new(FsStore::new(resolve_path(home, root))),
    })
}

pub fn notifier_from_settings(settings: &Settings) -> Result<Arc<dyn ChangeNotifier>, SyncError> {
    if !settings.notifier.enabled {
        return Ok(Arc::new(DisabledNotifier));
    }
    Ok(Arc::new(PodpingNotifier::new(&settings.notifier)?))
}

pub fn reader_from_settings(settings: &Settings) -> Result<Arc<dyn FeedReader>, SyncError> {
    Ok(Arc::new(HttpFeedReader::new(
        Duration::from_secs(30),
        &settings.notifier.user_agent,
    )?))
}
