//! # musicl-sync
//!
//! Drives reconciliation passes against the playlist store.
//!
//! [`SyncCoordinator::check`] runs one feed end to end: fetch, read with a
//! version token, reconcile, render, write the local cache copy, commit with
//! `put_if_version`, announce. [`pipeline::run`] fans a run out over many
//! feeds and turns every failure into a per-feed report.
//!
//! The collaborators behind [`ports`] are injected; [`adapters`] holds the
//! HTTP, GitHub, filesystem and podping implementations.

pub mod adapters;
pub mod coordinator;
pub mod cursor;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod hash_store;
pub mod local_cache;
pub mod pipeline;
pub mod ports;
pub mod retry;

pub use coordinator::{Preview, SyncCoordinator, SyncOptions, SyncOutcome, SyncStatus};
pub use cursor::CursorStore;
pub use diff::{diff_playlist, PlaylistDiff};
pub use discovery::{discover, import_candidates, DiscoveredPlaylist};
pub use error::SyncError;
pub use local_cache::{LocalCache, WriteResult};
pub use pipeline::{FeedReport, ReportView, RunSummary, SyncScope};
pub use ports::{
    Announcement, ChangeNotifier, DirEntry, DisabledNotifier, FeedReader, FetchedFeed, Versioned,
    VersionedStore,
};
pub use retry::RetryPolicy;
