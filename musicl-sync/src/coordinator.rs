//! One reconciliation pass per feed, wrapped in store I/O.
//!
//! ## `sync_one`
//!
//! 1. Fetch the upstream feed (network, with backoff).
//! 2. Read the stored playlist and its version token (network, with backoff).
//! 3. Detect, extract, reconcile and render. Pure, never suspended.
//! 4. Write the local cache copy.
//! 5. `put_if_version` against the token from step 2.
//! 6. Announce the new document.
//!
//! A version conflict in step 5 restarts from step 2, at most
//! `settings.conflict_retries` times. The store is never force-overwritten.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use musicl_core::config::Settings;
use musicl_core::types::{ChannelMeta, Episode, FeedConfig, FeedCursor, PlaylistFormat};
use musicl_detector::{detect_or_default, inspect, PlaylistSummary};
use musicl_reconcile::{
    extract_existing, extract_item_keys, extract_upstream, reconcile, ReconcileError,
    ReconciliationResult,
};
use musicl_renderer::{channel_guid, derive_guid, newest_publish_date, Renderer};

use crate::adapters;
use crate::cursor::CursorStore;
use crate::error::SyncError;
use crate::local_cache::{LocalCache, WriteResult};
use crate::ports::{Announcement, ChangeNotifier, FeedReader, FetchedFeed, VersionedStore};
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Options and outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Run the whole pass but write nothing.
    pub dry_run: bool,
    /// Ignore the cursor short-circuit.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// A new document was committed.
    Written,
    /// The rendered document matched the stored one.
    Unchanged,
    /// The newest upstream episode was already seen.
    UpToDate,
    /// Dry run; nothing was written.
    DryRun,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Written => "written",
            SyncStatus::Unchanged => "unchanged",
            SyncStatus::UpToDate => "up-to-date",
            SyncStatus::DryRun => "dry-run",
        };
        f.write_str(s)
    }
}

/// Result of one feed's pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub playlist_id: String,
    pub status: SyncStatus,
    pub written: bool,
    pub format: PlaylistFormat,
    pub added: usize,
    pub carried_over: usize,
    pub orphaned: usize,
    /// Entries in the resulting document.
    pub total: usize,
    pub newest_episode_key: Option<String>,
    pub public_url: String,
    /// Store version after the pass, when known.
    pub version: Option<String>,
    pub announcement: Option<Announcement>,
    #[serde(skip)]
    pub local: Option<WriteResult>,
}

/// A rendered pass that has not been written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub path: String,
    pub current: Option<String>,
    /// Equal to `current` when only `lastBuildDate` would move.
    pub proposed: String,
    pub format: PlaylistFormat,
    pub result: ReconciliationResult,
}

// ---------------------------------------------------------------------------
// Composition (pure)
// ---------------------------------------------------------------------------

struct Composed {
    format: PlaylistFormat,
    result: ReconciliationResult,
    total: usize,
    title: String,
    document: String,
    unchanged: bool,
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Newest episode by publish date; the first one in feed order otherwise.
fn newest_episode(episodes: &[Episode]) -> Option<&Episode> {
    episodes
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.published_at.cmp(&b.published_at).then(ib.cmp(ia)))
        .map(|(_, e)| e)
}

fn channel_meta(
    feed: &FeedConfig,
    fetched: &FetchedFeed,
    summary: &PlaylistSummary,
    public_url: &str,
    now: DateTime<Utc>,
) -> ChannelMeta {
    let upstream = &fetched.channel;
    ChannelMeta {
        title: first_non_empty([
            Some(feed.title.as_str()),
            summary.title.as_deref(),
            Some(upstream.title.as_str()),
            Some(feed.playlist_id.as_str()),
        ]),
        description: first_non_empty([
            Some(feed.description.as_str()),
            summary.description.as_deref(),
            Some(upstream.description.as_str()),
        ]),
        author: first_non_empty([Some(feed.author.as_str()), summary.author.as_deref()]),
        link: first_non_empty([
            summary.link.as_deref(),
            Some(upstream.link.as_str()),
            Some(feed.source_url.as_str()),
        ]),
        source_url: feed.source_url.clone(),
        image_url: first_non_empty([
            feed.image_url.as_deref(),
            summary.image_url.as_deref(),
            upstream.image_url.as_deref(),
        ]),
        guid: channel_guid(
            feed.playlist_guid.as_deref(),
            summary.guid.as_deref(),
            public_url,
        ),
        language: "en".to_string(),
        pub_date: newest_publish_date(&fetched.episodes)
            .or_else(|| summary.pub_time())
            .unwrap_or(now),
        last_build_date: now,
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Drives single-feed passes against injected collaborators.
pub struct SyncCoordinator {
    settings: Settings,
    reader: Arc<dyn FeedReader>,
    store: Arc<dyn VersionedStore>,
    notifier: Arc<dyn ChangeNotifier>,
    renderer: Renderer,
    cursors: CursorStore,
    cache: Option<Arc<LocalCache>>,
    retry: RetryPolicy,
    clock: fn() -> DateTime<Utc>,
}

impl SyncCoordinator {
    pub fn new(
        settings: Settings,
        reader: Arc<dyn FeedReader>,
        store: Arc<dyn VersionedStore>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Result<Self, SyncError> {
        let renderer = Renderer::with_template_dir(settings.template_dir.as_deref())?;
        Ok(Self {
            retry: RetryPolicy::from(&settings.retry),
            cursors: CursorStore::new(store.clone(), settings.clone()),
            settings,
            reader,
            store,
            notifier,
            renderer,
            cache: None,
            clock: Utc::now,
        })
    }

    /// Coordinator with the adapters selected by `settings` and a local cache
    /// under `home`.
    pub fn from_settings(home: &Path, settings: &Settings) -> Result<Self, SyncError> {
        let mut settings = settings.clone();
        if let Some(dir) = &settings.template_dir {
            settings.template_dir = Some(musicl_core::config::resolve_path(home, dir));
        }
        let coordinator = Self::new(
            settings.clone(),
            adapters::reader_from_settings(&settings)?,
            adapters::store_from_settings(home, &settings)?,
            adapters::notifier_from_settings(&settings)?,
        )?;
        Ok(coordinator.with_local_cache(Arc::new(LocalCache::new(home))))
    }

    pub fn with_local_cache(mut self, cache: Arc<LocalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// Hydrate the cursor from the store, run one pass, then persist the new
    /// cursor (not on dry runs).
    pub async fn check(
        &self,
        feed: &FeedConfig,
        opts: SyncOptions,
    ) -> Result<SyncOutcome, SyncError> {
        let mut feed = feed.clone();
        feed.cursor = match self.cursors.load(&feed.playlist_id).await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::warn!(playlist = %feed.playlist_id, error = %e, "cursor unavailable; checking without it");
                FeedCursor::default()
            }
        };

        let outcome = self.sync_one(&feed, opts).await?;

        if !opts.dry_run {
            let cursor = FeedCursor {
                last_checked_at: Some((self.clock)()),
                last_seen_episode_key: outcome.newest_episode_key.clone(),
            };
            if let Err(e) = self.cursors.save(&feed.playlist_id, &cursor).await {
                tracing::warn!(playlist = %feed.playlist_id, error = %e, "failed to save cursor");
            }
        }
        Ok(outcome)
    }

    /// One reconciliation pass for `feed`, using the cursor it carries.
    pub async fn sync_one(
        &self,
        feed: &FeedConfig,
        opts: SyncOptions,
    ) -> Result<SyncOutcome, SyncError> {
        let id = &feed.playlist_id;
        let path = self.settings.playlist_path(id);
        let public_url = self.store.public_url(&path);

        let fetched = self.fetch(feed).await?;
        let newest_key = newest_episode(&fetched.episodes).map(|e| e.key.clone());

        let attempts = self.settings.conflict_retries.max(1);
        for attempt in 1..=attempts {
            let store = &*self.store;
            let p = path.as_str();
            let current = self
                .retry
                .run("read playlist", move || store.get_with_version(p))
                .await?;

            let outcome = |status: SyncStatus, composed: Option<&Composed>| SyncOutcome {
                playlist_id: id.to_string(),
                status,
                written: status == SyncStatus::Written,
                format: composed.map(|c| c.format).unwrap_or_else(|| {
                    detect_or_default(current.content.as_deref(), self.settings.default_format)
                }),
                added: composed.map_or(0, |c| c.result.added),
                carried_over: composed.map_or(0, |c| c.result.carried_over),
                orphaned: composed.map_or(0, |c| c.result.orphaned),
                total: composed.map_or(0, |c| c.total),
                newest_episode_key: newest_key.clone(),
                public_url: public_url.clone(),
                version: current.version.clone(),
                announcement: None,
                local: None,
            };

            if !opts.force
                && current.content.is_some()
                && newest_key.is_some()
                && feed.cursor.last_seen_episode_key == newest_key
            {
                tracing::info!(playlist = %id, key = ?newest_key, "no new upstream episodes");
                return Ok(outcome(SyncStatus::UpToDate, None));
            }

            let composed = self.compose(feed, &fetched, current.content.as_deref(), &public_url)?;

            if composed.unchanged {
                tracing::info!(playlist = %id, total = composed.total, "playlist unchanged");
                let mut out = outcome(SyncStatus::Unchanged, Some(&composed));
                if let (Some(existing), false) = (current.content.as_deref(), opts.dry_run) {
                    out.local = self.write_local(feed, existing, false).await?;
                }
                return Ok(out);
            }

            if opts.dry_run {
                let mut out = outcome(SyncStatus::DryRun, Some(&composed));
                out.local = self.write_local(feed, &composed.document, true).await?;
                tracing::info!(
                    playlist = %id,
                    added = composed.result.added,
                    total = composed.total,
                    "dry run: playlist would be written"
                );
                return Ok(out);
            }

            let local = self.write_local(feed, &composed.document, false).await?;

            let message = format!(
                "Update playlist {id} from {}: {} new, {} kept, {} preserved",
                composed.title,
                composed.result.added,
                composed.result.carried_over,
                composed.result.orphaned
            );
            let expected = current.version.as_deref();
            let document = composed.document.as_str();
            let msg = message.as_str();
            let written = self
                .retry
                .run("write playlist", move || {
                    store.put_if_version(p, document, expected, msg)
                })
                .await;

            match written {
                Ok(version) => {
                    tracing::info!(
                        playlist = %id,
                        added = composed.result.added,
                        carried_over = composed.result.carried_over,
                        orphaned = composed.result.orphaned,
                        attempt,
                        "playlist written"
                    );
                    let announcement = self.notifier.announce(&public_url).await;
                    if !announcement.accepted {
                        tracing::warn!(playlist = %id, detail = %announcement.detail, "change notification not accepted");
                    }
                    let mut out = outcome(SyncStatus::Written, Some(&composed));
                    out.version = Some(version);
                    out.announcement = Some(announcement);
                    out.local = local;
                    return Ok(out);
                }
                Err(e) if e.is_conflict() => {
                    tracing::warn!(playlist = %id, attempt, attempts, "version conflict; re-reading");
                }
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::VersionConflict { path, attempts })
    }

    /// Render the pass for `feed` without writing anything.
    pub async fn preview(&self, feed: &FeedConfig) -> Result<Preview, SyncError> {
        let path = self.settings.playlist_path(&feed.playlist_id);
        let public_url = self.store.public_url(&path);
        let fetched = self.fetch(feed).await?;
        let store = &*self.store;
        let p = path.as_str();
        let current = self
            .retry
            .run("read playlist", move || store.get_with_version(p))
            .await?;
        let composed = self.compose(feed, &fetched, current.content.as_deref(), &public_url)?;
        let proposed = match (&current.content, composed.unchanged) {
            (Some(existing), true) => existing.clone(),
            _ => composed.document,
        };
        Ok(Preview {
            path,
            current: current.content,
            proposed,
            format: composed.format,
            result: composed.result,
        })
    }

    async fn fetch(&self, feed: &FeedConfig) -> Result<FetchedFeed, SyncError> {
        let reader = &*self.reader;
        let url = feed.source_url.as_str();
        let fetched = self.retry.run("fetch feed", move || reader.fetch(url)).await?;
        if fetched.episodes.is_empty() {
            return Err(SyncError::EmptyFeed {
                url: feed.source_url.clone(),
            });
        }
        Ok(fetched)
    }

    async fn write_local(
        &self,
        feed: &FeedConfig,
        content: &str,
        dry_run: bool,
    ) -> Result<Option<WriteResult>, SyncError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let result = Arc::clone(cache)
            .write_detached(feed.playlist_id.clone(), content.to_string(), dry_run)
            .await?;
        Ok(Some(result))
    }

    fn compose(
        &self,
        feed: &FeedConfig,
        fetched: &FetchedFeed,
        existing: Option<&str>,
        public_url: &str,
    ) -> Result<Composed, SyncError> {
        let format = detect_or_default(existing, self.settings.default_format);
        let summary = existing.map(inspect).unwrap_or_default();

        let (result, total) = match format {
            PlaylistFormat::RemoteItemsOnly => {
                let feed_guid = fetched
                    .channel
                    .feed_guid
                    .clone()
                    .or_else(|| feed.feed_guid.clone())
                    .unwrap_or_else(|| derive_guid(&feed.source_url));
                let current = existing.map(extract_existing).unwrap_or_default();
                let upstream = extract_upstream(&fetched.raw_markup)
                    .with_episode_fallback(&fetched.episodes, &feed_guid);
                let result = reconcile(&current, &upstream).map_err(|e| match e {
                    ReconcileError::NoContent => SyncError::NoContent {
                        playlist: feed.playlist_id.to_string(),
                    },
                })?;
                let total = result.total();
                (result, total)
            }
            PlaylistFormat::FullItems => {
                let known = existing.map(extract_item_keys).unwrap_or_default();
                let carried_over = fetched
                    .episodes
                    .iter()
                    .filter(|e| known.contains(&e.key))
                    .count();
                let result = ReconciliationResult {
                    items: Vec::new(),
                    added: fetched.episodes.len() - carried_over,
                    carried_over,
                    orphaned: 0,
                };
                (result, fetched.episodes.len())
            }
        };

        let now = (self.clock)();
        let mut meta = channel_meta(feed, fetched, &summary, public_url, now);
        let document = self
            .renderer
            .render(format, &meta, &result, &fetched.episodes)?;

        let unchanged = match (existing, summary.last_build_time()) {
            (Some(existing), Some(built)) => {
                meta.last_build_date = built;
                let replay = self
                    .renderer
                    .render(format, &meta, &result, &fetched.episodes)?;
                replay == existing
            }
            (Some(existing), None) => document == existing,
            (None, _) => false,
        };

        Ok(Composed {
            format,
            result,
            total,
            title: meta.title,
            document,
            unchanged,
        })
    }
}
