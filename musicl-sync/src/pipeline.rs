//! Shared sync pipeline entrypoint used by CLI and daemon.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use musicl_core::config::Config;
use musicl_core::types::{FeedConfig, PlaylistId};

use crate::coordinator::{SyncCoordinator, SyncOptions, SyncOutcome};
use crate::SyncError;

/// Scope for a sync pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every enabled feed.
    All,
    /// A single configured feed, enabled or not.
    Feed(PlaylistId),
}

/// Per-feed result of a run.
#[derive(Debug)]
pub struct FeedReport {
    pub playlist_id: PlaylistId,
    pub title: String,
    pub result: Result<SyncOutcome, SyncError>,
}

impl FeedReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    /// Reports in config order.
    pub reports: Vec<FeedReport>,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Serializable view of a report for `--json` output.
#[derive(Debug, Serialize)]
pub struct ReportView<'a> {
    pub playlist_id: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'a SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> From<&'a FeedReport> for ReportView<'a> {
    fn from(report: &'a FeedReport) -> Self {
        Self {
            playlist_id: report.playlist_id.as_str(),
            title: &report.title,
            outcome: report.result.as_ref().ok(),
            error: report.result.as_ref().err().map(ToString::to_string),
        }
    }
}

/// Sync every feed in `scope` concurrently.
///
/// Per-feed failures become reports; only an unknown feed id fails the run.
pub async fn run(
    coordinator: Arc<SyncCoordinator>,
    config: &Config,
    scope: SyncScope,
    opts: SyncOptions,
) -> Result<RunSummary, SyncError> {
    let feeds: Vec<FeedConfig> = match &scope {
        SyncScope::All => config.enabled_feeds().cloned().collect(),
        SyncScope::Feed(id) => vec![config
            .feed(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownFeed(id.to_string()))?],
    };

    let mut tasks = JoinSet::new();
    for (index, feed) in feeds.iter().cloned().enumerate() {
        let coordinator = coordinator.clone();
        tasks.spawn(async move {
            let result = coordinator.check(&feed, opts).await;
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<SyncOutcome, SyncError>>> =
        feeds.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => tracing::error!(error = %e, "sync task panicked"),
        }
    }

    let mut summary = RunSummary::default();
    for (feed, result) in feeds.iter().zip(results) {
        let result = result.unwrap_or_else(|| {
            Err(SyncError::StoreAccess {
                path: feed.playlist_id.to_string(),
                message: "sync task did not complete".to_string(),
            })
        });
        match &result {
            Ok(outcome) => {
                summary.succeeded += 1;
                tracing::debug!(playlist = %feed.playlist_id, status = %outcome.status, "feed done");
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(playlist = %feed.playlist_id, error = %e, "feed failed");
            }
        }
        summary.reports.push(FeedReport {
            playlist_id: feed.playlist_id.clone(),
            title: feed.display_name().to_string(),
            result,
        });
    }

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "sync run complete"
    );
    Ok(summary)
}
