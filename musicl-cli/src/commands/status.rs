//! `musicl status`: per-feed cursor and playlist visibility.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use musicl_core::types::{FeedConfig, FeedCursor, PlaylistFormat};
use musicl_detector::inspect;

use super::{block_on, Session};

/// Arguments for `musicl status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let session = Session::open()?;
        let rows = block_on(collect(&session))?;

        if self.json {
            let payload = StatusReportJson {
                summary: StatusSummaryJson {
                    feeds: rows.len(),
                    enabled: rows.iter().filter(|r| r.enabled).count(),
                    missing: rows.iter().filter(|r| !r.exists && r.error.is_none()).count(),
                },
                feeds: rows,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(rows);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    feeds: Vec<FeedStatusRow>,
}

#[derive(Debug, Serialize)]
struct StatusSummaryJson {
    feeds: usize,
    enabled: usize,
    /// Feeds whose playlist is not in the store yet.
    missing: usize,
}

#[derive(Debug, Serialize)]
struct FeedStatusRow {
    playlist_id: String,
    enabled: bool,
    interval_minutes: u64,
    path: String,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<PlaylistFormat>,
    entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_build_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen_episode_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "playlist")]
    playlist: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "format")]
    format: String,
    #[tabled(rename = "entries")]
    entries: usize,
    #[tabled(rename = "last check")]
    last_check: String,
    #[tabled(rename = "newest episode")]
    newest: String,
}

async fn collect(session: &Session) -> Vec<FeedStatusRow> {
    let mut rows = Vec::with_capacity(session.config.feeds.len());
    for feed in &session.config.feeds {
        rows.push(feed_status(session, feed).await);
    }
    rows
}

async fn feed_status(session: &Session, feed: &FeedConfig) -> FeedStatusRow {
    let settings = &session.config.settings;
    let id = &feed.playlist_id;
    let path = settings.playlist_path(id);
    let mut row = FeedStatusRow {
        playlist_id: id.to_string(),
        enabled: feed.enabled,
        interval_minutes: session.config.interval_for(feed).as_secs() / 60,
        path: path.clone(),
        exists: false,
        format: None,
        entries: 0,
        last_build_date: None,
        last_checked_at: None,
        last_seen_episode_key: None,
        error: None,
    };

    let cursor = session
        .coordinator
        .cursors()
        .load(id)
        .await
        .unwrap_or_else(|e| {
            row.error = Some(e.to_string());
            FeedCursor::default()
        });
    row.last_checked_at = cursor.last_checked_at;
    row.last_seen_episode_key = cursor.last_seen_episode_key;

    match session.coordinator.store().get_with_version(&path).await {
        Ok(current) => {
            if let Some(content) = current.content {
                let summary = inspect(&content);
                row.exists = true;
                row.format = Some(summary.format);
                row.entries = summary.entry_count();
                row.last_build_date = summary.last_build_date;
            }
        }
        Err(e) => row.error = Some(e.to_string()),
    }
    row
}

fn print_table(rows: Vec<FeedStatusRow>) {
    let enabled = rows.iter().filter(|r| r.enabled).count();
    println!(
        "musicl v{} | {} feeds | {} enabled",
        env!("CARGO_PKG_VERSION"),
        rows.len(),
        enabled,
    );
    if rows.is_empty() {
        println!("No feeds configured.");
        return;
    }

    let now = Utc::now();
    let needs_sync = rows.iter().any(|r| r.enabled && !r.exists);
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            state: state_label(&row),
            playlist: row.playlist_id,
            format: row
                .format
                .map(|f| f.to_string())
                .unwrap_or_else(|| "-".to_string()),
            entries: row.entries,
            last_check: row
                .last_checked_at
                .map(|t| format_age(t, now))
                .unwrap_or_else(|| "never".to_string()),
            newest: row.last_seen_episode_key.unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if needs_sync {
        println!("Run 'musicl sync --all' to create missing playlists.");
    }
}

fn state_label(row: &FeedStatusRow) -> String {
    if let Some(error) = &row.error {
        return format!("{} {error}", "error".red().bold());
    }
    match (row.enabled, row.exists) {
        (false, _) => "disabled".bright_black().to_string(),
        (true, false) => "missing".yellow().to_string(),
        (true, true) => "ok".green().to_string(),
    }
}

/// Human-readable age such as `42s ago` or `3h ago`.
fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(timestamp).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
