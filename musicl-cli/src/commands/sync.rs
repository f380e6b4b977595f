//! `musicl sync`: reconcile playlists against their upstream feeds.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use musicl_core::types::PlaylistId;
use musicl_sync::{
    pipeline::{self, SyncScope},
    FeedReport, ReportView, RunSummary, SyncOptions, SyncStatus, WriteResult,
};

use super::{block_on, Session};

/// Arguments for `musicl sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Playlist id to sync (omit when using `--all`).
    pub playlist: Option<String>,

    /// Sync every enabled feed.
    #[arg(long, conflicts_with = "playlist")]
    pub all: bool,

    /// Run the full pass but write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore the cursor and reconcile even if no new episode appeared.
    #[arg(long)]
    pub force: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let scope = match (&self.playlist, self.all) {
            (Some(id), false) => SyncScope::Feed(PlaylistId::from(id.as_str())),
            (None, true) => SyncScope::All,
            _ => bail!("provide a playlist id or use --all"),
        };
        let opts = SyncOptions {
            dry_run: self.dry_run,
            force: self.force,
        };

        let session = Session::open()?;
        let summary = block_on(pipeline::run(
            session.coordinator.clone(),
            &session.config,
            scope,
            opts,
        ))?
        .context("sync failed")?;

        if self.json {
            let views: Vec<ReportView<'_>> = summary.reports.iter().map(ReportView::from).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&views).context("failed to serialize sync JSON")?
            );
        } else {
            print_summary(&summary, self.dry_run, session.config.settings.notifier.enabled);
        }

        if !summary.is_success() {
            bail!("{} of {} feed(s) failed", summary.failed, summary.reports.len());
        }
        Ok(())
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool, notify: bool) {
    if summary.reports.is_empty() {
        println!("No enabled feeds. Run `musicl feed add` first.");
        return;
    }
    let prefix = if dry_run { "[dry-run] " } else { "" };
    for report in &summary.reports {
        print_report(report, prefix, notify);
    }
}

fn print_report(report: &FeedReport, prefix: &str, notify: bool) {
    let id = &report.playlist_id;
    let outcome = match &report.result {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("{prefix}{} '{id}' failed: {err}", "✗".red().bold());
            return;
        }
    };

    let mark = match outcome.status {
        SyncStatus::Written | SyncStatus::DryRun => "✓".green().bold(),
        SyncStatus::Unchanged | SyncStatus::UpToDate => "·".bright_black().bold(),
    };
    if outcome.status == SyncStatus::UpToDate {
        println!("{prefix}{mark} '{id}' up-to-date (no new episodes)");
        return;
    }
    println!(
        "{prefix}{mark} '{id}' {} ({} new, {} kept, {} preserved; {} total)",
        outcome.status, outcome.added, outcome.carried_over, outcome.orphaned, outcome.total,
    );
    match &outcome.local {
        Some(WriteResult::Written { path }) => println!("  ✎  {}", path.display()),
        Some(WriteResult::WouldWrite { path }) => println!("  ~  {}", path.display()),
        Some(WriteResult::Unchanged { path }) => println!("  ·  {}", path.display()),
        None => {}
    }
    if let Some(announcement) = outcome.announcement.as_ref().filter(|_| notify) {
        if !announcement.accepted {
            println!("  !  notification not accepted: {}", announcement.detail);
        }
    }
}
