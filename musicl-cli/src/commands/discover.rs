//! `musicl discover`: playlists already present in the store.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use musicl_sync::{discover, DiscoveredPlaylist};

use super::{block_on, Session};

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct DiscoveredJson<'a> {
    #[serde(flatten)]
    playlist: &'a DiscoveredPlaylist,
    configured: bool,
}

#[derive(Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "playlist")]
    id: String,
    #[tabled(rename = "format")]
    format: String,
    #[tabled(rename = "entries")]
    entries: usize,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "source feed")]
    source: String,
    #[tabled(rename = "configured")]
    configured: String,
}

impl DiscoverArgs {
    pub fn run(self) -> Result<()> {
        let session = Session::open()?;
        let dir = &session.config.settings.playlists_dir;
        let found = block_on(discover(&**session.coordinator.store(), dir))?
            .with_context(|| format!("failed to list playlists under '{dir}'"))?;
        let configured = |p: &DiscoveredPlaylist| session.config.feed(&p.playlist_id).is_some();

        if self.json {
            let payload: Vec<DiscoveredJson<'_>> = found
                .iter()
                .map(|p| DiscoveredJson {
                    playlist: p,
                    configured: configured(p),
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to serialize discovery JSON")?
            );
            return Ok(());
        }

        if found.is_empty() {
            println!("No playlists under '{dir}'.");
            return Ok(());
        }
        let rows: Vec<DiscoveredRow> = found
            .iter()
            .map(|p| DiscoveredRow {
                id: p.playlist_id.to_string(),
                format: p.summary.format.to_string(),
                entries: p.summary.entry_count(),
                title: p.summary.title.clone().unwrap_or_default(),
                source: p.summary.source_feed.clone().unwrap_or_else(|| "-".to_string()),
                configured: if configured(p) { "yes" } else { "no" }.to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        let importable = found
            .iter()
            .filter(|p| !configured(p) && p.summary.source_feed.is_some())
            .count();
        if importable > 0 {
            println!("{importable} playlist(s) can be added with 'musicl feed import'.");
        }
        Ok(())
    }
}
