//! `musicl diff <playlist>`: show the unified diff of what sync would write.

use anyhow::{Context, Result};
use clap::Args;

use musicl_core::types::PlaylistId;
use musicl_sync::diff_playlist;

use super::{block_on, Session};

/// Arguments for `musicl diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Playlist id to diff.
    pub playlist: String,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let session = Session::open()?;
        let id = PlaylistId::from(self.playlist.as_str());
        let feed = session
            .config
            .feed(&id)
            .with_context(|| format!("no configured feed named '{id}'"))?;

        let result = block_on(diff_playlist(&session.coordinator, feed))?
            .with_context(|| format!("diff failed for '{id}'"))?;

        match result.unified_diff {
            None => println!("No differences for '{}'.", result.playlist_id),
            Some(diff) => {
                print!("{diff}");
                if !diff.ends_with('\n') {
                    println!();
                }
            }
        }
        Ok(())
    }
}
