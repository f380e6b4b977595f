//! `musicl feed add|update|remove|list|import`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use musicl_core::config::{self, Config};
use musicl_core::types::{FeedConfig, PlaylistId};
use musicl_sync::{discover, import_candidates};

use super::{block_on, home_dir, Session};

#[derive(Subcommand, Debug)]
pub enum FeedCommand {
    /// Start monitoring an upstream feed.
    Add(AddArgs),

    /// Change an existing feed in place.
    Update(UpdateArgs),

    /// Stop monitoring a feed. The playlist in the store is left alone.
    Remove {
        /// Playlist id of the feed.
        id: String,
    },

    /// List configured feeds.
    List,

    /// Add feeds for store playlists that name their source feed.
    Import {
        /// Print what would be added without saving.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Playlist id; also the file stem in the store (e.g. "mmt").
    pub id: String,

    /// Upstream feed URL (http(s)://, file:// or a local path).
    pub source_url: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub image_url: Option<String>,

    /// Fixed `podcast:guid` for the playlist channel.
    #[arg(long)]
    pub playlist_guid: Option<String>,

    /// Feed guid for pointers when upstream declares none.
    #[arg(long)]
    pub feed_guid: Option<String>,

    /// Poll interval in minutes (defaults to settings.default_interval_minutes).
    #[arg(long, value_name = "MINUTES")]
    pub interval: Option<u64>,

    /// Add the feed without scheduling it.
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Playlist id of the feed.
    pub id: String,

    /// Resume scheduled checks.
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Pause scheduled checks.
    #[arg(long)]
    pub disable: bool,

    /// Poll interval in minutes.
    #[arg(long, value_name = "MINUTES")]
    pub interval: Option<u64>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// New upstream feed URL.
    #[arg(long)]
    pub url: Option<String>,
}

pub fn run(command: FeedCommand) -> Result<()> {
    match command {
        FeedCommand::Add(args) => add(args),
        FeedCommand::Update(args) => update(args),
        FeedCommand::Remove { id } => remove(&id),
        FeedCommand::List => list(),
        FeedCommand::Import { dry_run } => import(dry_run),
    }
}

fn load() -> Result<(std::path::PathBuf, Config)> {
    let home = home_dir()?;
    let config = config::load_at(&home).context("failed to load config; run `musicl init` first")?;
    Ok((home, config))
}

fn add(args: AddArgs) -> Result<()> {
    let (home, mut config) = load()?;
    let id = PlaylistId::from(args.id);
    if config.feed(&id).is_some() {
        bail!("feed '{id}' is already configured");
    }

    let mut feed = FeedConfig::new(id.clone(), args.source_url);
    feed.title = args.title.unwrap_or_default();
    feed.description = args.description.unwrap_or_default();
    feed.author = args.author.unwrap_or_default();
    feed.image_url = args.image_url;
    feed.playlist_guid = args.playlist_guid;
    feed.feed_guid = args.feed_guid;
    feed.poll_interval_minutes = args.interval;
    feed.enabled = !args.disabled;

    config.feeds.push(feed);
    config::save_at(&home, &config).with_context(|| format!("failed to add feed '{id}'"))?;
    println!("✓ Added feed '{id}' → {}", config.settings.playlist_path(&id));
    Ok(())
}

fn update(args: UpdateArgs) -> Result<()> {
    let (home, mut config) = load()?;
    let id = args.id;
    let Some(feed) = config
        .feeds
        .iter_mut()
        .find(|f| f.playlist_id.as_str() == id)
    else {
        bail!("no configured feed named '{id}'");
    };

    let mut changes = Vec::new();
    if args.enable || args.disable {
        feed.enabled = args.enable;
        changes.push(if args.enable { "enabled" } else { "disabled" }.to_string());
    }
    if let Some(minutes) = args.interval {
        feed.poll_interval_minutes = Some(minutes);
        changes.push(format!("every {minutes}m"));
    }
    if let Some(title) = args.title {
        feed.title = title;
        changes.push("title".to_string());
    }
    if let Some(description) = args.description {
        feed.description = description;
        changes.push("description".to_string());
    }
    if let Some(url) = args.url {
        changes.push(format!("source {url}"));
        feed.source_url = url;
    }
    if changes.is_empty() {
        bail!("nothing to update; pass --enable, --disable, --interval, --title, --description or --url");
    }

    config::save_at(&home, &config).with_context(|| format!("failed to update feed '{id}'"))?;
    println!("✓ Updated feed '{id}': {}", changes.join(", "));
    Ok(())
}

fn remove(id: &str) -> Result<()> {
    let (home, mut config) = load()?;
    let before = config.feeds.len();
    config.feeds.retain(|f| f.playlist_id.as_str() != id);
    if config.feeds.len() == before {
        bail!("no configured feed named '{id}'");
    }
    config::save_at(&home, &config).with_context(|| format!("failed to remove feed '{id}'"))?;
    println!("✓ Removed feed '{id}'");
    Ok(())
}

#[derive(Tabled)]
struct FeedRow {
    #[tabled(rename = "playlist")]
    id: String,
    #[tabled(rename = "enabled")]
    enabled: String,
    #[tabled(rename = "every")]
    interval: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "source")]
    source: String,
}

fn list() -> Result<()> {
    let (_, config) = load()?;
    if config.feeds.is_empty() {
        println!("No feeds configured.");
        println!("Run: musicl feed add <id> <source-url>");
        return Ok(());
    }

    let rows: Vec<FeedRow> = config
        .feeds
        .iter()
        .map(|f| FeedRow {
            id: f.playlist_id.to_string(),
            enabled: if f.enabled { "yes" } else { "no" }.to_string(),
            interval: format!("{}m", config.interval_for(f).as_secs() / 60),
            title: f.display_name().to_string(),
            source: f.source_url.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn import(dry_run: bool) -> Result<()> {
    let session = Session::open()?;
    let playlists_dir = session.config.settings.playlists_dir.clone();
    let discovered = block_on(discover(&**session.coordinator.store(), &playlists_dir))?
        .context("failed to list playlists in the store")?;

    let candidates = import_candidates(&discovered, &session.config);
    if candidates.is_empty() {
        println!("Nothing to import ({} playlists found).", discovered.len());
        return Ok(());
    }

    let prefix = if dry_run { "[dry-run] " } else { "" };
    for feed in &candidates {
        println!("{prefix}+ {} ← {}", feed.playlist_id, feed.source_url);
    }
    if dry_run {
        return Ok(());
    }

    let mut config = session.config;
    let count = candidates.len();
    config.feeds.extend(candidates);
    config::save_at(&session.home, &config).context("failed to save imported feeds")?;
    println!("✓ Imported {count} feed(s)");
    Ok(())
}
