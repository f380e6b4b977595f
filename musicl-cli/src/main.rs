//! musicl: keeps musicL playlists in step with their upstream feeds.
//!
//! # Usage
//!
//! ```text
//! musicl init [--github <owner/repo>] [--branch <name>]
//! musicl feed add <id> <source-url> [--title ...] [--interval <minutes>]
//! musicl feed update <id> [--enable|--disable] [--interval <minutes>] [--title ...] [--url ...]
//! musicl feed remove <id>
//! musicl feed list
//! musicl feed import [--dry-run]
//! musicl sync <id> [--dry-run] [--force] [--json]
//! musicl sync --all [--dry-run] [--force] [--json]
//! musicl diff <id>
//! musicl status [--json]
//! musicl discover [--json]
//! musicl daemon start|stop|status|sync [<id>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, diff::DiffArgs, discover::DiscoverArgs, feed::FeedCommand,
    init::InitArgs, status::StatusArgs, sync::SyncArgs,
};
use musicl_core::config::LoggingSettings;

#[derive(Parser, Debug)]
#[command(
    name = "musicl",
    version,
    about = "Maintain musicL playlists that mirror upstream podcast feeds",
    long_about = None,
)]
struct Cli {
    /// Log progress to stderr (`RUST_LOG` overrides).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create ~/.musicl/config.yaml.
    Init(InitArgs),

    /// Manage monitored feeds.
    Feed {
        #[command(subcommand)]
        command: FeedCommand,
    },

    /// Reconcile playlists against their upstream feeds.
    Sync(SyncArgs),

    /// Show unified diff of what sync would write for a playlist.
    Diff(DiffArgs),

    /// Show per-feed cursor and playlist state.
    Status(StatusArgs),

    /// List playlists already present in the store.
    Discover(DiscoverArgs),

    /// Run or control the background scheduler.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The daemon installs its own subscriber from the config file.
    if !matches!(
        cli.command,
        Commands::Daemon {
            command: DaemonCommand::Start
        }
    ) {
        musicl_daemon::init_tracing(&LoggingSettings {
            level: if cli.verbose { "info" } else { "warn" }.to_string(),
            json: false,
        });
    }

    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Feed { command } => commands::feed::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Discover(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
