//! `musicl daemon`: background scheduler lifecycle.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::{json, Value};

use musicl_daemon::{request_status, request_stop, request_sync, start_blocking, DaemonError};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run feed timers, the config watcher and the control socket in the foreground.
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Ask the running daemon to check feeds now.
    Sync {
        /// Playlist id; every scheduled feed when omitted.
        playlist: Option<String>,
    },
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home_dir()?;
    match command {
        DaemonCommand::Start => start_blocking(&home).context("daemon exited with error"),
        DaemonCommand::Stop => stop(&home),
        DaemonCommand::Status => status(&home),
        DaemonCommand::Sync { playlist } => {
            let target = playlist.as_deref().unwrap_or("all feeds").to_string();
            let reply = request_sync(&home, playlist)
                .with_context(|| format!("daemon could not sync {target}"))?;
            print_json(&reply)
        }
    }
}

fn stop(home: &Path) -> Result<()> {
    match request_stop(home) {
        Ok(()) => println!("daemon stop requested"),
        Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
        Err(err) => return Err(err).context("failed to stop daemon"),
    }
    Ok(())
}

/// Prints the daemon's status payload, or a stub when nothing is listening.
fn status(home: &Path) -> Result<()> {
    let payload = match request_status(home) {
        Ok(payload) => payload,
        Err(DaemonError::DaemonNotRunning { socket }) => json!({
            "running": false,
            "socket": socket.display().to_string(),
        }),
        Err(err) => return Err(err).context("failed to query daemon status"),
    };
    print_json(&payload)
}

fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render daemon JSON")?;
    println!("{rendered}");
    Ok(())
}
