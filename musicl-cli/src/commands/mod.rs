//! Subcommand implementations.

pub mod daemon;
pub mod diff;
pub mod discover;
pub mod feed;
pub mod init;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use musicl_core::config::{self, Config};
use musicl_sync::SyncCoordinator;

/// Everything a store-touching command needs.
pub struct Session {
    pub home: PathBuf,
    pub config: Config,
    pub coordinator: Arc<SyncCoordinator>,
}

impl Session {
    pub fn open() -> Result<Self> {
        let home = home_dir()?;
        let config = config::load_at(&home)
            .context("failed to load config; run `musicl init` first")?;
        let coordinator = SyncCoordinator::from_settings(&home, &config.settings)
            .context("failed to set up the playlist store")?;
        Ok(Self {
            home,
            config,
            coordinator: Arc::new(coordinator),
        })
    }
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Drive one async command to completion.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
