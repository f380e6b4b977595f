//! musicl core library: domain types, configuration, markup scanning.
//!
//! - [`types`]: newtypes and domain structs
//! - [`config`]: `config.yaml` load / save / init
//! - [`markup`]: tolerant tag scanner used by detection and extraction
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod markup;
pub mod types;

pub use config::{Config, Settings, StoreTarget};
pub use error::ConfigError;
pub use types::{
    ChannelMeta, Enclosure, Episode, FeedConfig, FeedCursor, PlaylistFormat, PlaylistId, Pointer,
    RemoteItem, UpstreamChannel,
};
