//! YAML configuration: global [`Settings`] plus the list of monitored feeds.
//!
//! # Storage layout
//!
//! ```text
//! ~/.musicl/
//!   config.yaml     (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function touching disk has two forms:
//! - `fn_at(home: &Path, …)`: explicit home, used by tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! The loaded [`Config`] is a plain value. Callers load it once per run and pass
//! it down; nothing in the workspace re-reads the file behind their back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{FeedConfig, PlaylistFormat, PlaylistId};

pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// 1. Settings
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for network calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            max_delay_ms: 60_000,
        }
    }
}

/// GitHub repository used as the playlist store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubTarget {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Inline token. Prefer `token_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default = "default_github_api")]
    pub api_base: String,
}

impl GithubTarget {
    /// Inline token first, then the configured environment variable.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(&self.token_env).ok().filter(|t| !t.is_empty()))
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

/// Where playlist documents and cursors are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreTarget {
    Github(GithubTarget),
    /// A local directory. Relative roots resolve against `~/.musicl/`.
    Filesystem { root: PathBuf },
}

impl Default for StoreTarget {
    fn default() -> Self {
        StoreTarget::Filesystem {
            root: PathBuf::from("store"),
        }
    }
}

/// Podping-style change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub enabled: bool,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub token_env: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://podping.cloud".to_string(),
            token: None,
            token_env: "PODPING_TOKEN".to_string(),
            timeout_secs: 5,
            user_agent: format!("musicl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl NotifierSettings {
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(&self.token_env).ok().filter(|t| !t.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Global settings shared by every feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_interval_minutes: u64,
    pub retry: RetrySettings,
    /// Whole-pass attempts when the store reports a version conflict.
    pub conflict_retries: u32,
    /// Format for playlists that do not exist yet.
    pub default_format: PlaylistFormat,
    pub playlists_dir: String,
    pub state_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
    pub store: StoreTarget,
    pub notifier: NotifierSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_interval_minutes: 30,
            retry: RetrySettings::default(),
            conflict_retries: 3,
            default_format: PlaylistFormat::RemoteItemsOnly,
            playlists_dir: "docs".to_string(),
            state_dir: "state".to_string(),
            template_dir: None,
            store: StoreTarget::default(),
            notifier: NotifierSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Store path of a playlist document.
    pub fn playlist_path(&self, id: &PlaylistId) -> String {
        join_store_path(&self.playlists_dir, &format!("{id}.xml"))
    }

    /// Store path of a feed cursor.
    pub fn cursor_path(&self, id: &PlaylistId) -> String {
        join_store_path(&self.state_dir, &format!("{id}.json"))
    }
}

fn join_store_path(dir: &str, file: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

// ---------------------------------------------------------------------------
// 2. Config
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl Config {
    pub fn feed(&self, id: &PlaylistId) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| &f.playlist_id == id)
    }

    pub fn enabled_feeds(&self) -> impl Iterator<Item = &FeedConfig> {
        self.feeds.iter().filter(|f| f.enabled)
    }

    /// Poll period of `feed`, falling back to the global default.
    pub fn interval_for(&self, feed: &FeedConfig) -> Duration {
        let minutes = feed
            .poll_interval_minutes
            .unwrap_or(self.settings.default_interval_minutes);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    /// Reject setups that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.default_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "settings.default_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.settings.conflict_retries == 0 {
            return Err(ConfigError::Invalid(
                "settings.conflict_retries must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for feed in &self.feeds {
            let id = feed.playlist_id.as_str();
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid("feed with empty playlist_id".to_string()));
            }
            if id.contains(['/', '\\']) || id == "." || id == ".." {
                return Err(ConfigError::Invalid(format!(
                    "playlist_id '{id}' must not contain path separators"
                )));
            }
            if !seen.insert(id) {
                return Err(ConfigError::Invalid(format!("duplicate playlist_id '{id}'")));
            }
            if feed.source_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("feed '{id}' has no source_url")));
            }
            if feed.poll_interval_minutes == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "feed '{id}' poll_interval_minutes must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 3. Paths
// ---------------------------------------------------------------------------

/// `<home>/.musicl/`
pub fn musicl_root(home: &Path) -> PathBuf {
    home.join(".musicl")
}

/// `<home>/.musicl/config.yaml`, pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    musicl_root(home).join(CONFIG_FILE)
}

/// Resolve a possibly relative path against `<home>/.musicl/`.
pub fn resolve_path(home: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        musicl_root(home).join(path)
    }
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load and validate `<home>/.musicl/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?
    };
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `<home>/.musicl/config.yaml`.
///
/// Write flow: validate → serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    config.validate()?;
    let root = musicl_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 6. Init
// ---------------------------------------------------------------------------

/// Create a default config if none exists.
///
/// Idempotent: an existing file is loaded and returned unchanged. The boolean
/// is `true` when a new file was written.
pub fn init_at(home: &Path) -> Result<(Config, bool), ConfigError> {
    if config_path_at(home).exists() {
        return Ok((load_at(home)?, false));
    }
    let config = Config::default();
    save_at(home, &config)?;
    Ok((config, true))
}

/// `init_at` convenience wrapper.
pub fn init() -> Result<(Config, bool), ConfigError> {
    init_at(&home()?)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
