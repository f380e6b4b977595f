use std::path::{Path, PathBuf};
use std::time::Duration;

use musicl_core::config::musicl_root;

/// Quiet period before a burst of config edits triggers one reload.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    musicl_root(home).join(DAEMON_SOCKET)
}

/// `true` if `path` is the watched `config.yaml` under `root`.
pub fn is_config_file(path: &Path, root: &Path) -> bool {
    path.parent() == Some(root)
        && path.file_name().and_then(|n| n.to_str()) == Some(musicl_core::config::CONFIG_FILE)
}
