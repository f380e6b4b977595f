use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;

use musicl_core::config::{self, Config, LoggingSettings};
use musicl_core::types::PlaylistId;
use musicl_sync::{SyncCoordinator, SyncOutcome};

use crate::error::{io_err, DaemonError};
use crate::paths::{is_config_file, socket_path, DEBOUNCE_WINDOW};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::scheduler::{FeedScheduler, FeedStatus, Trigger};

/// State shared by the socket server and the config watcher.
pub struct DaemonState {
    home: PathBuf,
    config: RwLock<Config>,
    scheduler: Arc<FeedScheduler>,
    started_at: DateTime<Utc>,
}

impl DaemonState {
    pub fn new(home: PathBuf, config: Config, scheduler: Arc<FeedScheduler>) -> Self {
        Self {
            home,
            config: RwLock::new(config),
            scheduler,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    running: bool,
    pid: u32,
    started_at: DateTime<Utc>,
    config_path: String,
    feeds: Vec<FeedStatus>,
}

/// One feed's answer to a `sync` request.
#[derive(Debug, Serialize)]
struct TriggerView {
    playlist_id: String,
    busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TriggerView {
    fn new(id: &PlaylistId, trigger: Trigger) -> Self {
        let mut view = Self {
            playlist_id: id.to_string(),
            busy: false,
            outcome: None,
            error: None,
        };
        match trigger {
            Trigger::Ran(Ok(outcome)) => view.outcome = Some(outcome),
            Trigger::Ran(Err(e)) => view.error = Some(e.to_string()),
            Trigger::Busy => view.busy = true,
            Trigger::Unknown => view.error = Some(format!("feed '{id}' is not scheduled")),
        }
        view
    }
}

/// Load the config, install logging, and run the daemon on a fresh runtime.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    let loaded = config::load_at(home);
    let logging = loaded
        .as_ref()
        .map(|c| c.settings.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);
    let config = loaded.inspect_err(|e| tracing::error!(error = %e, "cannot load config"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon until `stop`, SIGINT/SIGTERM, or a fatal task error.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    let coordinator = Arc::new(SyncCoordinator::from_settings(&home, &config.settings)?);
    let scheduler = Arc::new(FeedScheduler::new(coordinator));
    scheduler.start(&config);
    tracing::info!(
        feeds = config.enabled_feeds().count(),
        home = %home.display(),
        "daemon started"
    );

    let state = Arc::new(DaemonState::new(home.clone(), config, scheduler.clone()));
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = watcher_task(state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                received = shutdown_signal() => {
                    let name = received?;
                    tracing::info!(signal = name, "shutting down daemon");
                    let _ = shutdown.send(());
                    Ok(())
                }
            }
        })
    };

    let (watcher_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, socket_handle, signal_handle);

    scheduler.stop().await;
    let socket = socket_path(&home);
    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }

    handle_join("watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

/// Resolves with the name of the first SIGINT or SIGTERM received.
async fn shutdown_signal() -> Result<&'static str, DaemonError> {
    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.map_err(|e| io_err("SIGINT handler", e))?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Config watcher
// ---------------------------------------------------------------------------

async fn watcher_task(
    state: Arc<DaemonState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = config::musicl_root(&state.home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    // FSEvents reports real paths (/private/var/... on macOS).
    let root = fs::canonicalize(&root).unwrap_or(root);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::NonRecursive)?;

    let mut debounce = Debounce::new(DEBOUNCE_WINDOW);

    loop {
        let deadline = debounce.deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = sleep_until_opt(deadline) => {
                debounce.clear();
                reload_config(&state).await;
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                if event.paths.iter().any(|p| is_config_file(p, &root)) {
                    debounce.touch(Instant::now());
                }
            }
        }
    }

    Ok(())
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Trailing-edge debounce: fires once the window passes with no new touch.
#[derive(Debug)]
struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn clear(&mut self) {
        self.deadline = None;
    }
}

/// Re-read `config.yaml` and reschedule. A bad file keeps the old config.
async fn reload_config(state: &DaemonState) {
    let next = match config::load_at(&state.home) {
        Ok(next) => next,
        Err(err) => {
            tracing::error!(error = %err, "config reload failed; keeping previous config");
            return;
        }
    };
    let mut current = state.config.write().await;
    if *current == next {
        tracing::debug!("config unchanged");
        return;
    }
    if current.settings != next.settings {
        tracing::warn!("settings changed; restart the daemon to apply them (feeds were rescheduled)");
    }
    state.scheduler.reschedule(&next);
    tracing::info!(feeds = next.enabled_feeds().count(), "config reloaded");
    *current = next;
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, state, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    Ok(())
}

async fn handle_client<S>(
    stream: S,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&state).await),
            "sync" => handle_sync(&state, request.playlist.as_deref()).await,
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn handle_sync(state: &DaemonState, playlist: Option<&str>) -> DaemonResponse {
    let views: Vec<TriggerView> = match playlist {
        Some(id) => {
            let id = PlaylistId::from(id);
            let trigger = state.scheduler.trigger(&id).await;
            if matches!(trigger, Trigger::Unknown) {
                return DaemonResponse::error(format!("feed '{id}' is not scheduled"));
            }
            vec![TriggerView::new(&id, trigger)]
        }
        None => state
            .scheduler
            .trigger_all()
            .await
            .into_iter()
            .map(|(id, trigger)| TriggerView::new(&id, trigger))
            .collect(),
    };
    match serde_json::to_value(&views) {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn build_status_payload(state: &DaemonState) -> Value {
    let payload = StatusPayload {
        running: true,
        pid: std::process::id(),
        started_at: state.started_at,
        config_path: config::config_path_at(&state.home).display().to_string(),
        feeds: state.scheduler.statuses(),
    };
    serde_json::to_value(payload).unwrap_or_else(|_| json!({ "running": true }))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response<W>(writer: &mut W, response: &DaemonResponse) -> Result<(), DaemonError>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(logging: &LoggingSettings) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use musicl_core::types::{FeedConfig, PlaylistFormat};
    use musicl_sync::{SyncError, SyncStatus};
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::time::advance;

    use crate::scheduler::FeedCheck;

    struct Instant200;

    #[async_trait]
    impl FeedCheck for Instant200 {
        async fn check(&self, feed: &FeedConfig) -> Result<SyncOutcome, SyncError> {
            Ok(SyncOutcome {
                playlist_id: feed.playlist_id.to_string(),
                status: SyncStatus::Written,
                written: true,
                format: PlaylistFormat::RemoteItemsOnly,
                added: 2,
                carried_over: 0,
                orphaned: 0,
                total: 2,
                newest_episode_key: Some("ep-2".into()),
                public_url: String::new(),
                version: None,
                announcement: None,
                local: None,
            })
        }
    }

    fn state(home: &Path) -> Arc<DaemonState> {
        let mut config = Config::default();
        config
            .feeds
            .push(FeedConfig::new("mmt", "https://example.com/mmt.xml"));
        let scheduler = Arc::new(FeedScheduler::new(Arc::new(Instant200)));
        scheduler.start(&config);
        Arc::new(DaemonState::new(home.to_path_buf(), config, scheduler))
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_fires_once_after_quiet_window() {
        let mut debounce = Debounce::new(Duration::from_millis(100));
        assert!(debounce.deadline().is_none());

        let start = Instant::now();
        for _ in 0..5 {
            debounce.touch(Instant::now());
            advance(Duration::from_millis(10)).await;
        }
        let deadline = debounce.deadline().expect("armed");
        assert_eq!(deadline, start + Duration::from_millis(40 + 100));

        sleep_until_opt(Some(deadline)).await;
        debounce.clear();
        assert!(debounce.deadline().is_none());
    }

    #[tokio::test]
    async fn status_payload_lists_scheduled_feeds() {
        let home = TempDir::new().expect("home");
        let state = state(home.path());

        let payload = build_status_payload(&state).await;
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["pid"], json!(std::process::id()));
        assert_eq!(payload["feeds"][0]["playlist_id"], json!("mmt"));
        assert_eq!(payload["feeds"][0]["interval_secs"], json!(30 * 60));
        state.scheduler.stop().await;
    }

    async fn ask<W, R>(write: &mut W, lines: &mut tokio::io::Lines<R>, line: &str) -> Value
    where
        W: AsyncWrite + Unpin,
        R: tokio::io::AsyncBufRead + Unpin,
    {
        write.write_all(format!("{line}\n").as_bytes()).await.expect("send");
        let reply = lines.next_line().await.expect("read").expect("reply line");
        serde_json::from_str(&reply).expect("reply json")
    }

    #[tokio::test]
    async fn socket_protocol_sync_status_and_stop() {
        let home = TempDir::new().expect("home");
        let state = state(home.path());
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let (client, server) = duplex(64 * 1024);
        let server_task = tokio::spawn(handle_client(server, state.clone(), shutdown_tx));

        let (read, mut write) = tokio::io::split(client);
        let mut lines = BufReader::new(read).lines();
        let reply = ask(&mut write, &mut lines, r#"{"cmd":"sync","playlist":"mmt"}"#).await;
        assert_eq!(reply["ok"], json!(true));
        assert_eq!(reply["data"][0]["outcome"]["added"], json!(2));

        let reply = ask(&mut write, &mut lines, r#"{"cmd":"sync","playlist":"nope"}"#).await;
        assert_eq!(reply["ok"], json!(false));

        let reply = ask(&mut write, &mut lines, "not json").await;
        assert!(reply["error"].as_str().unwrap().contains("invalid request JSON"));

        let reply = ask(&mut write, &mut lines, r#"{"cmd":"stop"}"#).await;
        assert_eq!(reply["data"]["stopping"], json!(true));

        shutdown_rx.recv().await.expect("shutdown signal");
        server_task.await.unwrap().unwrap();
        state.scheduler.stop().await;
    }

    #[tokio::test]
    async fn bad_config_keeps_previous_schedule() {
        let home = TempDir::new().expect("home");
        let state = state(home.path());
        let root = config::musicl_root(home.path());
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("config.yaml"), "feeds: [oops").unwrap();

        reload_config(&state).await;
        assert_eq!(state.config.read().await.feeds.len(), 1);
        assert_eq!(state.scheduler.statuses().len(), 1);

        let mut next = Config::default();
        next.feeds.push(FeedConfig::new("mmt", "https://example.com/mmt.xml"));
        next.feeds.push(FeedConfig::new("iam", "https://example.com/iam.xml"));
        config::save_at(home.path(), &next).unwrap();

        reload_config(&state).await;
        let ids: Vec<_> = state
            .scheduler
            .statuses()
            .into_iter()
            .map(|s| s.playlist_id)
            .collect();
        assert_eq!(ids, ["iam", "mmt"]);
        state.scheduler.stop().await;
    }
}
