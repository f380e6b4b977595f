//! Per-feed timers with an at-most-one-in-flight guard.
//!
//! Every enabled feed gets its own task and `tokio::time::interval`. The first
//! tick fires immediately, so a freshly started scheduler checks every feed
//! once before settling into its polling period.
//!
//! A feed is `Idle` or `Checking`. Entering `Checking` while already there is
//! refused, whether the request comes from the feed's own timer or from a
//! manual trigger. [`FeedScheduler::stop`] ends the timers at once but waits
//! for passes already running.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use musicl_core::config::Config;
use musicl_core::types::{FeedConfig, PlaylistId};
use musicl_sync::{SyncCoordinator, SyncError, SyncOptions, SyncOutcome};

/// One check of one feed.
#[async_trait]
pub trait FeedCheck: Send + Sync + 'static {
    async fn check(&self, feed: &FeedConfig) -> Result<SyncOutcome, SyncError>;
}

#[async_trait]
impl FeedCheck for SyncCoordinator {
    async fn check(&self, feed: &FeedConfig) -> Result<SyncOutcome, SyncError> {
        SyncCoordinator::check(self, feed, SyncOptions::default()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    Idle,
    Checking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    pub playlist_id: String,
    pub state: FeedState,
    pub interval_secs: u64,
    pub checks: u64,
    pub failures: u64,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Status of the last successful pass (`written`, `unchanged`, ...).
    pub last_status: Option<String>,
    pub last_error: Option<String>,
}

/// Result of asking for an immediate check.
#[derive(Debug)]
pub enum Trigger {
    Ran(Result<SyncOutcome, SyncError>),
    /// The feed was already `Checking`.
    Busy,
    Unknown,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    checking: Mutex<HashSet<PlaylistId>>,
    statuses: Mutex<HashMap<PlaylistId, FeedStatus>>,
    idle: Notify,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Held for the duration of one pass; dropping it returns the feed to `Idle`.
struct CheckingGuard {
    shared: Arc<Shared>,
    id: PlaylistId,
}

impl CheckingGuard {
    fn try_begin(shared: &Arc<Shared>, id: &PlaylistId) -> Option<Self> {
        if !lock(&shared.checking).insert(id.clone()) {
            return None;
        }
        if let Some(status) = lock(&shared.statuses).get_mut(id) {
            status.state = FeedState::Checking;
        }
        Some(Self {
            shared: shared.clone(),
            id: id.clone(),
        })
    }
}

impl Drop for CheckingGuard {
    fn drop(&mut self) {
        if let Some(status) = lock(&self.shared.statuses).get_mut(&self.id) {
            status.state = FeedState::Idle;
        }
        lock(&self.shared.checking).remove(&self.id);
        self.shared.idle.notify_waiters();
    }
}

async fn run_check(checker: &dyn FeedCheck, shared: &Arc<Shared>, feed: &FeedConfig) -> Trigger {
    let id = &feed.playlist_id;
    let Some(_guard) = CheckingGuard::try_begin(shared, id) else {
        tracing::debug!(playlist = %id, "check already in flight; skipped");
        return Trigger::Busy;
    };

    let result = checker.check(feed).await;

    if let Some(status) = lock(&shared.statuses).get_mut(id) {
        status.checks += 1;
        status.last_checked_at = Some(Utc::now());
        match &result {
            Ok(outcome) => {
                status.last_status = Some(outcome.status.to_string());
                status.last_error = None;
            }
            Err(e) => {
                status.failures += 1;
                status.last_error = Some(e.to_string());
            }
        }
    }
    match &result {
        Ok(outcome) => tracing::info!(
            playlist = %id,
            status = %outcome.status,
            added = outcome.added,
            total = outcome.total,
            "feed checked"
        ),
        Err(e @ SyncError::NoContent { .. }) => {
            tracing::error!(playlist = %id, error = %e, "feed check produced no content")
        }
        Err(e) => tracing::warn!(playlist = %id, error = %e, "feed check failed"),
    }
    Trigger::Ran(result)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Timer {
    feed: FeedConfig,
    interval: Duration,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct FeedScheduler {
    checker: Arc<dyn FeedCheck>,
    shared: Arc<Shared>,
    timers: Mutex<HashMap<PlaylistId, Timer>>,
    /// Timers replaced by a reschedule that may still be finishing a pass.
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedScheduler {
    pub fn new(checker: Arc<dyn FeedCheck>) -> Self {
        Self {
            checker,
            shared: Arc::new(Shared::default()),
            timers: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Start a timer for every enabled feed.
    pub fn start(&self, config: &Config) {
        self.reschedule(config);
    }

    /// Bring the timers in line with `config`.
    ///
    /// Feeds that disappeared or were disabled lose their timer; new feeds
    /// get one; feeds whose settings or interval changed are restarted.
    /// Unchanged feeds keep their timer and phase.
    pub fn reschedule(&self, config: &Config) {
        let desired: HashMap<PlaylistId, (FeedConfig, Duration)> = config
            .enabled_feeds()
            .map(|f| (f.playlist_id.clone(), (f.clone(), config.interval_for(f))))
            .collect();

        let mut timers = lock(&self.timers);
        let stale: Vec<PlaylistId> = timers
            .iter()
            .filter(|(id, t)| {
                desired
                    .get(*id)
                    .map_or(true, |(feed, every)| *feed != t.feed || *every != t.interval)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(timer) = timers.remove(&id) {
                tracing::info!(playlist = %id, "unscheduling feed");
                let _ = timer.stop.send(true);
                let mut retired = lock(&self.retired);
                retired.retain(|handle| !handle.is_finished());
                retired.push(timer.handle);
            }
        }

        let mut statuses = lock(&self.shared.statuses);
        statuses.retain(|id, _| desired.contains_key(id));
        for (id, (feed, every)) in desired {
            if timers.contains_key(&id) {
                continue;
            }
            let status = statuses.entry(id.clone()).or_insert_with(|| FeedStatus {
                playlist_id: id.to_string(),
                state: FeedState::Idle,
                interval_secs: every.as_secs(),
                checks: 0,
                failures: 0,
                last_checked_at: None,
                last_status: None,
                last_error: None,
            });
            status.interval_secs = every.as_secs();

            tracing::info!(playlist = %id, interval_secs = every.as_secs(), "scheduling feed");
            let (stop, stop_rx) = watch::channel(false);
            let handle = tokio::spawn(timer_loop(
                self.checker.clone(),
                self.shared.clone(),
                feed.clone(),
                every,
                stop_rx,
            ));
            timers.insert(
                id,
                Timer {
                    feed,
                    interval: every,
                    stop,
                    handle,
                },
            );
        }
    }

    /// Check one scheduled feed now, unless it is already `Checking`.
    pub async fn trigger(&self, id: &PlaylistId) -> Trigger {
        let feed = lock(&self.timers).get(id).map(|t| t.feed.clone());
        match feed {
            Some(feed) => run_check(&*self.checker, &self.shared, &feed).await,
            None => Trigger::Unknown,
        }
    }

    /// Check every scheduled feed now, concurrently.
    pub async fn trigger_all(&self) -> Vec<(PlaylistId, Trigger)> {
        let feeds: Vec<FeedConfig> = lock(&self.timers).values().map(|t| t.feed.clone()).collect();
        let mut tasks = JoinSet::new();
        for feed in feeds {
            let checker = self.checker.clone();
            let shared = self.shared.clone();
            tasks.spawn(async move {
                let outcome = run_check(&*checker, &shared, &feed).await;
                (feed.playlist_id, outcome)
            });
        }
        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => tracing::error!(error = %e, "triggered check panicked"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Snapshot of every scheduled feed, sorted by id.
    pub fn statuses(&self) -> Vec<FeedStatus> {
        let mut out: Vec<FeedStatus> = lock(&self.shared.statuses).values().cloned().collect();
        out.sort_by(|a, b| a.playlist_id.cmp(&b.playlist_id));
        out
    }

    pub fn is_checking(&self, id: &PlaylistId) -> bool {
        lock(&self.shared.checking).contains(id)
    }

    /// Cancel every timer, then wait for passes already in flight.
    pub async fn stop(&self) {
        let timers: Vec<Timer> = lock(&self.timers).drain().map(|(_, t)| t).collect();
        let mut handles: Vec<JoinHandle<()>> = lock(&self.retired).drain(..).collect();
        for timer in timers {
            let _ = timer.stop.send(true);
            handles.push(timer.handle);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "feed timer task failed");
            }
        }

        loop {
            let idle = self.shared.idle.notified();
            if lock(&self.shared.checking).is_empty() {
                break;
            }
            idle.await;
        }
        tracing::info!("scheduler stopped");
    }
}

async fn timer_loop(
    checker: Arc<dyn FeedCheck>,
    shared: Arc<Shared>,
    feed: FeedConfig,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                run_check(&*checker, &shared, &feed).await;
            }
        }
    }
    tracing::debug!(playlist = %feed.playlist_id, "feed timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use musicl_core::types::PlaylistFormat;
    use musicl_sync::SyncStatus;
    use tokio::time::{advance, sleep};

    /// Counts checks; each one takes `work` of (virtual) time.
    struct SlowCheck {
        work: Duration,
        calls: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl SlowCheck {
        fn new(work: Duration) -> Arc<Self> {
            Arc::new(Self {
                work,
                calls: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }

        fn calls_for(&self, id: &str) -> usize {
            lock(&self.calls).iter().filter(|c| *c == id).count()
        }
    }

    fn outcome(id: &str) -> SyncOutcome {
        SyncOutcome {
            playlist_id: id.to_string(),
            status: SyncStatus::Unchanged,
            written: false,
            format: PlaylistFormat::RemoteItemsOnly,
            added: 0,
            carried_over: 0,
            orphaned: 0,
            total: 0,
            newest_episode_key: None,
            public_url: String::new(),
            version: None,
            announcement: None,
            local: None,
        }
    }

    #[async_trait]
    impl FeedCheck for SlowCheck {
        async fn check(&self, feed: &FeedConfig) -> Result<SyncOutcome, SyncError> {
            lock(&self.calls).push(feed.playlist_id.to_string());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            sleep(self.work).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if feed.playlist_id.as_str() == "broken" {
                return Err(SyncError::EmptyFeed {
                    url: feed.source_url.clone(),
                });
            }
            Ok(outcome(feed.playlist_id.as_str()))
        }
    }

    fn config(feeds: &[(&str, u64)]) -> Config {
        let mut config = Config::default();
        for (id, minutes) in feeds {
            let mut feed = FeedConfig::new(*id, format!("https://example.com/{id}.xml"));
            feed.poll_interval_minutes = Some(*minutes);
            config.feeds.push(feed);
        }
        config
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn checks_immediately_then_on_each_interval() {
        let check = SlowCheck::new(Duration::from_secs(1));
        let scheduler = FeedScheduler::new(check.clone());
        scheduler.start(&config(&[("mmt", 1), ("iam", 2)]));
        settle().await;
        advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(check.calls_for("mmt"), 1);
        assert_eq!(check.calls_for("iam"), 1);

        advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(check.calls_for("mmt"), 2);
        assert_eq!(check.calls_for("iam"), 1);

        advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(check.calls_for("mmt"), 3);
        assert_eq!(check.calls_for("iam"), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_is_refused_while_checking() {
        let check = SlowCheck::new(Duration::from_secs(30));
        let scheduler = FeedScheduler::new(check.clone());
        scheduler.start(&config(&[("mmt", 10)]));
        settle().await;

        let id = PlaylistId::from("mmt");
        assert!(scheduler.is_checking(&id));
        assert!(matches!(scheduler.trigger(&id).await, Trigger::Busy));
        assert_eq!(scheduler.statuses()[0].state, FeedState::Checking);

        advance(Duration::from_secs(31)).await;
        settle().await;
        assert!(!scheduler.is_checking(&id));
        assert!(matches!(scheduler.trigger(&id).await, Trigger::Ran(Ok(_))));
        assert_eq!(check.max_running.load(Ordering::SeqCst), 1);
        assert!(matches!(
            scheduler.trigger(&PlaylistId::from("nope")).await,
            Trigger::Unknown
        ));

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_pass() {
        let check = SlowCheck::new(Duration::from_secs(45));
        let scheduler = FeedScheduler::new(check.clone());
        scheduler.start(&config(&[("mmt", 1)]));
        settle().await;
        assert_eq!(check.running.load(Ordering::SeqCst), 1);

        scheduler.stop().await;

        assert_eq!(check.running.load(Ordering::SeqCst), 0, "pass must complete");
        assert_eq!(scheduler.statuses()[0].checks, 1);
        advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(check.calls_for("mmt"), 1, "no timer fires after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_not_fatal() {
        let check = SlowCheck::new(Duration::from_millis(10));
        let scheduler = FeedScheduler::new(check.clone());
        scheduler.start(&config(&[("broken", 1), ("mmt", 1)]));
        settle().await;
        advance(Duration::from_secs(1)).await;
        settle().await;

        let statuses = scheduler.statuses();
        let broken = statuses.iter().find(|s| s.playlist_id == "broken").unwrap();
        assert_eq!(broken.failures, 1);
        assert!(broken.last_error.as_deref().unwrap_or_default().contains("no episodes"));
        let ok = statuses.iter().find(|s| s.playlist_id == "mmt").unwrap();
        assert_eq!(ok.last_status.as_deref(), Some("unchanged"));

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_adds_removes_and_keeps() {
        let check = SlowCheck::new(Duration::from_millis(10));
        let scheduler = FeedScheduler::new(check.clone());
        scheduler.start(&config(&[("mmt", 5), ("iam", 5)]));
        settle().await;
        advance(Duration::from_secs(1)).await;
        settle().await;

        let mut next = config(&[("mmt", 5), ("new", 5)]);
        next.feeds.push({
            let mut off = FeedConfig::new("off", "https://example.com/off.xml");
            off.enabled = false;
            off
        });
        scheduler.reschedule(&next);
        settle().await;
        advance(Duration::from_secs(1)).await;
        settle().await;

        let ids: Vec<_> = scheduler.statuses().into_iter().map(|s| s.playlist_id).collect();
        assert_eq!(ids, ["mmt", "new"]);
        assert_eq!(check.calls_for("mmt"), 1, "unchanged feed keeps its phase");
        assert_eq!(check.calls_for("new"), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_reloads_do_not_accumulate_stopped_timers() {
        let check = SlowCheck::new(Duration::from_millis(10));
        let scheduler = FeedScheduler::new(check.clone());
        scheduler.start(&config(&[("mmt", 5)]));
        settle().await;
        advance(Duration::from_secs(1)).await;
        settle().await;

        for minutes in 6..16 {
            scheduler.reschedule(&config(&[("mmt", minutes)]));
            settle().await;
            advance(Duration::from_secs(1)).await;
            settle().await;
        }

        let retired = lock(&scheduler.retired).len();
        assert!(retired <= 1, "{retired} stopped timer handles kept");
        assert_eq!(scheduler.statuses()[0].interval_secs, 15 * 60);
        scheduler.stop().await;
    }
}
