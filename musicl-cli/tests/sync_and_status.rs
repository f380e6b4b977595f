use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use musicl_core::config;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

const UPSTREAM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:podcast="https://podcastindex.org/namespace/1.0">
<channel>
  <title>Music Monday</title>
  <link>https://example.com/mmt</link>
  <description>Weekly picks</description>
  <podcast:guid>upstream-guid</podcast:guid>
  <item>
    <title>Episode 2</title>
    <guid>ep-2</guid>
    <pubDate>Mon, 08 Jan 2024 10:00:00 +0000</pubDate>
  </item>
  <item>
    <title>Episode 1</title>
    <guid>ep-1</guid>
    <pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate>
  </item>
</channel>
</rss>
"#;

const EPISODE_3: &str = r#"  <item>
    <title>Episode 3</title>
    <guid>ep-3</guid>
    <pubDate>Mon, 15 Jan 2024 10:00:00 +0000</pubDate>
  </item>
"#;

fn musicl_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("musicl"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RUST_LOG");
    cmd
}

/// Home with a config and one feed `mmt` reading a local upstream file.
fn setup(home: &TempDir) -> PathBuf {
    let upstream = home.path().join("upstream.xml");
    fs::write(&upstream, UPSTREAM).expect("write upstream");
    musicl_cmd(home.path()).arg("init").assert().success();
    let mut config = config::load_at(home.path()).expect("load config");
    config.settings.retry.base_delay_ms = 10;
    config.settings.retry.max_delay_ms = 10;
    config::save_at(home.path(), &config).expect("save config");
    musicl_cmd(home.path())
        .args(["feed", "add", "mmt"])
        .arg(&upstream)
        .args(["--title", "Music Monday Picks"])
        .assert()
        .success()
        .stdout(contains("docs/mmt.xml"));
    upstream
}

fn store_file(home: &TempDir, rel: &str) -> PathBuf {
    home.path().join(".musicl/store").join(rel)
}

fn add_episode_3(upstream: &Path) {
    let content = fs::read_to_string(upstream).expect("read upstream");
    let updated = content.replacen("  <item>\n", &format!("{EPISODE_3}  <item>\n"), 1);
    fs::write(upstream, updated).expect("write upstream");
}

#[test]
fn sync_writes_playlist_then_short_circuits() {
    let home = TempDir::new().expect("home");
    setup(&home);

    musicl_cmd(home.path())
        .args(["sync", "mmt"])
        .assert()
        .success()
        .stdout(contains("'mmt' written"))
        .stdout(contains("2 new"));

    let playlist = fs::read_to_string(store_file(&home, "docs/mmt.xml")).expect("playlist");
    assert!(playlist.contains(r#"feedGuid="upstream-guid" itemGuid="ep-1""#));
    assert!(playlist.contains(r#"feedGuid="upstream-guid" itemGuid="ep-2""#));
    assert!(playlist.contains("Music Monday Picks"));
    assert!(home.path().join(".musicl/playlists/mmt.xml").exists(), "local cache copy");

    let cursor = fs::read_to_string(store_file(&home, "state/mmt.json")).expect("cursor");
    assert!(cursor.contains("ep-2"), "cursor tracks the newest episode: {cursor}");

    musicl_cmd(home.path())
        .args(["sync", "mmt"])
        .assert()
        .success()
        .stdout(contains("up-to-date"));

    musicl_cmd(home.path())
        .args(["sync", "mmt", "--force"])
        .assert()
        .success()
        .stdout(contains("'mmt' unchanged"));
    assert_eq!(
        fs::read_to_string(store_file(&home, "docs/mmt.xml")).expect("playlist"),
        playlist,
        "forced pass over unchanged upstream must not rewrite"
    );
}

#[test]
fn new_upstream_episode_is_appended() {
    let home = TempDir::new().expect("home");
    let upstream = setup(&home);
    musicl_cmd(home.path()).args(["sync", "mmt"]).assert().success();

    add_episode_3(&upstream);
    musicl_cmd(home.path())
        .args(["sync", "mmt"])
        .assert()
        .success()
        .stdout(contains("1 new, 2 kept"));

    let playlist = fs::read_to_string(store_file(&home, "docs/mmt.xml")).expect("playlist");
    assert!(playlist.contains(r#"itemGuid="ep-3""#));
    let cursor = fs::read_to_string(store_file(&home, "state/mmt.json")).expect("cursor");
    assert!(cursor.contains("ep-3"));
}

#[test]
fn dry_run_writes_nothing() {
    let home = TempDir::new().expect("home");
    setup(&home);

    musicl_cmd(home.path())
        .args(["sync", "mmt", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("dry-run (2 new"));

    assert!(!store_file(&home, "docs/mmt.xml").exists());
    assert!(!store_file(&home, "state/mmt.json").exists());
    assert!(!home.path().join(".musicl/playlists/mmt.xml").exists());
}

#[test]
fn failed_feed_makes_run_exit_non_zero() {
    let home = TempDir::new().expect("home");
    setup(&home);
    musicl_cmd(home.path())
        .args(["feed", "add", "gone"])
        .arg(home.path().join("missing.xml"))
        .assert()
        .success();

    let output = musicl_cmd(home.path())
        .args(["sync", "--all", "--json"])
        .output()
        .expect("run sync --all");
    assert!(!output.status.success(), "one feed failed, exit must be non-zero");
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 2 feed(s) failed"));

    let reports: Value = serde_json::from_slice(&output.stdout).expect("json reports");
    assert_eq!(reports[0]["playlist_id"], "mmt");
    assert_eq!(reports[0]["outcome"]["status"], "written");
    assert_eq!(reports[1]["playlist_id"], "gone");
    assert!(reports[1]["error"]
        .as_str()
        .expect("error string")
        .contains("failed to fetch"));

    assert!(store_file(&home, "docs/mmt.xml").exists(), "healthy feed still synced");
}

#[test]
fn sync_requires_a_target() {
    let home = TempDir::new().expect("home");
    setup(&home);
    musicl_cmd(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("provide a playlist id or use --all"));
    musicl_cmd(home.path())
        .args(["sync", "nope"])
        .assert()
        .failure()
        .stderr(contains("no configured feed named 'nope'"));
}

#[test]
fn diff_shows_pending_changes_only() {
    let home = TempDir::new().expect("home");
    let upstream = setup(&home);

    let assert = musicl_cmd(home.path())
        .args(["diff", "mmt"])
        .assert()
        .success()
        .stdout(contains("+++ b/docs/mmt.xml"));
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(stdout
        .lines()
        .any(|l| l.starts_with('+') && l.contains(r#"itemGuid="ep-1""#)));
    assert!(!store_file(&home, "docs/mmt.xml").exists(), "diff must not write");

    musicl_cmd(home.path()).args(["sync", "mmt"]).assert().success();
    musicl_cmd(home.path())
        .args(["diff", "mmt"])
        .assert()
        .success()
        .stdout(contains("No differences for 'mmt'."));

    add_episode_3(&upstream);
    let assert = musicl_cmd(home.path())
        .args(["diff", "mmt"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(stdout
        .lines()
        .any(|l| l.starts_with('+') && l.contains(r#"itemGuid="ep-3""#)));
    assert!(
        !stdout.lines().any(|l| l.starts_with('-') && l.contains("itemGuid")),
        "existing entries are carried over untouched"
    );
}

#[test]
fn status_json_reports_cursor_and_playlist() {
    let home = TempDir::new().expect("home");
    setup(&home);

    let output = musicl_cmd(home.path())
        .args(["status", "--json"])
        .output()
        .expect("status");
    assert!(output.status.success());
    let before: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(before["summary"]["feeds"], 1);
    assert_eq!(before["summary"]["missing"], 1);
    assert_eq!(before["feeds"][0]["exists"], false);

    musicl_cmd(home.path()).args(["sync", "mmt"]).assert().success();

    let output = musicl_cmd(home.path())
        .args(["status", "--json"])
        .output()
        .expect("status");
    let after: Value = serde_json::from_slice(&output.stdout).expect("json");
    let feed = &after["feeds"][0];
    assert_eq!(after["summary"]["missing"], 0);
    assert_eq!(feed["exists"], true);
    assert_eq!(feed["format"], "remote-items-only");
    assert_eq!(feed["entries"], 2);
    assert_eq!(feed["last_seen_episode_key"], "ep-2");
    assert_eq!(feed["interval_minutes"], 30);
}

#[test]
fn feed_management_and_import_from_store() {
    let home = TempDir::new().expect("home");
    let upstream = setup(&home);
    musicl_cmd(home.path()).args(["sync", "mmt"]).assert().success();

    musicl_cmd(home.path())
        .args(["feed", "add", "mmt", "https://example.com/other.xml"])
        .assert()
        .failure()
        .stderr(contains("already configured"));

    let output = musicl_cmd(home.path())
        .args(["discover", "--json"])
        .output()
        .expect("discover");
    let found: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(found[0]["playlist_id"], "mmt");
    assert_eq!(found[0]["configured"], true);
    assert_eq!(found[0]["summary"]["source_feed"], upstream.display().to_string());

    musicl_cmd(home.path())
        .args(["feed", "remove", "mmt"])
        .assert()
        .success();
    musicl_cmd(home.path())
        .args(["feed", "list"])
        .assert()
        .success()
        .stdout(contains("No feeds configured."));

    musicl_cmd(home.path())
        .args(["feed", "import", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run] + mmt"));
    musicl_cmd(home.path())
        .args(["feed", "import"])
        .assert()
        .success()
        .stdout(contains("Imported 1 feed(s)"));
    musicl_cmd(home.path())
        .args(["feed", "list"])
        .assert()
        .success()
        .stdout(contains("mmt"))
        .stdout(contains("Music Monday Picks"));
}

#[test]
fn feed_update_changes_policy_in_place() {
    let home = TempDir::new().expect("home");
    let upstream = setup(&home);

    musicl_cmd(home.path())
        .args(["feed", "update", "mmt", "--disable", "--interval", "45"])
        .args(["--title", "Renamed Picks"])
        .assert()
        .success()
        .stdout(contains("Updated feed 'mmt': disabled, every 45m, title"));

    let saved = config::load_at(home.path()).expect("load config");
    let feed = &saved.feeds[0];
    assert!(!feed.enabled);
    assert_eq!(feed.poll_interval_minutes, Some(45));
    assert_eq!(feed.title, "Renamed Picks");
    assert_eq!(feed.source_url, upstream.display().to_string());

    musicl_cmd(home.path())
        .args(["sync", "--all"])
        .assert()
        .success()
        .stdout(contains("No enabled feeds."));
    assert!(!store_file(&home, "docs/mmt.xml").exists());

    let moved = home.path().join("moved.xml");
    fs::rename(&upstream, &moved).expect("move upstream");
    musicl_cmd(home.path())
        .args(["feed", "update", "mmt", "--enable", "--url"])
        .arg(&moved)
        .assert()
        .success();
    musicl_cmd(home.path())
        .args(["sync", "--all"])
        .assert()
        .success()
        .stdout(contains("'mmt' written"));
}

#[test]
fn feed_update_rejects_bad_input_without_saving() {
    let home = TempDir::new().expect("home");
    setup(&home);
    let before = fs::read_to_string(home.path().join(".musicl/config.yaml")).expect("config");

    musicl_cmd(home.path())
        .args(["feed", "update", "mmt", "--interval", "0"])
        .assert()
        .failure()
        .stderr(contains("poll_interval_minutes must be at least 1"));
    musicl_cmd(home.path())
        .args(["feed", "update", "nope", "--disable"])
        .assert()
        .failure()
        .stderr(contains("no configured feed named 'nope'"));
    musicl_cmd(home.path())
        .args(["feed", "update", "mmt"])
        .assert()
        .failure()
        .stderr(contains("nothing to update"));
    musicl_cmd(home.path())
        .args(["feed", "update", "mmt", "--enable", "--disable"])
        .assert()
        .failure();

    let after = fs::read_to_string(home.path().join(".musicl/config.yaml")).expect("config");
    assert_eq!(before, after);
}
