//! [`FeedReader`] over HTTP(S) and the local filesystem, parsed with `rss`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rss::extension::{Extension, ExtensionMap};
use rss::Channel;

use musicl_core::types::{Enclosure, Episode, Pointer, UpstreamChannel};

use crate::error::SyncError;
use crate::ports::{FeedReader, FetchedFeed};

pub struct HttpFeedReader {
    client: Client,
}

impl HttpFeedReader {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| SyncError::Fetch {
                url: String::new(),
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<String, SyncError> {
        let fetch_err = |message: String| SyncError::Fetch {
            url: url.to_string(),
            message,
        };
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status.as_u16())));
        }
        resp.text().await.map_err(|e| fetch_err(e.to_string()))
    }
}

#[async_trait]
impl FeedReader for HttpFeedReader {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, SyncError> {
        let raw = if url.starts_with("http://") || url.starts_with("https://") {
            self.download(url).await?
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SyncError::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                })?
        };
        tracing::debug!(url, bytes = raw.len(), "fetched upstream feed");
        parse_feed(url, raw)
    }
}

/// Parse raw feed markup into a [`FetchedFeed`]; `raw` is kept untouched.
pub fn parse_feed(url: &str, raw: String) -> Result<FetchedFeed, SyncError> {
    let channel = Channel::read_from(raw.as_bytes()).map_err(|e| SyncError::Fetch {
        url: url.to_string(),
        message: format!("unparsable feed: {e}"),
    })?;

    let episodes: Vec<Episode> = channel.items().iter().filter_map(to_episode).collect();
    if episodes.is_empty() {
        return Err(SyncError::EmptyFeed {
            url: url.to_string(),
        });
    }

    let upstream = UpstreamChannel {
        title: channel.title().to_string(),
        link: channel.link().to_string(),
        description: channel.description().to_string(),
        image_url: channel
            .image()
            .map(|i| i.url().to_string())
            .or_else(|| {
                channel
                    .itunes_ext()
                    .and_then(|it| it.image())
                    .map(str::to_string)
            }),
        feed_guid: podcast_ext(channel.extensions(), "guid")
            .and_then(|exts| exts.first())
            .and_then(|e| e.value())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    };

    Ok(FetchedFeed {
        episodes,
        channel: upstream,
        raw_markup: raw,
    })
}

fn to_episode(item: &rss::Item) -> Option<Episode> {
    let link = item.link().map(str::to_string);
    let key = item
        .guid()
        .map(|g| g.value().trim().to_string())
        .filter(|g| !g.is_empty())
        .or_else(|| link.clone())?;

    let mut pointers = Vec::new();
    collect_pointers(item.extensions(), &mut pointers);

    Some(Episode {
        key,
        title: item.title().unwrap_or_default().to_string(),
        link,
        published_at: item.pub_date().and_then(parse_date),
        description: item.description().unwrap_or_default().to_string(),
        enclosure: item.enclosure().map(|e| Enclosure {
            url: e.url().to_string(),
            mime_type: Some(e.mime_type().to_string()).filter(|m| !m.is_empty()),
            length: e.length().trim().parse().ok(),
        }),
        pointers,
    })
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(value.trim()))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn podcast_ext<'a>(map: &'a ExtensionMap, name: &str) -> Option<&'a Vec<Extension>> {
    map.get("podcast")?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Every complete `podcast:remoteItem` under the item's podcast extensions,
/// nested ones (value blocks, splits) included.
///
/// The rss crate stores extensions in maps keyed by tag name, so the result
/// is grouped by tag name, not in document order. Only the episode fallback
/// reads these; ordered extraction scans the raw markup instead.
fn collect_pointers(map: &ExtensionMap, out: &mut Vec<Pointer>) {
    let Some(podcast) = map.get("podcast") else {
        return;
    };
    for exts in podcast.values() {
        for ext in exts {
            walk(ext, out);
        }
    }
}

fn walk(ext: &Extension, out: &mut Vec<Pointer>) {
    let local = ext.name().rsplit(':').next().unwrap_or(ext.name());
    if local.eq_ignore_ascii_case("remoteItem") {
        let attr = |key: &str| {
            ext.attrs()
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty())
        };
        if let (Some(feed), Some(item)) = (attr("feedGuid"), attr("itemGuid")) {
            out.push(Pointer::new(feed, item));
        }
    }
    for children in ext.children().values() {
        for child in children {
            walk(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:podcast="https://podcastindex.org/namespace/1.0">
<channel>
  <title>Music Monday</title>
  <link>https://example.com/show</link>
  <description>Weekly tunes</description>
  <podcast:guid>5f3c-feed</podcast:guid>
  <item>
    <title>Episode 2</title>
    <guid isPermaLink="false">ep-2</guid>
    <pubDate>Mon, 13 Jan 2025 10:00:00 GMT</pubDate>
    <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg" length="99"/>
  </item>
  <item>
    <title>Episode 1</title>
    <link>https://example.com/ep1</link>
  </item>
  <item>
    <title>No identity</title>
  </item>
</channel>
</rss>"#;

    #[test]
    fn parses_episodes_and_keeps_raw_markup() {
        let feed = parse_feed("u", FEED.to_string()).unwrap();
        assert_eq!(feed.raw_markup, FEED);
        let keys: Vec<_> = feed.episodes.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["ep-2", "https://example.com/ep1"]);

        let ep2 = &feed.episodes[0];
        assert_eq!(
            ep2.published_at.map(|d| d.to_rfc3339()).as_deref(),
            Some("2025-01-13T10:00:00+00:00")
        );
        let enclosure = ep2.enclosure.as_ref().unwrap();
        assert_eq!(enclosure.length, Some(99));
        assert_eq!(feed.channel.title, "Music Monday");
    }

    #[test]
    fn channel_without_items_is_empty_feed() {
        let raw = "<rss version=\"2.0\"><channel><title>t</title><link>l</link><description>d</description></channel></rss>";
        let err = parse_feed("u", raw.to_string()).unwrap_err();
        assert!(matches!(err, SyncError::EmptyFeed { .. }));
    }

    #[test]
    fn garbage_is_a_fetch_error() {
        let err = parse_feed("u", "not a feed".to_string()).unwrap_err();
        assert!(matches!(err, SyncError::Fetch { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn reads_local_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, FEED).unwrap();
        let reader = HttpFeedReader::new(Duration::from_secs(5), "musicl-test").unwrap();

        let plain = reader.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(plain.episodes.len(), 2);
        let url = format!("file://{}", path.display());
        assert!(reader.fetch(&url).await.is_ok());

        let missing = reader.fetch("/definitely/not/here.xml").await.unwrap_err();
        assert!(matches!(missing, SyncError::Fetch { .. }));
    }

    #[test]
    fn embedded_pointers_include_nested_splits_and_skip_incomplete_tags() {
        let raw = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:podcast="https://podcastindex.org/namespace/1.0">
<channel>
  <title>t</title><link>l</link><description>d</description>
  <item>
    <title>Split episode</title>
    <guid>ep-1</guid>
    <podcast:value type="lightning" method="keysend">
      <podcast:valueTimeSplit startTime="60" duration="200">
        <podcast:remoteItem feedGuid="feed-a" itemGuid="track-z"/>
      </podcast:valueTimeSplit>
    </podcast:value>
    <podcast:remoteItem feedGuid="feed-b" itemGuid="track-a"/>
    <podcast:remoteItem itemGuid="no-feed"/>
  </item>
</channel>
</rss>"#;
        let feed = parse_feed("u", raw.to_string()).unwrap();
        let mut found: Vec<_> = feed.episodes[0]
            .pointers
            .iter()
            .map(|p| (p.feed_guid.as_str(), p.item_guid.as_str()))
            .collect();
        found.sort();
        assert_eq!(found, [("feed-a", "track-z"), ("feed-b", "track-a")]);
    }
}
