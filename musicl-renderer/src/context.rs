//! Template context: the serializable rendering payload.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use musicl_core::types::{ChannelMeta, Episode, RemoteItem};
use musicl_reconcile::ReconciliationResult;

use crate::error::RenderError;

/// Namespace for channel guids derived from a feed URL.
const PODCAST_GUID_NAMESPACE: Uuid = Uuid::from_u128(0xead4c236_bf58_58c6_a2c6_a6b28d128cb6);

/// Date layout used for `pubDate` and `lastBuildDate`.
pub const RSS_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub fn format_rss_date(date: DateTime<Utc>) -> String {
    date.format(RSS_DATE_FORMAT).to_string()
}

/// Channel `podcast:guid`: configured, else the one already published, else
/// derived from `url`.
pub fn channel_guid(configured: Option<&str>, existing: Option<&str>, url: &str) -> String {
    let pick = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
    pick(configured)
        .or_else(|| pick(existing))
        .unwrap_or_else(|| derive_guid(url))
}

/// UUIDv5 of the URL with its scheme and trailing slashes removed.
pub fn derive_guid(url: &str) -> String {
    let trimmed = url.trim();
    let bare = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    Uuid::new_v5(&PODCAST_GUID_NAMESPACE, bare.as_bytes()).to_string()
}

/// Publish date of the newest episode.
pub fn newest_publish_date(episodes: &[Episode]) -> Option<DateTime<Utc>> {
    episodes.iter().filter_map(|e| e.published_at).max()
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub channel: ChannelCtx,
    /// Pointer entries, in output order.
    pub items: Vec<ItemCtx>,
    pub episodes: Vec<EpisodeCtx>,
    pub generator: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelCtx {
    pub title: String,
    pub description: String,
    pub author: String,
    pub link: String,
    pub source_url: String,
    pub image_url: String,
    pub guid: String,
    pub language: String,
    pub pub_date: String,
    pub last_build_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemCtx {
    pub feed_guid: String,
    pub item_guid: String,
    /// Emitted verbatim.
    pub raw_form: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeCtx {
    pub key: String,
    pub title: String,
    pub link: Option<String>,
    pub pub_date: Option<String>,
    pub description: String,
    pub enclosure: Option<EnclosureCtx>,
    pub pointers: Vec<ItemCtx>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnclosureCtx {
    pub url: String,
    pub mime_type: String,
    pub length: u64,
}

impl From<&RemoteItem> for ItemCtx {
    fn from(item: &RemoteItem) -> Self {
        ItemCtx {
            feed_guid: item.feed_guid.clone(),
            item_guid: item.item_guid.clone(),
            raw_form: item.raw_form.clone(),
        }
    }
}

impl From<&Episode> for EpisodeCtx {
    fn from(episode: &Episode) -> Self {
        EpisodeCtx {
            key: episode.key.clone(),
            title: episode.title.clone(),
            link: episode.link.clone(),
            pub_date: episode.published_at.map(format_rss_date),
            description: episode.description.clone(),
            enclosure: episode.enclosure.as_ref().map(|e| EnclosureCtx {
                url: e.url.clone(),
                mime_type: e
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "audio/mpeg".to_string()),
                length: e.length.unwrap_or(0),
            }),
            pointers: episode
                .pointers
                .iter()
                .map(|p| ItemCtx::from(&RemoteItem::synthesize(p)))
                .collect(),
        }
    }
}

impl From<&ChannelMeta> for ChannelCtx {
    fn from(meta: &ChannelMeta) -> Self {
        ChannelCtx {
            title: meta.title.clone(),
            description: meta.description.clone(),
            author: meta.author.clone(),
            link: meta.link.clone(),
            source_url: meta.source_url.clone(),
            image_url: meta.image_url.clone(),
            guid: meta.guid.clone(),
            language: meta.language.clone(),
            pub_date: format_rss_date(meta.pub_date),
            last_build_date: format_rss_date(meta.last_build_date),
        }
    }
}

impl TemplateContext {
    pub fn new(meta: &ChannelMeta, result: &ReconciliationResult, episodes: &[Episode]) -> Self {
        TemplateContext {
            channel: ChannelCtx::from(meta),
            items: result.items.iter().map(ItemCtx::from).collect(),
            episodes: episodes.iter().map(EpisodeCtx::from).collect(),
            generator: format!("musicl {}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}
