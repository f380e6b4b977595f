//! Pointer extraction from persisted playlists and from upstream feed markup.
//!
//! Both surfaces walk the document with [`musicl_core::markup::Scanner`], so
//! attribute order, quote style and name case never matter.
//!
//! ## Upstream ordering
//!
//! Pointers come from two places in an upstream feed:
//!
//! 1. inside `<podcast:valueTimeSplit>` blocks, attributed to the `<item>`
//!    that encloses them (identity: `<guid>`, else `<link>`);
//! 2. as standalone `<podcast:remoteItem>` tags anywhere else.
//!
//! The canonical order is: attributed split pointers in document order, then
//! standalone pointers in document order, then split pointers whose episode
//! could not be identified, also in document order. Nothing is sorted.

use std::collections::{HashMap, HashSet};

use musicl_core::markup::{element_text, Node, Scanner, Tag};
use musicl_core::types::{Episode, Pointer, RemoteItem};

// ---------------------------------------------------------------------------
// Existing playlist
// ---------------------------------------------------------------------------

/// Pointers of a persisted playlist, in document order, unique by `item_guid`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingPlaylist {
    items: Vec<RemoteItem>,
    index: HashMap<String, usize>,
}

impl ExistingPlaylist {
    /// Build from items in document order. A repeated `item_guid` keeps its
    /// first occurrence.
    pub fn from_items(items: impl IntoIterator<Item = RemoteItem>) -> Self {
        let mut playlist = Self::default();
        for item in items {
            if playlist.index.contains_key(&item.item_guid) {
                tracing::debug!(item_guid = %item.item_guid, "duplicate pointer in playlist; keeping first");
                continue;
            }
            playlist
                .index
                .insert(item.item_guid.clone(), playlist.items.len());
            playlist.items.push(item);
        }
        playlist
    }

    pub fn get(&self, item_guid: &str) -> Option<&RemoteItem> {
        self.index.get(item_guid).map(|&i| &self.items[i])
    }

    pub fn contains(&self, item_guid: &str) -> bool {
        self.index.contains_key(item_guid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read every well-formed pointer of a `RemoteItemsOnly` playlist.
///
/// `raw_form` is the exact byte slice of the tag (through its closing tag when
/// it is not self-closing). Pointers missing either guid are skipped.
pub fn extract_existing(document: &str) -> ExistingPlaylist {
    let mut items = Vec::new();
    let mut open: Option<Tag> = None;

    for node in Scanner::new(document) {
        match node {
            Node::Empty(tag) if tag.is("remoteItem") => {
                push_existing(&mut items, &tag, &document[tag.span.clone()]);
            }
            Node::Open(tag) if tag.is("remoteItem") => {
                if let Some(unclosed) = open.replace(tag) {
                    push_existing(&mut items, &unclosed, &document[unclosed.span.clone()]);
                }
            }
            ref close if close.closes("remoteItem") => {
                if let (Some(tag), Node::Close { span, .. }) = (open.take(), close) {
                    push_existing(&mut items, &tag, &document[tag.span.start..span.end]);
                }
            }
            _ => {}
        }
    }
    if let Some(unclosed) = open {
        push_existing(&mut items, &unclosed, &document[unclosed.span.clone()]);
    }

    ExistingPlaylist::from_items(items)
}

fn push_existing(items: &mut Vec<RemoteItem>, tag: &Tag, raw: &str) {
    match pointer_of(tag) {
        Some(pointer) => items.push(RemoteItem {
            feed_guid: pointer.feed_guid,
            item_guid: pointer.item_guid,
            raw_form: raw.to_string(),
        }),
        None => tracing::debug!(tag = raw, "skipping malformed pointer"),
    }
}

/// Identities (guid, else link) of the full `<item>` entries of a playlist.
pub fn extract_item_keys(document: &str) -> HashSet<String> {
    let mut keys = HashSet::new();
    let mut scanner = Scanner::new(document);
    let mut current: Option<EpisodeIdentity> = None;

    while let Some(node) = scanner.next() {
        match node {
            Node::Open(tag) if tag.is("item") => current = Some(EpisodeIdentity::default()),
            Node::Open(tag) if current.is_some() && (tag.is("guid") || tag.is("link")) => {
                let text = element_text(&mut scanner, tag.local_name());
                if let Some(identity) = current.as_mut() {
                    identity.record(&tag, text);
                }
            }
            ref close if close.closes("item") => {
                if let Some(key) = current.take().and_then(EpisodeIdentity::key) {
                    keys.insert(key);
                }
            }
            _ => {}
        }
    }
    keys
}

// ---------------------------------------------------------------------------
// Upstream feed
// ---------------------------------------------------------------------------

/// Where an upstream candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOrigin {
    /// Inside a `valueTimeSplit` of an identified episode.
    Split,
    /// A `remoteItem` outside any split block.
    Standalone,
    /// Inside a `valueTimeSplit` whose episode could not be identified.
    Unresolved,
    /// Synthesized from the parsed episode list.
    Episode,
}

/// One upstream pointer in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerCandidate {
    pub pointer: Pointer,
    pub origin: PointerOrigin,
    /// Identity of the episode the pointer belongs to, when known.
    pub episode_key: Option<String>,
    /// `startTime` of the enclosing split block.
    pub start_time: Option<String>,
}

/// All pointers offered by the upstream feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamPointers {
    /// Well-formed candidates in canonical order.
    pub ordered: Vec<PointerCandidate>,
    /// Every `itemGuid` mentioned anywhere upstream, malformed tags included.
    pub all_item_guids: HashSet<String>,
}

impl UpstreamPointers {
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// `true` if `item_guid` appears anywhere upstream.
    pub fn mentions(&self, item_guid: &str) -> bool {
        self.all_item_guids.contains(item_guid)
    }

    /// Synthesize one candidate per episode when the markup offered none.
    ///
    /// An episode's own embedded pointers are used when present; otherwise the
    /// pointer is `(feed_guid, episode.key)`.
    pub fn with_episode_fallback(mut self, episodes: &[Episode], feed_guid: &str) -> Self {
        if !self.ordered.is_empty() || episodes.is_empty() {
            return self;
        }
        tracing::info!(
            episodes = episodes.len(),
            feed_guid,
            "no pointers in upstream markup; synthesizing from episodes"
        );
        for episode in episodes {
            let pointers = if episode.pointers.is_empty() {
                vec![Pointer::new(feed_guid, episode.key.as_str())]
            } else {
                episode.pointers.clone()
            };
            for pointer in pointers {
                self.all_item_guids.insert(pointer.item_guid.clone());
                self.ordered.push(PointerCandidate {
                    pointer,
                    origin: PointerOrigin::Episode,
                    episode_key: Some(episode.key.clone()),
                    start_time: None,
                });
            }
        }
        self
    }
}

/// Extract the ordered pointer candidates of an upstream feed's raw markup.
pub fn extract_upstream(raw_markup: &str) -> UpstreamPointers {
    let mut out = UpstreamPointers::default();
    let mut resolved = Vec::new();
    let mut standalone = Vec::new();
    let mut unresolved = Vec::new();

    let mut episode: Option<EpisodeFrame> = None;
    // `Some(start_time)` while inside a valueTimeSplit block.
    let mut split: Option<Option<String>> = None;
    let mut scanner = Scanner::new(raw_markup);

    while let Some(node) = scanner.next() {
        match node {
            Node::Open(tag) if tag.is("item") => {
                if let Some(frame) = episode.replace(EpisodeFrame::default()) {
                    frame.flush(&mut resolved, &mut unresolved);
                }
            }
            ref close if close.closes("item") => {
                if let Some(frame) = episode.take() {
                    frame.flush(&mut resolved, &mut unresolved);
                }
                split = None;
            }
            Node::Open(tag) if tag.is("valueTimeSplit") => {
                split = Some(tag.non_empty_attr("startTime").map(str::to_string));
            }
            ref close if close.closes("valueTimeSplit") => split = None,
            Node::Open(tag) | Node::Empty(tag) if tag.is("remoteItem") => {
                if let Some(item_guid) = tag.non_empty_attr("itemGuid") {
                    out.all_item_guids.insert(item_guid.to_string());
                }
                let Some(pointer) = pointer_of(&tag) else {
                    tracing::debug!(
                        tag = &raw_markup[tag.span.clone()],
                        "skipping upstream pointer without both guids"
                    );
                    continue;
                };
                match (&split, episode.as_mut()) {
                    (Some(start_time), Some(frame)) => frame.splits.push((pointer, start_time.clone())),
                    (Some(start_time), None) => unresolved.push(PointerCandidate {
                        pointer,
                        origin: PointerOrigin::Unresolved,
                        episode_key: None,
                        start_time: start_time.clone(),
                    }),
                    (None, frame) => standalone.push(PointerCandidate {
                        pointer,
                        origin: PointerOrigin::Standalone,
                        episode_key: frame.and_then(|f| f.identity.key_ref().map(str::to_string)),
                        start_time: None,
                    }),
                }
            }
            Node::Open(tag) if split.is_none() && (tag.is("guid") || tag.is("link")) => {
                if let Some(frame) = episode.as_mut() {
                    let text = element_text(&mut scanner, tag.local_name());
                    frame.identity.record(&tag, text);
                }
            }
            _ => {}
        }
    }
    if let Some(frame) = episode.take() {
        frame.flush(&mut resolved, &mut unresolved);
    }

    tracing::debug!(
        resolved = resolved.len(),
        standalone = standalone.len(),
        unresolved = unresolved.len(),
        mentioned = out.all_item_guids.len(),
        "extracted upstream pointers"
    );
    out.ordered = resolved;
    out.ordered.extend(standalone);
    out.ordered.extend(unresolved);
    out
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn pointer_of(tag: &Tag) -> Option<Pointer> {
    let feed_guid = tag.non_empty_attr("feedGuid")?;
    let item_guid = tag.non_empty_attr("itemGuid")?;
    Some(Pointer::new(feed_guid, item_guid))
}

#[derive(Debug, Default)]
struct EpisodeIdentity {
    guid: Option<String>,
    link: Option<String>,
}

impl EpisodeIdentity {
    fn record(&mut self, tag: &Tag, text: Option<String>) {
        let slot = if tag.is("guid") {
            &mut self.guid
        } else {
            &mut self.link
        };
        if slot.is_none() {
            *slot = text;
        }
    }

    fn key_ref(&self) -> Option<&str> {
        self.guid.as_deref().or(self.link.as_deref())
    }

    fn key(self) -> Option<String> {
        self.guid.or(self.link)
    }
}

#[derive(Debug, Default)]
struct EpisodeFrame {
    identity: EpisodeIdentity,
    splits: Vec<(Pointer, Option<String>)>,
}

impl EpisodeFrame {
    fn flush(self, resolved: &mut Vec<PointerCandidate>, unresolved: &mut Vec<PointerCandidate>) {
        let key = self.identity.key();
        for (pointer, start_time) in self.splits {
            let candidate = PointerCandidate {
                pointer,
                origin: if key.is_some() {
                    PointerOrigin::Split
                } else {
                    PointerOrigin::Unresolved
                },
                episode_key: key.clone(),
                start_time,
            };
            if key.is_some() {
                resolved.push(candidate);
            } else {
                unresolved.push(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guids(upstream: &UpstreamPointers) -> Vec<&str> {
        upstream
            .ordered
            .iter()
            .map(|c| c.pointer.item_guid.as_str())
            .collect()
    }

    #[test]
    fn existing_keeps_exact_bytes_and_first_occurrence() {
        let doc = r#"<channel>
      <podcast:remoteItem itemGuid='a'   feedGuid="F1"/>
      <podcast:remoteItem feedGuid="F2" itemGuid="b"></podcast:remoteItem>
      <podcast:remoteItem feedGuid="F3" itemGuid="a"/>
      <podcast:remoteItem feedGuid="F4"/>
</channel>"#;
        let existing = extract_existing(doc);
        assert_eq!(existing.len(), 2);
        assert_eq!(
            existing.get("a").map(|i| i.raw_form.as_str()),
            Some(r#"<podcast:remoteItem itemGuid='a'   feedGuid="F1"/>"#)
        );
        assert_eq!(
            existing.get("b").map(|i| i.raw_form.as_str()),
            Some(r#"<podcast:remoteItem feedGuid="F2" itemGuid="b"></podcast:remoteItem>"#)
        );
        let order: Vec<_> = existing.iter().map(|i| i.item_guid.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn split_pointers_follow_their_item() {
        let feed = r#"<rss><channel>
  <item>
    <title>Ep 2</title>
    <podcast:value type="lightning" method="keysend">
      <podcast:valueTimeSplit startTime="60" duration="200">
        <podcast:remoteItem feedGuid="f" itemGuid="s2a"/>
      </podcast:valueTimeSplit>
      <podcast:valueTimeSplit startTime="300" duration="200">
        <podcast:remoteItem itemGuid="s2b" feedGuid="f"/>
      </podcast:valueTimeSplit>
    </podcast:value>
    <guid>ep-2</guid>
  </item>
  <item>
    <guid>ep-1</guid>
    <podcast:valueTimeSplit startTime="10"><podcast:remoteItem feedGuid="f" itemGuid="s1"/></podcast:valueTimeSplit>
  </item>
</channel></rss>"#;
        let upstream = extract_upstream(feed);
        assert_eq!(guids(&upstream), ["s2a", "s2b", "s1"]);
        assert_eq!(upstream.ordered[0].episode_key.as_deref(), Some("ep-2"));
        assert_eq!(upstream.ordered[1].start_time.as_deref(), Some("300"));
        assert_eq!(upstream.ordered[2].origin, PointerOrigin::Split);
    }

    #[test]
    fn standalone_after_resolved_and_unresolved_last() {
        let feed = r#"<rss><channel>
  <podcast:valueTimeSplit startTime="0"><podcast:remoteItem feedGuid="f" itemGuid="orphan-split"/></podcast:valueTimeSplit>
  <podcast:remoteItem feedGuid="f" itemGuid="solo-1"/>
  <item>
    <podcast:valueTimeSplit startTime="5"><podcast:remoteItem feedGuid="f" itemGuid="no-identity"/></podcast:valueTimeSplit>
  </item>
  <item>
    <link>https://e/ep</link>
    <podcast:valueTimeSplit startTime="5"><podcast:remoteItem feedGuid="f" itemGuid="by-link"/></podcast:valueTimeSplit>
    <podcast:remoteItem feedGuid="f" itemGuid="solo-2"/>
  </item>
</channel></rss>"#;
        let upstream = extract_upstream(feed);
        assert_eq!(
            guids(&upstream),
            ["by-link", "solo-1", "solo-2", "orphan-split", "no-identity"]
        );
        assert_eq!(upstream.ordered[0].episode_key.as_deref(), Some("https://e/ep"));
        assert_eq!(upstream.ordered[3].origin, PointerOrigin::Unresolved);
    }

    #[test]
    fn malformed_pointers_still_count_as_mentioned() {
        let feed = r#"<channel><podcast:remoteItem itemGuid="lonely"/></channel>"#;
        let upstream = extract_upstream(feed);
        assert!(upstream.is_empty());
        assert!(upstream.mentions("lonely"));
    }

    #[test]
    fn fallback_only_when_markup_is_empty() {
        let episode = Episode {
            key: "ep-1".into(),
            title: "Ep 1".into(),
            link: None,
            published_at: None,
            description: String::new(),
            enclosure: None,
            pointers: vec![],
        };
        let embedded = Episode {
            key: "ep-2".into(),
            pointers: vec![Pointer::new("other", "track-9")],
            ..episode.clone()
        };

        let synthesized =
            UpstreamPointers::default().with_episode_fallback(&[embedded, episode.clone()], "own");
        assert_eq!(guids(&synthesized), ["track-9", "ep-1"]);
        assert_eq!(synthesized.ordered[1].pointer.feed_guid, "own");
        assert!(synthesized.mentions("ep-1"));

        let from_markup = extract_upstream(r#"<podcast:remoteItem feedGuid="f" itemGuid="x"/>"#)
            .with_episode_fallback(&[episode], "own");
        assert_eq!(guids(&from_markup), ["x"]);
    }

    #[test]
    fn item_keys_prefer_guid() {
        let doc = "<channel><item><link>l1</link><guid>g1</guid></item><item><link>l2</link></item></channel>";
        let keys = extract_item_keys(doc);
        assert!(keys.contains("g1"));
        assert!(keys.contains("l2"));
        assert!(!keys.contains("l1"));
    }
}
