//! Channel-header inspection of a playlist document.

use chrono::{DateTime, Utc};
use serde::Serialize;

use musicl_core::markup::{element_text, Node, Scanner};
use musicl_core::types::PlaylistFormat;

use crate::detect_format;

/// What a playlist says about itself.
///
/// Only direct children of `<channel>` are read (plus `<image><url>`), so the
/// title of the first entry never shadows the playlist title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaylistSummary {
    pub format: PlaylistFormat,
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    /// Channel `podcast:guid`.
    pub guid: Option<String>,
    /// `<podcast:txt purpose="source-feed">`.
    pub source_feed: Option<String>,
    pub pub_date: Option<String>,
    pub last_build_date: Option<String>,
    pub item_count: usize,
    pub remote_item_count: usize,
}

impl PlaylistSummary {
    /// `lastBuildDate` parsed as RFC 2822.
    pub fn last_build_time(&self) -> Option<DateTime<Utc>> {
        parse_rfc2822(self.last_build_date.as_deref()?)
    }

    pub fn pub_time(&self) -> Option<DateTime<Utc>> {
        parse_rfc2822(self.pub_date.as_deref()?)
    }

    /// Entries of either kind.
    pub fn entry_count(&self) -> usize {
        self.item_count + self.remote_item_count
    }
}

fn parse_rfc2822(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Read the channel header of `document`.
pub fn inspect(document: &str) -> PlaylistSummary {
    let mut summary = PlaylistSummary {
        format: detect_format(document),
        ..PlaylistSummary::default()
    };
    let mut managing_editor = None;
    let mut itunes_author = None;
    let mut itunes_image = None;
    let mut stack: Vec<String> = Vec::new();
    let mut scanner = Scanner::new(document);

    while let Some(node) = scanner.next() {
        match node {
            Node::Open(tag) => {
                let local = tag.local_name().to_ascii_lowercase();
                let parent = stack.last().cloned().unwrap_or_default();
                match (parent.as_str(), local.as_str()) {
                    ("channel", "item") => {
                        summary.item_count += 1;
                        stack.push(local.clone());
                    }
                    ("channel", "image") => stack.push(local.clone()),
                    ("image", "url") if in_channel_image(&stack) => {
                        summary.image_url = summary.image_url.or(element_text(&mut scanner, "url"));
                    }
                    ("channel", "remoteitem") => {
                        summary.remote_item_count += 1;
                        stack.push(local.clone());
                    }
                    ("channel", "txt") => {
                        let purpose = tag.attr("purpose").unwrap_or_default().to_ascii_lowercase();
                        let text = element_text(&mut scanner, "txt");
                        if matches!(purpose.as_str(), "source-feed" | "source-rss") {
                            summary.source_feed = summary.source_feed.or(text);
                        }
                    }
                    ("channel", field) => {
                        let text = element_text(&mut scanner, field);
                        let slot = match field {
                            "title" => &mut summary.title,
                            "description" => &mut summary.description,
                            "author" if tag.name.contains(':') => &mut itunes_author,
                            "author" => &mut summary.author,
                            "managingeditor" => &mut managing_editor,
                            "link" => &mut summary.link,
                            "guid" => &mut summary.guid,
                            "pubdate" => &mut summary.pub_date,
                            "lastbuilddate" => &mut summary.last_build_date,
                            _ => continue,
                        };
                        if slot.is_none() {
                            *slot = text;
                        }
                    }
                    _ => stack.push(local.clone()),
                }
            }
            Node::Empty(tag) => {
                if stack.last().map(String::as_str) != Some("channel") {
                    continue;
                }
                if tag.is("remoteItem") {
                    summary.remote_item_count += 1;
                } else if tag.is("image") && itunes_image.is_none() {
                    itunes_image = tag.non_empty_attr("href").map(str::to_string);
                }
            }
            Node::Close { name, .. } => {
                let local = name.rsplit(':').next().unwrap_or(&name).to_ascii_lowercase();
                if let Some(pos) = stack.iter().rposition(|open| *open == local) {
                    stack.truncate(pos);
                }
            }
            Node::Text(_) => {}
        }
    }

    summary.author = summary.author.or(managing_editor).or(itunes_author);
    summary.image_url = summary.image_url.or(itunes_image);
    summary
}

fn in_channel_image(stack: &[String]) -> bool {
    stack.len() >= 2 && stack[stack.len() - 2] == "channel"
}
