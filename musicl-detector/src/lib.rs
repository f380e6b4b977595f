//! Playlist format detection for `musicl-detector`.
//!
//! [`detect_format`] classifies an existing playlist document. A document is
//! [`PlaylistFormat::FullItems`] as soon as one `<item>` carries its own
//! `<title>` or `<enclosure>`; anything else, including a document with no
//! entries at all, is [`PlaylistFormat::RemoteItemsOnly`]. There is no error
//! path: unreadable markup simply yields no markers.
//!
//! [`inspect`] reads the channel header of a playlist for discovery and for
//! carrying the playlist guid forward.

use musicl_core::markup::{Node, Scanner};
use musicl_core::types::PlaylistFormat;

mod summary;

pub use summary::{inspect, PlaylistSummary};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Classify the on-disk shape of `document`.
pub fn detect_format(document: &str) -> PlaylistFormat {
    if has_full_item(document) {
        PlaylistFormat::FullItems
    } else {
        PlaylistFormat::RemoteItemsOnly
    }
}

/// Classify `document`, or return `default` for a playlist that does not exist yet.
pub fn detect_or_default(document: Option<&str>, default: PlaylistFormat) -> PlaylistFormat {
    match document {
        Some(doc) => detect_format(doc),
        None => default,
    }
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

fn has_full_item(document: &str) -> bool {
    let mut item_depth = 0usize;
    for node in Scanner::new(document) {
        match node {
            Node::Open(tag) if tag.is("item") => item_depth += 1,
            ref close if close.closes("item") => item_depth = item_depth.saturating_sub(1),
            Node::Open(tag) | Node::Empty(tag)
                if item_depth > 0 && (tag.is("title") || tag.is("enclosure")) =>
            {
                return true;
            }
            _ => {}
        }
    }
    false
}
