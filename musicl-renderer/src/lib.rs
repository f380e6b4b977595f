//! # musicl-renderer
//!
//! Tera-based serializer that turns a reconciliation result (or, for
//! full-item playlists, the upstream episode list) back into a playlist
//! document.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use musicl_core::types::{ChannelMeta, PlaylistFormat};
//! use musicl_reconcile::ReconciliationResult;
//! use musicl_renderer::Renderer;
//!
//! fn write(meta: &ChannelMeta, result: &ReconciliationResult) {
//!     if let Ok(renderer) = Renderer::new() {
//!         if let Ok(doc) = renderer.render(PlaylistFormat::RemoteItemsOnly, meta, result, &[]) {
//!             println!("{} bytes", doc.len());
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::{
    channel_guid, derive_guid, format_rss_date, newest_publish_date, TemplateContext,
    RSS_DATE_FORMAT,
};
pub use engine::Renderer;
pub use error::RenderError;
