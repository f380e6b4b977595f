//! # musicl-reconcile
//!
//! Pointer extraction and the reconciliation merge.
//!
//! [`extract_existing`] reads the pointers of a persisted playlist,
//! [`extract_upstream`] reads the ordered pointer candidates of a freshly
//! fetched feed, and [`reconcile`] merges the two into the next playlist body.
//! Everything here is synchronous and free of I/O.

pub mod engine;
pub mod error;
pub mod extract;

pub use engine::{reconcile, ReconciliationResult};
pub use error::ReconcileError;
pub use extract::{
    extract_existing, extract_item_keys, extract_upstream, ExistingPlaylist, PointerCandidate,
    PointerOrigin, UpstreamPointers,
};
