//! Merge of existing playlist pointers with the upstream ordering.

use std::collections::HashSet;

use serde::Serialize;

use musicl_core::types::RemoteItem;

use crate::error::ReconcileError;
use crate::extract::{ExistingPlaylist, UpstreamPointers};

/// Output of one reconciliation pass.
///
/// `added`, `carried_over` and `orphaned` are disjoint and sum to
/// `items.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub items: Vec<RemoteItem>,
    pub added: usize,
    pub carried_over: usize,
    pub orphaned: usize,
}

impl ReconciliationResult {
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Item guids in output order.
    pub fn item_guids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.item_guid.as_str())
    }
}

/// Re-sequence `existing` to follow `upstream`.
///
/// Upstream order wins. An item already in the playlist keeps its exact
/// serialization even when the upstream `feedGuid` differs. Existing items
/// that upstream never mentions are kept at the end in their old relative
/// order; items upstream mentions but did not order are dropped.
pub fn reconcile(
    existing: &ExistingPlaylist,
    upstream: &UpstreamPointers,
) -> Result<ReconciliationResult, ReconcileError> {
    if upstream.is_empty() {
        tracing::error!(
            existing = existing.len(),
            "upstream offered nothing to reconcile; refusing to write"
        );
        return Err(ReconcileError::NoContent);
    }

    let mut result = ReconciliationResult::default();
    let mut consumed: HashSet<&str> = HashSet::with_capacity(upstream.ordered.len());

    for candidate in &upstream.ordered {
        let guid = candidate.pointer.item_guid.as_str();
        if !consumed.insert(guid) {
            continue;
        }
        match existing.get(guid) {
            Some(kept) => {
                result.items.push(kept.clone());
                result.carried_over += 1;
            }
            None => {
                result.items.push(RemoteItem::synthesize(&candidate.pointer));
                result.added += 1;
            }
        }
    }

    for item in existing.iter() {
        let guid = item.item_guid.as_str();
        if consumed.contains(guid) || upstream.mentions(guid) {
            continue;
        }
        result.items.push(item.clone());
        result.orphaned += 1;
    }

    tracing::debug!(
        added = result.added,
        carried_over = result.carried_over,
        orphaned = result.orphaned,
        "reconciled"
    );
    Ok(result)
}
