//! Error types for musicl-reconcile.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// Upstream offered neither pointers nor episodes. Nothing may be written.
    #[error("upstream feed produced no playlist entries (no pointers, no episodes)")]
    NoContent,
}
