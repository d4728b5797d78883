//! Errors raised while collecting host state.

use hcacheck_core::{InventoryError, ProcessError};
use thiserror::Error;

/// Collector failure.
///
/// Most per-attribute failures degrade to an empty value and are only
/// logged; this type covers the ones a caller has to see.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Unexpected {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("MaxReadReq of {bdf} reads {actual:#06x} after writing {written:#06x}")]
    MrrNotApplied { bdf: String, written: u16, actual: u16 },

    #[error("Collection task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CollectError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
