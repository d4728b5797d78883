//! Adapter inventory port.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Failed to enumerate adapters under {path}: {reason}")]
    Enumerate { path: String, reason: String },
}

/// Lists the physical adapters present on the host.
pub trait AdapterInventory: Send + Sync {
    /// Board IDs of physical functions, deduplicated, in discovery order.
    ///
    /// Virtual functions and bonding/management pseudo-devices are excluded.
    fn present_board_ids(&self) -> Result<Vec<String>, InventoryError>;
}

/// Fixed inventory, used when board IDs are supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    board_ids: Vec<String>,
}

impl StaticInventory {
    pub fn new<I, S>(board_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = Vec::new();
        for id in board_ids {
            let id = id.into();
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        Self { board_ids: seen }
    }
}

impl AdapterInventory for StaticInventory {
    fn present_board_ids(&self) -> Result<Vec<String>, InventoryError> {
        Ok(self.board_ids.clone())
    }
}
