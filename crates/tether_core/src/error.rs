//! Bridge error types

use thiserror::Error;

use crate::handle::{ItemId, NativeHandle};

/// Errors raised at the managed/native boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A handle is already bound to a different live wrapper
    #[error("Native handle {handle} is already owned by item {owner}, cannot bind it to item {claimant}")]
    OwnershipConflict {
        handle: NativeHandle,
        owner: ItemId,
        claimant: ItemId,
    },

    /// The wrapper's native object has been deleted
    #[error("Item {id} is deleted")]
    ItemDeleted { id: ItemId },

    /// Operation needs a live native handle but got null
    #[error("Operation requires a non-null native handle")]
    NullHandle,

    /// Subscribe on a bridge that was shut down
    #[error("Event '{event}' has been shut down and accepts no new listeners")]
    EventShutDown { event: String },

    /// Every item id has been handed out
    #[error("Item ids exhausted")]
    IdsExhausted,
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BindError>;
