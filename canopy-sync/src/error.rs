//! Error types for the hierarchy layer.
//!
//! Sync itself never fails: relation misses, identity drift and re-entrant
//! calls are handled in place. These errors only come from the edges:
//! building nodes from raw data of the wrong shape, and persistence.

use thiserror::Error;

/// Result type for hierarchy operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur at the boundary of a hierarchy.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Raw data had the wrong shape or could not be parsed.
    #[error(transparent)]
    Types(#[from] canopy_types::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The root of a save chain has no persistence handler.
    #[error("no persister registered for {node}")]
    NoPersister { node: String },

    /// The persistence handler rejected the save.
    #[error("persistence failed: {0}")]
    Persistence(String),
}
