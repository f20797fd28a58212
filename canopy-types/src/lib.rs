//! Core type definitions for canopy hierarchies.
//!
//! This crate defines the plugin-agnostic building blocks the sync layer
//! works on:
//! - [`RawValue`]: the raw JSON-like tree a hierarchy projects, whose
//!   objects ([`RawObject`]) and arrays ([`RawArray`]) are shared handles
//!   with pointer identity
//! - [`NodeId`]: opaque identifiers for Entities and Collections
//!
//! Everything here is single-threaded (`Rc`-based); handles are not `Send`.

mod ids;
mod raw;

pub use ids::NodeId;
pub use raw::{RawArray, RawObject, RawValue};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("expected {expected}, found {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
}
