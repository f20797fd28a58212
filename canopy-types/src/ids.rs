//! Node identity.

use std::fmt;
use uuid::Uuid;

/// Opaque handle identifying one Entity or Collection for its lifetime.
///
/// Parents key their relation map by this id instead of scanning their own
/// fields for a pointer match. Ids are UUID v7, so they also read in
/// creation order in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
