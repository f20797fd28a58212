use crate::collection::Collection;
use crate::entity::Entity;
use crate::error::{SyncError, SyncResult};

/// Optional per-schema hooks for entities.
///
/// Most schemas do NOT need a handler. Implement one if you need:
/// - Post-construction setup that reads related children
/// - Persistence for entities that are the root of a save chain
pub trait EntityHandler {
    /// Called once the entity is linked and its related children are wired.
    fn on_initialize(&self, entity: &Entity) {
        let _ = entity;
    }

    /// Persist an entity whose save was not forwarded to a parent.
    fn persist(&self, entity: &Entity) -> SyncResult<()> {
        Err(SyncError::NoPersister {
            node: entity.schema().name().to_string(),
        })
    }
}

/// Optional per-schema hooks for collections.
pub trait CollectionHandler {
    /// Called once the collection is linked and populated.
    fn on_initialize(&self, collection: &Collection) {
        let _ = collection;
    }

    /// Persist a collection whose save was not forwarded to a parent.
    fn persist(&self, collection: &Collection) -> SyncResult<()> {
        Err(SyncError::NoPersister {
            node: collection.schema().name().to_string(),
        })
    }
}
