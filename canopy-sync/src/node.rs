//! The sync capability shared by entities and collections.

use canopy_types::{NodeId, RawValue};
use serde_json::Value;
use std::fmt;

use crate::collection::Collection;
use crate::entity::Entity;
use crate::guard::SyncState;
use crate::options::SyncOptions;

/// A node that can be linked into a hierarchy and kept in sync with it.
///
/// Both directions are guarded: calls on a node without a parent, or on a
/// node that already has a sync in flight, return without doing anything.
pub trait Hierarchical {
    fn id(&self) -> NodeId;

    /// The owning entity, if linked.
    fn parent(&self) -> Option<Entity>;

    fn sync_state(&self) -> SyncState;

    fn bubbling_change_event(&self) -> bool;

    fn set_bubbling_change_event(&self, bubbling: bool);

    /// Child → parent: write this node's state into the parent's raw storage
    /// and, unless silenced, fire `change:<key>` and `change` on the parent.
    fn sync_up(&self, opts: SyncOptions);

    /// Parent → child: replace this node's source and state with `value`.
    fn sync_down(&self, value: RawValue);

    fn to_json(&self) -> Value;
}

/// Either kind of node.
#[derive(Clone, PartialEq)]
pub enum Node {
    Entity(Entity),
    Collection(Collection),
}

impl Node {
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(collection) => Some(collection),
            Self::Entity(_) => None,
        }
    }

    /// Schema name of the node, for logs and errors.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Entity(entity) => entity.schema().name(),
            Self::Collection(collection) => collection.schema().name(),
        }
    }
}

impl Hierarchical for Node {
    fn id(&self) -> NodeId {
        match self {
            Self::Entity(entity) => entity.id(),
            Self::Collection(collection) => collection.id(),
        }
    }

    fn parent(&self) -> Option<Entity> {
        match self {
            Self::Entity(entity) => entity.parent(),
            Self::Collection(collection) => collection.parent(),
        }
    }

    fn sync_state(&self) -> SyncState {
        match self {
            Self::Entity(entity) => entity.sync_state(),
            Self::Collection(collection) => collection.sync_state(),
        }
    }

    fn bubbling_change_event(&self) -> bool {
        match self {
            Self::Entity(entity) => entity.bubbling_change_event(),
            Self::Collection(collection) => collection.bubbling_change_event(),
        }
    }

    fn set_bubbling_change_event(&self, bubbling: bool) {
        match self {
            Self::Entity(entity) => entity.set_bubbling_change_event(bubbling),
            Self::Collection(collection) => collection.set_bubbling_change_event(bubbling),
        }
    }

    fn sync_up(&self, opts: SyncOptions) {
        match self {
            Self::Entity(entity) => entity.sync_up(opts),
            Self::Collection(collection) => collection.sync_up(opts),
        }
    }

    fn sync_down(&self, value: RawValue) {
        match self {
            Self::Entity(entity) => entity.sync_down(value),
            Self::Collection(collection) => collection.sync_down(value),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Entity(entity) => entity.to_json(),
            Self::Collection(collection) => collection.to_json(),
        }
    }
}

impl From<Entity> for Node {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Collection> for Node {
    fn from(collection: Collection) -> Self {
        Self::Collection(collection)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(entity) => fmt::Debug::fmt(entity, f),
            Self::Collection(collection) => fmt::Debug::fmt(collection, f),
        }
    }
}
