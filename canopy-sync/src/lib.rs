//! Bidirectional sync for hierarchical observable records.
//!
//! A hierarchy is a tree of [`Entity`] records and [`Collection`]s of
//! entities that projects a raw JSON-like document (see
//! [`canopy_types::RawValue`]). Any node can be observed and mutated on its
//! own; the sync layer keeps every ancestor and the raw document consistent.
//!
//! # Architecture
//!
//! - **Observable primitive**: attribute store / ordered sequence with
//!   synchronous, name-keyed events ([`EventKind`], [`Event`])
//! - **Schema**: per-type defaults and the `related` map
//!   ([`EntitySchema`], [`CollectionSchema`])
//! - **Auto-wiring**: related attributes are wrapped into linked child
//!   nodes at construction, before the initialization hook runs
//! - **Relation resolver**: each parent maps child [`NodeId`]s to the
//!   attribute holding them
//! - **Re-entrancy guard**: per-node [`SyncState`], released on every exit
//!   path
//!
//! ## Propagation
//!
//! 1. **Up**: a mutation fires `change:<key>` and `change` on the node. On
//!    `change` the node writes its state into the raw value its parent
//!    stores under the node's relation key (its `source`), then fires
//!    `change:<key>` and `change` on the parent, which repeats the step.
//! 2. **Down**: `change:<key>` on a parent whose `key` is related replaces
//!    the child's source and state with the new raw value.
//! 3. **Echoes**: each direction runs under the node's guard, so the event
//!    a sync causes cannot sync the same node back.
//!
//! Collection elements are linked to the collection's parent and forward
//! their events to the collection, which syncs on their behalf.
//!
//! # Example
//!
//! ```
//! use canopy_sync::{CollectionSchema, Entity, EntitySchema};
//! use serde_json::json;
//!
//! let bed = EntitySchema::new("bed").build();
//! let beds = CollectionSchema::new("beds", &bed).build();
//! let room = EntitySchema::new("room")
//!     .with_related_collection("beds", &beds)
//!     .build();
//!
//! let room = Entity::new(&room, json!({"beds": [{"type": "queen"}]})).unwrap();
//! room.related_collection("beds").unwrap().add(json!({"type": "sofa"})).unwrap();
//!
//! assert_eq!(room.to_json(), json!({"beds": [{"type": "queen"}, {"type": "sofa"}]}));
//! ```

mod collection;
mod entity;
mod error;
mod events;
mod guard;
mod handler;
mod node;
mod options;
mod persist;
mod resolver;
mod schema;
mod wiring;

pub use canopy_types::{NodeId, RawArray, RawObject, RawValue};
pub use collection::Collection;
pub use entity::Entity;
pub use error::{SyncError, SyncResult};
pub use events::{Event, EventKind, ListenerId};
pub use guard::SyncState;
pub use handler::{CollectionHandler, EntityHandler};
pub use node::{Hierarchical, Node};
pub use options::{SaveOptions, SetOptions, SyncOptions};
pub use schema::{CollectionSchema, EntitySchema, RelatedSchema};
