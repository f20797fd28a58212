//! Auto-wiring of related children.
//!
//! For every `related` attribute of an entity's schema, construction wraps
//! the raw attribute value into a child node linked to the entity, registers
//! the child in the entity's relation map, and syncs the child up once
//! silently so defaults the child applied reach the parent's raw storage.
//! From then on a `change:<attr>` on the entity syncs the child down.

use canopy_types::{RawArray, RawObject, RawValue};
use tracing::debug;

use crate::collection::Collection;
use crate::entity::Entity;
use crate::node::{Hierarchical, Node};
use crate::options::SyncOptions;
use crate::schema::RelatedSchema;

impl Entity {
    pub(crate) fn wire_related(&self) {
        let related = self.schema().related().to_vec();
        for (attr, schema) in related {
            let raw = self.get(&attr).unwrap_or_default();
            let child = match schema {
                RelatedSchema::Entity(schema) => {
                    let source = match raw {
                        RawValue::Object(object) => object,
                        _ => RawObject::new(),
                    };
                    Node::Entity(Entity::build(&schema, source, Some(self)))
                }
                RelatedSchema::Collection(schema) => {
                    let source = match raw {
                        RawValue::Array(array) => array,
                        _ => RawArray::new(),
                    };
                    Node::Collection(Collection::build(&schema, source, Some(self)))
                }
            };
            self.relate(attr, child);
        }
    }

    /// Wires `child` under attribute `attr` the same way auto-wiring does.
    ///
    /// An unlinked child is linked to this entity first, taking the current
    /// raw value of `attr` as its source. Returns false, leaving everything
    /// untouched, if the child is linked to a different entity.
    pub fn relate(&self, attr: impl Into<String>, child: impl Into<Node>) -> bool {
        let attr = attr.into();
        let child = child.into();

        match child.parent() {
            Some(parent) if parent != *self => {
                debug!(child = %child.id(), attr = %attr, "child belongs to another parent, not relating");
                return false;
            }
            Some(_) => {}
            None => {
                let raw = self.get(&attr);
                match &child {
                    Node::Entity(entity) => {
                        entity.link_parent(self, raw.as_ref().and_then(RawValue::as_object).cloned());
                    }
                    Node::Collection(collection) => {
                        collection.link_parent(self, raw.as_ref().and_then(RawValue::as_array).cloned());
                    }
                }
            }
        }

        debug!(
            parent = %self.id(),
            child = %child.id(),
            attr = %attr,
            kind = child.type_name(),
            "wiring related child"
        );
        self.inner.relations.borrow_mut().insert(attr, child.clone());
        child.sync_up(SyncOptions::silent());
        true
    }
}
