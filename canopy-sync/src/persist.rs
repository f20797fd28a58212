//! Persistence delegation.
//!
//! A related child never persists itself: saving it forwards to its
//! parent's save, recursively, until the root of the relation chain hands
//! the entity to its schema's handler. Per-call callbacks are stripped at
//! every hop, so only callbacks given to the call that reaches the handler
//! ever run.

use serde_json::Value;
use tracing::debug;

use crate::collection::Collection;
use crate::entity::Entity;
use crate::error::{SyncError, SyncResult};
use crate::node::Node;
use crate::options::{SaveOptions, SetOptions};

impl Entity {
    /// Saves this entity, first setting `attrs` if given.
    pub fn save(&self, attrs: Option<Value>, opts: SaveOptions) -> SyncResult<()> {
        if let Some(attrs) = attrs {
            self.set_many_with(attrs, SetOptions { silent: opts.silent })?;
        }
        if let Some(parent) = self.related_parent() {
            debug!(child = %self.id(), parent = %parent.id(), "forwarding save to parent");
            return parent.save(None, opts.stripped());
        }

        let result = match self.schema().handler().cloned() {
            Some(handler) => handler.persist(self),
            None => Err(SyncError::NoPersister {
                node: self.schema().name().to_string(),
            }),
        };
        complete(Node::Entity(self.clone()), result, opts)
    }

    /// The parent, if it has related this entity under an attribute.
    fn related_parent(&self) -> Option<Entity> {
        self.parent()
            .filter(|parent| parent.relation_of(self.id()).is_some())
    }
}

impl Collection {
    /// Saves this collection: a related collection forwards to its parent,
    /// anything else goes to the schema's handler.
    pub fn save(&self, opts: SaveOptions) -> SyncResult<()> {
        if let Some(parent) = self
            .parent()
            .filter(|parent| parent.relation_of(self.id()).is_some())
        {
            debug!(child = %self.id(), parent = %parent.id(), "forwarding save to parent");
            return parent.save(None, opts.stripped());
        }

        let result = match self.schema().handler().cloned() {
            Some(handler) => handler.persist(self),
            None => Err(SyncError::NoPersister {
                node: self.schema().name().to_string(),
            }),
        };
        complete(Node::Collection(self.clone()), result, opts)
    }
}

fn complete(node: Node, result: SyncResult<()>, opts: SaveOptions) -> SyncResult<()> {
    match result {
        Ok(()) => {
            if let Some(on_success) = opts.on_success {
                on_success(&node);
            }
            Ok(())
        }
        Err(err) => {
            if let Some(on_error) = opts.on_error {
                on_error(&err);
            }
            Err(err)
        }
    }
}
