//! Declarative node types.
//!
//! A schema is shared by every instance of a type. It carries the defaults
//! applied at construction, the `related` map that drives auto-wiring of
//! nested nodes, the bubbling default, and an optional handler.

use serde_json::{Map, Value};
use std::fmt;
use std::rc::Rc;

use crate::handler::{CollectionHandler, EntityHandler};

/// The type a related attribute is wrapped into.
#[derive(Debug, Clone)]
pub enum RelatedSchema {
    Entity(Rc<EntitySchema>),
    Collection(Rc<CollectionSchema>),
}

/// Describes an entity type.
#[derive(Clone)]
pub struct EntitySchema {
    name: String,
    defaults: Map<String, Value>,
    related: Vec<(String, RelatedSchema)>,
    bubbling_change_event: bool,
    handler: Option<Rc<dyn EntityHandler>>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: Map::new(),
            related: Vec::new(),
            bubbling_change_event: true,
            handler: None,
        }
    }

    /// Default for an attribute missing from the construction data.
    pub fn with_default(mut self, attr: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(attr.into(), value);
        self
    }

    /// Wrap attribute `attr` into an entity of type `schema`.
    pub fn with_related_entity(self, attr: impl Into<String>, schema: &Rc<EntitySchema>) -> Self {
        self.with_related(attr.into(), RelatedSchema::Entity(Rc::clone(schema)))
    }

    /// Wrap attribute `attr` into a collection of type `schema`.
    pub fn with_related_collection(
        self,
        attr: impl Into<String>,
        schema: &Rc<CollectionSchema>,
    ) -> Self {
        self.with_related(attr.into(), RelatedSchema::Collection(Rc::clone(schema)))
    }

    fn with_related(mut self, attr: String, related: RelatedSchema) -> Self {
        match self.related.iter_mut().find(|(name, _)| *name == attr) {
            Some(entry) => entry.1 = related,
            None => self.related.push((attr, related)),
        }
        self
    }

    pub fn with_bubbling(mut self, bubbling: bool) -> Self {
        self.bubbling_change_event = bubbling;
        self
    }

    pub fn with_handler(mut self, handler: Rc<dyn EntityHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Related attributes in declaration order.
    pub fn related(&self) -> &[(String, RelatedSchema)] {
        &self.related
    }

    pub fn related_schema(&self, attr: &str) -> Option<&RelatedSchema> {
        self.related
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, related)| related)
    }

    pub fn bubbling_change_event(&self) -> bool {
        self.bubbling_change_event
    }

    pub fn handler(&self) -> Option<&Rc<dyn EntityHandler>> {
        self.handler.as_ref()
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .field("related", &self.related)
            .field("bubbling_change_event", &self.bubbling_change_event)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Describes a collection type: the entity type of its elements.
#[derive(Clone)]
pub struct CollectionSchema {
    name: String,
    model: Rc<EntitySchema>,
    bubbling_change_event: bool,
    handler: Option<Rc<dyn CollectionHandler>>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, model: &Rc<EntitySchema>) -> Self {
        Self {
            name: name.into(),
            model: Rc::clone(model),
            bubbling_change_event: true,
            handler: None,
        }
    }

    pub fn with_bubbling(mut self, bubbling: bool) -> Self {
        self.bubbling_change_event = bubbling;
        self
    }

    pub fn with_handler(mut self, handler: Rc<dyn CollectionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &Rc<EntitySchema> {
        &self.model
    }

    pub fn bubbling_change_event(&self) -> bool {
        self.bubbling_change_event
    }

    pub fn handler(&self) -> Option<&Rc<dyn CollectionHandler>> {
        self.handler.as_ref()
    }
}

impl fmt::Debug for CollectionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSchema")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .field("bubbling_change_event", &self.bubbling_change_event)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
