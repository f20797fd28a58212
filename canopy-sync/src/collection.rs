//! Collections: ordered, observable sequences of entities.
//!
//! A linked collection's `source` is the raw array its parent stores under
//! the collection's relation key. Upward syncs rewrite that array in place
//! (truncate, then append every element's projection) so its identity
//! survives the write. Elements are linked to the collection's parent, not
//! to the collection, and forward their events to every collection that
//! contains them.

use canopy_types::{NodeId, RawArray, RawObject, RawValue};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

use crate::entity::{Entity, EntityInner};
use crate::error::SyncResult;
use crate::events::{Emitter, Event, EventKind, ListenerId};
use crate::guard::{SyncGuard, SyncState};
use crate::node::{Hierarchical, Node};
use crate::options::{SetOptions, SyncOptions};
use crate::schema::CollectionSchema;

struct CollectionLink {
    parent: Weak<EntityInner>,
    source: RawArray,
}

pub(crate) struct CollectionInner {
    id: NodeId,
    schema: Rc<CollectionSchema>,
    elements: RefCell<Vec<Entity>>,
    link: RefCell<Option<CollectionLink>>,
    emitter: Emitter,
    state: Cell<SyncState>,
    bubbling: Cell<bool>,
}

/// An ordered sequence of entities, optionally linked into a hierarchy.
///
/// Cloning a `Collection` creates a new handle to the **same** sequence.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl Collection {
    /// Creates a free-standing (root) collection from a JSON array.
    ///
    /// `null` is accepted as an empty array.
    pub fn new(schema: &Rc<CollectionSchema>, models: Value) -> SyncResult<Self> {
        let models = RawValue::from(models).into_array()?;
        Ok(Self::build(schema, models, None))
    }

    /// Creates a collection linked to `parent`, with `models` as its source.
    pub fn with_parent(
        schema: &Rc<CollectionSchema>,
        models: Value,
        parent: &Entity,
    ) -> SyncResult<Self> {
        let models = RawValue::from(models).into_array()?;
        Ok(Self::build(schema, models, Some(parent)))
    }

    /// Creates a collection over existing raw storage. When `parent` is
    /// given, `models` becomes the source without copying.
    pub fn from_raw(schema: &Rc<CollectionSchema>, models: RawArray, parent: Option<&Entity>) -> Self {
        Self::build(schema, models, parent)
    }

    /// Construction runs in a fixed order: parent link, silent population
    /// (every element attached and wired), then the initialization hook.
    pub(crate) fn build(
        schema: &Rc<CollectionSchema>,
        models: RawArray,
        parent: Option<&Entity>,
    ) -> Self {
        let collection = Self {
            inner: Rc::new(CollectionInner {
                id: NodeId::new(),
                schema: Rc::clone(schema),
                elements: RefCell::new(Vec::new()),
                link: RefCell::new(None),
                emitter: Emitter::default(),
                state: Cell::new(SyncState::Idle),
                bubbling: Cell::new(schema.bubbling_change_event()),
            }),
        };

        if let Some(parent) = parent {
            collection.link_parent(parent, Some(models.clone()));
        }
        let elements: Vec<Entity> = models
            .items()
            .into_iter()
            .map(|raw| collection.prepare(raw))
            .collect();
        for element in &elements {
            collection.attach(element);
            collection.wire_element(element);
        }
        *collection.inner.elements.borrow_mut() = elements;

        if let Some(handler) = schema.handler().cloned() {
            handler.on_initialize(&collection);
        }
        collection
    }

    pub(crate) fn from_inner(inner: Rc<CollectionInner>) -> Self {
        Self { inner }
    }

    // ── Introspection ────────────────────────────────────────────

    /// Identity of this collection, stable for its lifetime.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The schema this collection was built from.
    #[must_use]
    pub fn schema(&self) -> &Rc<CollectionSchema> {
        &self.inner.schema
    }

    /// The entity that holds this collection under a relation key.
    #[must_use]
    pub fn parent(&self) -> Option<Entity> {
        self.inner
            .link
            .borrow()
            .as_ref()
            .and_then(|link| link.parent.upgrade())
            .map(Entity::from_inner)
    }

    /// The raw array this collection mirrors into its parent.
    #[must_use]
    pub fn source(&self) -> Option<RawArray> {
        self.inner.link.borrow().as_ref().map(|link| link.source.clone())
    }

    /// `Syncing` while a sync call on this collection is in flight.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.inner.state.get()
    }

    /// Whether an upward sync fires `change:<key>` and `change` on the
    /// parent. Starts from the schema's setting.
    #[must_use]
    pub fn bubbling_change_event(&self) -> bool {
        self.inner.bubbling.get()
    }

    pub fn set_bubbling_change_event(&self, bubbling: bool) {
        self.inner.bubbling.set(bubbling);
    }

    // ── Linking ──────────────────────────────────────────────────

    /// Links this collection under `parent` with `source` as its mirrored
    /// raw array (a fresh empty array if `None`). Current elements without
    /// a parent are linked to `parent` too.
    ///
    /// Returns false and changes nothing if already linked.
    pub fn link_parent(&self, parent: &Entity, source: Option<RawArray>) -> bool {
        if self.parent().is_some() {
            return false;
        }
        *self.inner.link.borrow_mut() = Some(CollectionLink {
            parent: Rc::downgrade(&parent.inner),
            source: source.unwrap_or_default(),
        });
        for element in self.elements() {
            self.wire_element(&element);
        }
        true
    }

    fn set_source(&self, source: RawArray) {
        if let Some(link) = self.inner.link.borrow_mut().as_mut() {
            link.source = source;
        }
    }

    /// Builds an element entity from one raw item.
    fn prepare(&self, raw: RawValue) -> Entity {
        let attrs = match raw {
            RawValue::Object(object) => object,
            other => {
                debug!(collection = %self.id(), found = other.kind(), "non-object element, using empty record");
                RawObject::new()
            }
        };
        Entity::build(self.inner.schema.model(), attrs, None)
    }

    /// Makes this collection a receiver of the element's events.
    fn attach(&self, element: &Entity) {
        element.join_collection(&self.inner);
    }

    /// Links an unparented element to this collection's parent.
    fn wire_element(&self, element: &Entity) {
        if let Some(parent) = self.parent()
            && element.parent().is_none()
        {
            element.link_parent(&parent, None);
        }
    }

    /// Undoes `attach` and `wire_element` for an element leaving the
    /// collection. The parent link survives while a remaining collection
    /// shares it or the parent relates the element directly; otherwise the
    /// element moves under the next remaining collection's parent.
    fn detach(&self, element: &Entity) {
        if !element.leave_collection(&self.inner) {
            return;
        }
        let remaining = element.collections();
        if let (Some(ours), Some(theirs)) = (self.parent(), element.parent())
            && ours == theirs
            && ours.relation_of(element.id()).is_none()
            && remaining.iter().all(|other| other.parent().as_ref() != Some(&ours))
        {
            element.unlink();
            for other in &remaining {
                other.wire_element(element);
            }
        }
    }

    // ── Sequence ─────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.inner.elements.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.elements.borrow().is_empty()
    }

    pub fn at(&self, index: usize) -> Option<Entity> {
        self.inner.elements.borrow().get(index).cloned()
    }

    pub fn index_of(&self, element: &Entity) -> Option<usize> {
        self.inner
            .elements
            .borrow()
            .iter()
            .position(|candidate| candidate == element)
    }

    pub fn contains(&self, element: &Entity) -> bool {
        self.index_of(element).is_some()
    }

    /// Snapshot of the elements in order.
    pub fn elements(&self) -> Vec<Entity> {
        self.inner.elements.borrow().clone()
    }

    /// Builds an element from a JSON object and appends it.
    pub fn add(&self, attrs: Value) -> SyncResult<Entity> {
        self.add_with(attrs, SetOptions::default())
    }

    pub fn add_with(&self, attrs: Value, opts: SetOptions) -> SyncResult<Entity> {
        let attrs = RawValue::from(attrs).into_object()?;
        let element = Entity::build(self.inner.schema.model(), attrs, None);
        self.add_entity_with(&element, opts);
        Ok(element)
    }

    /// Appends an existing entity. Returns false if it is already an element.
    pub fn add_entity(&self, element: &Entity) -> bool {
        self.add_entity_with(element, SetOptions::default())
    }

    pub fn add_entity_with(&self, element: &Entity, opts: SetOptions) -> bool {
        if self.contains(element) {
            return false;
        }
        self.inner.elements.borrow_mut().push(element.clone());
        self.attach(element);
        if !opts.silent {
            self.dispatch(Event {
                kind: EventKind::Add,
                target: Node::Entity(element.clone()),
            });
        }
        true
    }

    /// Removes `element`. Returns false if it was not an element.
    pub fn remove(&self, element: &Entity) -> bool {
        self.remove_with(element, SetOptions::default())
    }

    pub fn remove_with(&self, element: &Entity, opts: SetOptions) -> bool {
        match self.index_of(element) {
            Some(index) => self.remove_at_with(index, opts).is_some(),
            None => false,
        }
    }

    pub fn remove_at(&self, index: usize) -> Option<Entity> {
        self.remove_at_with(index, SetOptions::default())
    }

    pub fn remove_at_with(&self, index: usize, opts: SetOptions) -> Option<Entity> {
        let element = {
            let mut elements = self.inner.elements.borrow_mut();
            if index >= elements.len() {
                return None;
            }
            elements.remove(index)
        };
        if !opts.silent {
            self.dispatch(Event {
                kind: EventKind::Remove,
                target: Node::Entity(element.clone()),
            });
        }
        self.detach(&element);
        Some(element)
    }

    /// Replaces every element with ones built from a JSON array. Fires a
    /// single `reset`, never per-element `add`.
    pub fn reset(&self, models: Value) -> SyncResult<()> {
        self.reset_with(models, SetOptions::default())
    }

    pub fn reset_with(&self, models: Value, opts: SetOptions) -> SyncResult<()> {
        let models = RawValue::from(models).into_array()?;
        self.reset_raw(models.items(), opts);
        Ok(())
    }

    fn reset_raw(&self, items: Vec<RawValue>, opts: SetOptions) {
        let fresh: Vec<Entity> = items.into_iter().map(|raw| self.prepare(raw)).collect();
        let previous = std::mem::replace(&mut *self.inner.elements.borrow_mut(), fresh.clone());
        for element in &previous {
            self.detach(element);
        }
        for element in &fresh {
            self.attach(element);
        }
        if !opts.silent {
            self.trigger(EventKind::Reset);
        }
    }

    // ── Events ───────────────────────────────────────────────────

    /// Subscribes to one event name.
    pub fn on(&self, kind: EventKind, callback: impl Fn(&Event) + 'static) -> ListenerId {
        self.inner.emitter.subscribe(Some(kind), Rc::new(callback))
    }

    /// Subscribes to every event, including those forwarded from elements.
    pub fn on_all(&self, callback: impl Fn(&Event) + 'static) -> ListenerId {
        self.inner.emitter.subscribe(None, Rc::new(callback))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.emitter.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.emitter.len()
    }

    /// Fires `kind` on this collection with the collection as target.
    pub fn trigger(&self, kind: EventKind) {
        self.dispatch(Event {
            kind,
            target: Node::Collection(self.clone()),
        });
    }

    pub(crate) fn forward_element_event(&self, event: &Event) {
        self.dispatch(event.clone());
    }

    /// Listeners first, then element wiring, then the upward sync.
    fn dispatch(&self, event: Event) {
        self.inner.emitter.emit(&event);
        match &event.kind {
            EventKind::Add => {
                if let Some(element) = event.target.as_entity() {
                    self.wire_element(element);
                }
                self.sync_up(SyncOptions::default());
            }
            EventKind::Reset => {
                for element in self.elements() {
                    self.wire_element(&element);
                }
                self.sync_up(SyncOptions::default());
            }
            EventKind::Remove | EventKind::Change => self.sync_up(SyncOptions::default()),
            EventKind::ChangeField(_) => {}
        }
    }

    // ── Sync ─────────────────────────────────────────────────────

    /// Rewrites the parent's raw array in place with every element's
    /// projection.
    ///
    /// No-op when unlinked, when a sync is already in flight on this
    /// collection, or when the parent has not related it.
    pub fn sync_up(&self, opts: SyncOptions) {
        let Some(parent) = self.parent() else {
            return;
        };
        let Some(_guard) = SyncGuard::acquire(&self.inner.state) else {
            trace!(node = %self.id(), "dropping re-entrant sync_up");
            return;
        };
        let Some(field) = parent.relation_of(self.id()) else {
            trace!(node = %self.id(), parent = %parent.id(), "no relation in parent, sync_up skipped");
            return;
        };

        let items: Vec<RawValue> = self.elements().iter().map(Entity::to_raw).collect();
        let source = match parent.get(&field) {
            Some(RawValue::Array(current)) => {
                if self.source().is_none_or(|source| !source.ptr_eq(&current)) {
                    debug!(node = %self.id(), field = %field, "source drifted from parent, re-pointing");
                    self.set_source(current.clone());
                }
                current
            }
            current => {
                if items.is_empty() && current.as_ref().is_none_or(RawValue::is_null) {
                    return;
                }
                let source = self.source().unwrap_or_default();
                parent
                    .inner
                    .attributes
                    .borrow_mut()
                    .insert(field.clone(), RawValue::Array(source.clone()));
                source
            }
        };
        source.replace_contents(items);

        if self.bubbling_change_event() && !opts.silent {
            parent.trigger(EventKind::ChangeField(field));
            parent.trigger(EventKind::Change);
        }
    }

    /// Takes `value` as the new source and resets the elements from it. A
    /// non-array value empties the collection.
    pub fn sync_down(&self, value: RawValue) {
        if self.parent().is_none() {
            return;
        }
        let Some(_guard) = SyncGuard::acquire(&self.inner.state) else {
            trace!(node = %self.id(), "dropping re-entrant sync_down");
            return;
        };

        let source = match value {
            RawValue::Array(array) => array,
            other => {
                debug!(node = %self.id(), found = other.kind(), "sync_down with non-array, emptying");
                RawArray::new()
            }
        };
        self.set_source(source.clone());
        self.reset_raw(source.items(), SetOptions::default());
    }

    // ── Serialization ────────────────────────────────────────────

    /// Deep plain-JSON projection of every element.
    pub fn to_json(&self) -> Value {
        Value::Array(self.elements().iter().map(Entity::to_json).collect())
    }

    /// New raw array of element projections (nested containers shared).
    pub fn to_raw(&self) -> RawValue {
        RawValue::Array(RawArray::from_items(
            self.elements().iter().map(Entity::to_raw).collect(),
        ))
    }
}

impl Hierarchical for Collection {
    fn id(&self) -> NodeId {
        Collection::id(self)
    }

    fn parent(&self) -> Option<Entity> {
        Collection::parent(self)
    }

    fn sync_state(&self) -> SyncState {
        Collection::sync_state(self)
    }

    fn bubbling_change_event(&self) -> bool {
        Collection::bubbling_change_event(self)
    }

    fn set_bubbling_change_event(&self, bubbling: bool) {
        Collection::set_bubbling_change_event(self, bubbling)
    }

    fn sync_up(&self, opts: SyncOptions) {
        Collection::sync_up(self, opts)
    }

    fn sync_down(&self, value: RawValue) {
        Collection::sync_down(self, value)
    }

    fn to_json(&self) -> Value {
        Collection::to_json(self)
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.inner.id)
            .field("schema", &self.inner.schema.name())
            .field("len", &self.len())
            .finish()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let elements = self.elements();
        let mut state = serializer.serialize_seq(Some(elements.len()))?;
        for element in &elements {
            state.serialize_element(element)?;
        }
        state.end()
    }
}
