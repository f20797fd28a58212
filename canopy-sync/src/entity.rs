//! Entities: observable records linked into a hierarchy.
//!
//! An entity owns its attribute map. When linked, it also holds `source`,
//! the raw object its parent stores under the entity's relation key. Every
//! completed sync leaves `source` and the parent's raw attribute as the same
//! handle; a parent that replaced the raw value behind the entity's back is
//! noticed and repaired on the next upward sync.

use canopy_types::{NodeId, RawObject, RawValue};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

use crate::collection::{Collection, CollectionInner};
use crate::error::SyncResult;
use crate::events::{Emitter, Event, EventKind, ListenerId};
use crate::guard::{SyncGuard, SyncState};
use crate::node::{Hierarchical, Node};
use crate::options::{SetOptions, SyncOptions};
use crate::resolver::RelationMap;
use crate::schema::EntitySchema;

pub(crate) struct EntityLink {
    pub(crate) parent: Weak<EntityInner>,
    pub(crate) source: RawObject,
}

pub(crate) struct EntityInner {
    id: NodeId,
    schema: Rc<EntitySchema>,
    pub(crate) attributes: RefCell<BTreeMap<String, RawValue>>,
    link: RefCell<Option<EntityLink>>,
    pub(crate) relations: RefCell<RelationMap>,
    /// Collections this entity is an element of, in joining order. Each one
    /// receives the entity's events.
    collections: RefCell<Vec<Weak<CollectionInner>>>,
    emitter: Emitter,
    state: Cell<SyncState>,
    bubbling: Cell<bool>,
}

/// A structured record with named attributes, optionally linked into a
/// hierarchy.
///
/// Cloning an `Entity` creates a new handle to the **same** record.
#[derive(Clone)]
pub struct Entity {
    pub(crate) inner: Rc<EntityInner>,
}

impl Entity {
    /// Creates a free-standing (root) entity from a JSON object.
    ///
    /// `null` is accepted as an empty object.
    pub fn new(schema: &Rc<EntitySchema>, attrs: Value) -> SyncResult<Self> {
        let attrs = RawValue::from(attrs).into_object()?;
        Ok(Self::build(schema, attrs, None))
    }

    /// Creates an entity linked to `parent`, with `attrs` as its source.
    ///
    /// The entity only syncs once the parent relates it under an attribute
    /// (see [`Entity::relate`]).
    pub fn with_parent(schema: &Rc<EntitySchema>, attrs: Value, parent: &Entity) -> SyncResult<Self> {
        let attrs = RawValue::from(attrs).into_object()?;
        Ok(Self::build(schema, attrs, Some(parent)))
    }

    /// Creates an entity over existing raw storage. When `parent` is given,
    /// `attrs` becomes the entity's source without copying.
    pub fn from_raw(schema: &Rc<EntitySchema>, attrs: RawObject, parent: Option<&Entity>) -> Self {
        Self::build(schema, attrs, parent)
    }

    /// Construction runs in a fixed order: attributes, parent link, related
    /// wiring, then the schema's initialization hook.
    pub(crate) fn build(schema: &Rc<EntitySchema>, attrs: RawObject, parent: Option<&Entity>) -> Self {
        let mut attributes: BTreeMap<String, RawValue> = schema
            .defaults()
            .iter()
            .map(|(key, value)| (key.clone(), RawValue::from(value.clone())))
            .collect();
        attributes.extend(attrs.entries());

        let entity = Self {
            inner: Rc::new(EntityInner {
                id: NodeId::new(),
                schema: Rc::clone(schema),
                attributes: RefCell::new(attributes),
                link: RefCell::new(None),
                relations: RefCell::new(RelationMap::default()),
                collections: RefCell::new(Vec::new()),
                emitter: Emitter::default(),
                state: Cell::new(SyncState::Idle),
                bubbling: Cell::new(schema.bubbling_change_event()),
            }),
        };

        if let Some(parent) = parent {
            entity.link_parent(parent, Some(attrs));
        }
        entity.wire_related();
        if let Some(handler) = schema.handler().cloned() {
            handler.on_initialize(&entity);
        }
        entity
    }

    pub(crate) fn from_inner(inner: Rc<EntityInner>) -> Self {
        Self { inner }
    }

    // ── Introspection ────────────────────────────────────────────

    /// Identity of this entity, stable for its lifetime.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The schema this entity was built from.
    #[must_use]
    pub fn schema(&self) -> &Rc<EntitySchema> {
        &self.inner.schema
    }

    /// The entity whose raw storage this entity mirrors into. Collection
    /// elements report the collection's parent.
    #[must_use]
    pub fn parent(&self) -> Option<Entity> {
        self.inner
            .link
            .borrow()
            .as_ref()
            .and_then(|link| link.parent.upgrade())
            .map(Entity::from_inner)
    }

    /// The raw object this entity mirrors into its parent.
    #[must_use]
    pub fn source(&self) -> Option<RawObject> {
        self.inner.link.borrow().as_ref().map(|link| link.source.clone())
    }

    /// The first collection this entity joined that still contains it.
    #[must_use]
    pub fn collection(&self) -> Option<Collection> {
        self.collections().into_iter().next()
    }

    /// Every collection that contains this entity, in joining order.
    #[must_use]
    pub fn collections(&self) -> Vec<Collection> {
        self.inner
            .collections
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(Collection::from_inner)
            .collect()
    }

    /// `Syncing` while a sync call on this entity is in flight.
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

    /// Links this entity under `parent` with `source` as its mirrored raw
    /// object (a fresh empty object if `None`).
    ///
    /// Returns false and changes nothing if the entity already has a live
    /// parent.
    pub fn link_parent(&self, parent: &Entity, source: Option<RawObject>) -> bool {
        if self.parent().is_some() {
            return false;
        }
        *self.inner.link.borrow_mut() = Some(EntityLink {
            parent: Rc::downgrade(&parent.inner),
            source: source.unwrap_or_default(),
        });
        true
    }

    pub(crate) fn unlink(&self) {
        self.inner.link.borrow_mut().take();
    }

    /// Registers `collection` as a receiver of this entity's events.
    /// Returns false if it already was one.
    pub(crate) fn join_collection(&self, collection: &Rc<CollectionInner>) -> bool {
        let mut collections = self.inner.collections.borrow_mut();
        collections.retain(|weak| weak.strong_count() > 0);
        if collections
            .iter()
            .any(|weak| std::ptr::eq(weak.as_ptr(), Rc::as_ptr(collection)))
        {
            return false;
        }
        collections.push(Rc::downgrade(collection));
        true
    }

    /// Returns false if `collection` was not a receiver.
    pub(crate) fn leave_collection(&self, collection: &Rc<CollectionInner>) -> bool {
        let mut collections = self.inner.collections.borrow_mut();
        let before = collections.len();
        collections.retain(|weak| !std::ptr::eq(weak.as_ptr(), Rc::as_ptr(collection)));
        collections.len() != before
    }

    fn set_source(&self, source: RawObject) {
        if let Some(link) = self.inner.link.borrow_mut().as_mut() {
            link.source = source;
        }
    }

    // ── Relation resolver ────────────────────────────────────────

    /// The attribute under which this entity holds `child`, if any.
    pub fn get_relation(&self, child: &Node) -> Option<String> {
        self.relation_of(child.id())
    }

    pub(crate) fn relation_of(&self, id: NodeId) -> Option<String> {
        self.inner.relations.borrow().key_of(id)
    }

    /// The child wired under `attr`.
    pub fn related(&self, attr: &str) -> Option<Node> {
        self.inner.relations.borrow().child(attr)
    }

    pub fn related_entity(&self, attr: &str) -> Option<Entity> {
        self.related(attr).and_then(|node| node.as_entity().cloned())
    }

    pub fn related_collection(&self, attr: &str) -> Option<Collection> {
        self.related(attr).and_then(|node| node.as_collection().cloned())
    }

    /// All wired children with their attribute names, in wiring order.
    pub fn related_children(&self) -> Vec<(String, Node)> {
        self.inner.relations.borrow().children()
    }

    // ── Attributes ───────────────────────────────────────────────

    /// The raw value of `key`. Containers are returned as shared handles.
    pub fn get(&self, key: &str) -> Option<RawValue> {
        self.inner.attributes.borrow().get(key).cloned()
    }

    pub fn get_json(&self, key: &str) -> Option<Value> {
        self.get(key).map(|value| value.to_json())
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner
            .attributes
            .borrow()
            .get(key)
            .is_some_and(|value| !value.is_null())
    }

    /// Snapshot of the attribute map.
    pub fn attributes(&self) -> BTreeMap<String, RawValue> {
        self.inner.attributes.borrow().clone()
    }

    /// Extract a string value using a JSON pointer (e.g., "/reception/name").
    pub fn get_str(&self, pointer: &str) -> Option<String> {
        self.to_json()
            .pointer(pointer)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Extract a boolean value using a JSON pointer.
    pub fn get_bool(&self, pointer: &str) -> Option<bool> {
        self.to_json().pointer(pointer).and_then(|v| v.as_bool())
    }

    /// Extract a numeric value using a JSON pointer.
    pub fn get_number(&self, pointer: &str) -> Option<f64> {
        self.to_json().pointer(pointer).and_then(|v| v.as_f64())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.set_with(key, value, SetOptions::default());
    }

    pub fn set_with(&self, key: impl Into<String>, value: impl Into<RawValue>, opts: SetOptions) {
        self.apply(vec![(key.into(), Some(value.into()))], opts);
    }

    /// Sets every key of a JSON object.
    pub fn set_many(&self, attrs: Value) -> SyncResult<()> {
        self.set_many_with(attrs, SetOptions::default())
    }

    pub fn set_many_with(&self, attrs: Value, opts: SetOptions) -> SyncResult<()> {
        let attrs = RawValue::from(attrs).into_object()?;
        let updates = attrs
            .entries()
            .into_iter()
            .map(|(key, value)| (key, Some(value)))
            .collect();
        self.apply(updates, opts);
        Ok(())
    }

    pub fn unset(&self, key: &str) {
        self.unset_with(key, SetOptions::default());
    }

    pub fn unset_with(&self, key: &str, opts: SetOptions) {
        self.apply(vec![(key.to_string(), None)], opts);
    }

    /// Replaces the whole attribute set: keys missing from `entries` are
    /// removed.
    pub(crate) fn replace_attributes(&self, entries: BTreeMap<String, RawValue>, opts: SetOptions) {
        let removed: Vec<(String, Option<RawValue>)> = self
            .inner
            .attributes
            .borrow()
            .keys()
            .filter(|key| !entries.contains_key(*key))
            .map(|key| (key.clone(), None))
            .collect();
        let updates = removed
            .into_iter()
            .chain(entries.into_iter().map(|(key, value)| (key, Some(value))))
            .collect();
        self.apply(updates, opts);
    }

    /// Stores every update, then fires `change:<key>` for each key whose
    /// value is not structurally equal to the old one, then `change` once.
    ///
    /// Updates are always stored, so an equal-but-distinct container
    /// replaces the old handle without any event.
    fn apply(&self, updates: Vec<(String, Option<RawValue>)>, opts: SetOptions) {
        let mut changed = Vec::new();
        {
            let mut attributes = self.inner.attributes.borrow_mut();
            for (key, value) in updates {
                let differs = match (attributes.get(&key), &value) {
                    (Some(current), Some(next)) => current != next,
                    (None, None) => false,
                    _ => true,
                };
                if differs {
                    changed.push(key.clone());
                }
                match value {
                    Some(value) => {
                        attributes.insert(key, value);
                    }
                    None => {
                        attributes.remove(&key);
                    }
                }
            }
        }

        if opts.silent || changed.is_empty() {
            return;
        }
        for key in changed {
            self.trigger(EventKind::ChangeField(key));
        }
        self.trigger(EventKind::Change);
    }

    // ── Events ───────────────────────────────────────────────────

    /// Subscribes to one event name.
    pub fn on(&self, kind: EventKind, callback: impl Fn(&Event) + 'static) -> ListenerId {
        self.inner.emitter.subscribe(Some(kind), Rc::new(callback))
    }

    /// Subscribes to every event.
    pub fn on_all(&self, callback: impl Fn(&Event) + 'static) -> ListenerId {
        self.inner.emitter.subscribe(None, Rc::new(callback))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.emitter.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.emitter.len()
    }

    /// Fires `kind` on this entity: listeners first, then the sync hooks,
    /// then every containing collection in joining order.
    pub fn trigger(&self, kind: EventKind) {
        let event = Event {
            kind,
            target: Node::Entity(self.clone()),
        };
        self.inner.emitter.emit(&event);
        self.run_sync_hooks(&event.kind);
        for collection in self.collections() {
            collection.forward_element_event(&event);
        }
    }

    fn run_sync_hooks(&self, kind: &EventKind) {
        match kind {
            EventKind::ChangeField(attr) => {
                let child = self.related(attr);
                if let Some(child) = child {
                    child.sync_down(self.get(attr).unwrap_or_default());
                }
            }
            EventKind::Change => self.sync_up(SyncOptions::default()),
            _ => {}
        }
    }

    // ── Sync ─────────────────────────────────────────────────────

    /// Mirrors the attributes into the parent's raw storage.
    ///
    /// No-op when unlinked, when a sync is already in flight on this entity,
    /// or when the parent has not related this entity under any attribute.
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

        let attributes = self.attributes();
        let source = match parent.get(&field) {
            Some(RawValue::Object(current)) => {
                if self.source().is_none_or(|source| !source.ptr_eq(&current)) {
                    debug!(node = %self.id(), field = %field, "source drifted from parent, re-pointing");
                    self.set_source(current.clone());
                }
                current
            }
            current => {
                if attributes.is_empty() && current.as_ref().is_none_or(RawValue::is_null) {
                    return;
                }
                let source = self.source().unwrap_or_default();
                parent
                    .inner
                    .attributes
                    .borrow_mut()
                    .insert(field.clone(), RawValue::Object(source.clone()));
                source
            }
        };
        source.mirror(&attributes);

        if self.bubbling_change_event() && !opts.silent {
            parent.trigger(EventKind::ChangeField(field));
            parent.trigger(EventKind::Change);
        }
    }

    /// Takes `value` as the new source and overwrites the attribute set with
    /// its entries. A non-object value clears the entity.
    pub fn sync_down(&self, value: RawValue) {
        if self.parent().is_none() {
            return;
        }
        let Some(_guard) = SyncGuard::acquire(&self.inner.state) else {
            trace!(node = %self.id(), "dropping re-entrant sync_down");
            return;
        };

        let source = match value {
            RawValue::Object(object) => object,
            other => {
                debug!(node = %self.id(), found = other.kind(), "sync_down with non-object, clearing");
                RawObject::new()
            }
        };
        self.set_source(source.clone());
        self.replace_attributes(source.entries(), SetOptions::default());
    }

    // ── Serialization ────────────────────────────────────────────

    /// Deep plain-JSON projection of the attributes.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.inner
                .attributes
                .borrow()
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }

    /// New raw object holding the current attributes. Nested containers are
    /// shared, so sources further down keep their identity.
    pub fn to_raw(&self) -> RawValue {
        RawValue::Object(RawObject::from_entries(self.attributes()))
    }
}

impl Hierarchical for Entity {
    fn id(&self) -> NodeId {
        Entity::id(self)
    }

    fn parent(&self) -> Option<Entity> {
        Entity::parent(self)
    }

    fn sync_state(&self) -> SyncState {
        Entity::sync_state(self)
    }

    fn bubbling_change_event(&self) -> bool {
        Entity::bubbling_change_event(self)
    }

    fn set_bubbling_change_event(&self, bubbling: bool) {
        Entity::set_bubbling_change_event(self, bubbling)
    }

    fn sync_up(&self, opts: SyncOptions) {
        Entity::sync_up(self, opts)
    }

    fn sync_down(&self, value: RawValue) {
        Entity::sync_down(self, value)
    }

    fn to_json(&self) -> Value {
        Entity::to_json(self)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.inner.id)
            .field("schema", &self.inner.schema.name())
            .field("attributes", &self.to_json())
            .finish()
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let attributes = self.inner.attributes.borrow();
        let mut state = serializer.serialize_map(Some(attributes.len()))?;
        for (key, value) in attributes.iter() {
            state.serialize_entry(key, value)?;
        }
        state.end()
    }
}
