//! Synchronous, name-keyed event emission.
//!
//! This is the observable primitive every Entity and Collection carries.
//! Listeners run immediately, in registration order, on the caller's stack.
//! The listener list is snapshotted before dispatch so a listener may
//! subscribe, unsubscribe, or mutate the emitting node without tripping a
//! `RefCell` borrow.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::node::{Hierarchical, Node};

/// The name of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Generic change, fired once per mutation after all field events.
    Change,
    /// Change of one named attribute (`change:<name>`).
    ChangeField(String),
    /// An element was added to a Collection.
    Add,
    /// An element was removed from a Collection.
    Remove,
    /// A Collection's contents were replaced wholesale.
    Reset,
}

impl EventKind {
    /// Shorthand for `ChangeField`.
    pub fn field(name: impl Into<String>) -> Self {
        Self::ChangeField(name.into())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Change => write!(f, "change"),
            Self::ChangeField(name) => write!(f, "change:{name}"),
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// A dispatched event.
///
/// `target` is the node the event concerns: the node itself for its own
/// change events, the element for `add`/`remove` and for element events
/// forwarded to a Collection, the Collection for `reset`.
#[derive(Clone)]
pub struct Event {
    pub kind: EventKind,
    pub target: Node,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("target", &self.target.id())
            .finish()
    }
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Rc<dyn Fn(&Event)>;

struct Listener {
    id: ListenerId,
    /// `None` subscribes to every event.
    filter: Option<EventKind>,
    callback: Callback,
}

/// Per-node listener registry.
#[derive(Default)]
pub(crate) struct Emitter {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<Listener>>,
}

impl Emitter {
    pub(crate) fn subscribe(&self, filter: Option<EventKind>, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            filter,
            callback,
        });
        id
    }

    /// Returns true if a listener was removed.
    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    pub(crate) fn emit(&self, event: &Event) {
        let matching: Vec<Callback> = self
            .listeners
            .borrow()
            .iter()
            .filter(|listener| listener.filter.as_ref().is_none_or(|kind| *kind == event.kind))
            .map(|listener| Rc::clone(&listener.callback))
            .collect();
        for callback in matching {
            callback(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.borrow().len()
    }
}
