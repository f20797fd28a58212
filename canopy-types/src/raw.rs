//! Shared raw storage.
//!
//! A hierarchy mirrors its state into a tree of raw values. Objects and
//! arrays in that tree are reference-counted handles: cloning a handle
//! aliases the same storage, and `ptr_eq` tells whether two handles are the
//! same storage rather than merely equal content. Equality (`==`) is always
//! structural.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Map, Number, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::{Error, Result};

/// A raw JSON-like value whose containers are shared handles.
#[derive(Debug, Clone, Default)]
pub enum RawValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Object(RawObject),
    Array(RawArray),
}

impl RawValue {
    /// Parses a JSON document into fresh raw storage.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from(value))
    }

    /// Short name of the variant, used in shape errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_object(&self) -> Option<&RawObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&RawArray> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Converts into an object handle. `Null` becomes a fresh empty object.
    pub fn into_object(self) -> Result<RawObject> {
        match self {
            Self::Object(object) => Ok(object),
            Self::Null => Ok(RawObject::new()),
            other => Err(Error::UnexpectedShape {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    /// Converts into an array handle. `Null` becomes a fresh empty array.
    pub fn into_array(self) -> Result<RawArray> {
        match self {
            Self::Array(array) => Ok(array),
            Self::Null => Ok(RawArray::new()),
            other => Err(Error::UnexpectedShape {
                expected: "array",
                found: other.kind(),
            }),
        }
    }

    /// Returns true if both values are handles to the same container.
    /// Scalars never share storage.
    pub fn same_storage(&self, other: &RawValue) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Copies the outermost container into new storage; nested containers
    /// stay shared with the original.
    pub fn shallow_copy(&self) -> RawValue {
        match self {
            Self::Object(object) => Self::Object(object.shallow_copy()),
            Self::Array(array) => Self::Array(array.shallow_copy()),
            scalar => scalar.clone(),
        }
    }

    /// Deep conversion into a plain `serde_json::Value`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Object(object) => object.to_json(),
            Self::Array(array) => array.to_json(),
        }
    }
}

impl PartialEq for RawValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Object(map) => Self::Object(RawObject::from(map)),
            Value::Array(items) => Self::Array(RawArray::from(items)),
        }
    }
}

impl From<&RawValue> for Value {
    fn from(value: &RawValue) -> Self {
        value.to_json()
    }
}

impl From<RawObject> for RawValue {
    fn from(object: RawObject) -> Self {
        Self::Object(object)
    }
}

impl From<RawArray> for RawValue {
    fn from(array: RawArray) -> Self {
        Self::Array(array)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for RawValue {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl Serialize for RawValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Object(object) => object.serialize(serializer),
            Self::Array(array) => array.serialize(serializer),
        }
    }
}

// ── RawObject ────────────────────────────────────────────────────

/// Shared, mutable string-keyed storage.
#[derive(Debug, Clone, Default)]
pub struct RawObject(Rc<RefCell<BTreeMap<String, RawValue>>>);

impl RawObject {
    /// Creates new, empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates new storage holding `entries`.
    pub fn from_entries(entries: BTreeMap<String, RawValue>) -> Self {
        Self(Rc::new(RefCell::new(entries)))
    }

    /// Returns true if both handles point at the same storage.
    pub fn ptr_eq(&self, other: &RawObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, key: &str) -> Option<RawValue> {
        self.0.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<RawValue>) -> Option<RawValue> {
        self.0.borrow_mut().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<RawValue> {
        self.0.borrow_mut().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Snapshot of the entries. Container values are handles, not copies.
    pub fn entries(&self) -> BTreeMap<String, RawValue> {
        self.0.borrow().clone()
    }

    /// New storage with the same entries (nested containers shared).
    pub fn shallow_copy(&self) -> RawObject {
        Self::from_entries(self.entries())
    }

    /// Rewrites this storage in place so that it holds exactly `entries`.
    /// The handle identity is preserved.
    pub fn mirror(&self, entries: &BTreeMap<String, RawValue>) {
        let mut map = self.0.borrow_mut();
        map.retain(|key, _| entries.contains_key(key));
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .0
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl PartialEq for RawObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0.borrow() == *other.0.borrow()
    }
}

impl From<Map<String, Value>> for RawObject {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_entries(
            map.into_iter()
                .map(|(key, value)| (key, RawValue::from(value)))
                .collect(),
        )
    }
}

impl Serialize for RawObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let map = self.0.borrow();
        let mut state = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map.iter() {
            state.serialize_entry(key, value)?;
        }
        state.end()
    }
}

// ── RawArray ─────────────────────────────────────────────────────

/// Shared, mutable ordered storage.
#[derive(Debug, Clone, Default)]
pub struct RawArray(Rc<RefCell<Vec<RawValue>>>);

impl RawArray {
    /// Creates new, empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates new storage holding `items`.
    pub fn from_items(items: Vec<RawValue>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    /// Returns true if both handles point at the same storage.
    pub fn ptr_eq(&self, other: &RawArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, index: usize) -> Option<RawValue> {
        self.0.borrow().get(index).cloned()
    }

    pub fn push(&self, value: impl Into<RawValue>) {
        self.0.borrow_mut().push(value.into());
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Snapshot of the items. Container values are handles, not copies.
    pub fn items(&self) -> Vec<RawValue> {
        self.0.borrow().clone()
    }

    /// New storage with the same items (nested containers shared).
    pub fn shallow_copy(&self) -> RawArray {
        Self::from_items(self.items())
    }

    /// Truncates this storage to zero and appends `items`, keeping the
    /// handle identity.
    pub fn replace_contents(&self, items: Vec<RawValue>) {
        let mut vec = self.0.borrow_mut();
        vec.clear();
        vec.extend(items);
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.0.borrow().iter().map(RawValue::to_json).collect())
    }
}

impl PartialEq for RawArray {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0.borrow() == *other.0.borrow()
    }
}

impl From<Vec<Value>> for RawArray {
    fn from(items: Vec<Value>) -> Self {
        Self::from_items(items.into_iter().map(RawValue::from).collect())
    }
}

impl Serialize for RawArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let items = self.0.borrow();
        let mut state = serializer.serialize_seq(Some(items.len()))?;
        for item in items.iter() {
            state.serialize_element(item)?;
        }
        state.end()
    }
}
