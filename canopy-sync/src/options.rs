//! Per-call options for mutation, sync and persistence.

use crate::error::SyncError;
use crate::node::Node;

/// Options for `set`, `unset`, `add`, `remove` and `reset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Mutate without emitting events. Silent mutations do not propagate.
    pub silent: bool,
}

impl SetOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

/// Options for an upward sync.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Write into the parent's raw storage but emit nothing on the parent.
    pub silent: bool,
}

impl SyncOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

type SuccessCallback = Box<dyn FnOnce(&Node)>;
type ErrorCallback = Box<dyn FnOnce(&SyncError)>;

/// Options for `save`.
///
/// Callbacks belong to the call that reaches a persister. When a related
/// child forwards its save to its parent the callbacks are stripped, so the
/// root's completion governs the whole tree.
#[derive(Default)]
pub struct SaveOptions {
    /// Apply the attributes passed to `save` silently.
    pub silent: bool,
    pub on_success: Option<SuccessCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl SaveOptions {
    pub fn on_success(mut self, callback: impl FnOnce(&Node) + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(&SyncError) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Copy of these options without the callbacks.
    pub fn stripped(&self) -> Self {
        Self {
            silent: self.silent,
            on_success: None,
            on_error: None,
        }
    }

    pub fn has_callbacks(&self) -> bool {
        self.on_success.is_some() || self.on_error.is_some()
    }
}
