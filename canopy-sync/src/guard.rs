//! Re-entrancy guard for sync entry points.
//!
//! Every node carries a [`SyncState`]. A sync call acquires the node by
//! moving it from `Idle` to `Syncing`; the returned [`SyncGuard`] moves it
//! back when dropped, on normal return and during unwinding alike. A call
//! that finds the node already `Syncing` is the echo of the cascade the
//! first call started and is dropped.

use std::cell::Cell;

/// Whether a node has a sync in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

/// Scoped hold on a node's [`SyncState`].
#[must_use]
pub(crate) struct SyncGuard<'a> {
    state: &'a Cell<SyncState>,
}

impl<'a> SyncGuard<'a> {
    /// Returns `None` if a sync is already in flight on this node.
    pub(crate) fn acquire(state: &'a Cell<SyncState>) -> Option<Self> {
        match state.get() {
            SyncState::Syncing => None,
            SyncState::Idle => {
                state.set(SyncState::Syncing);
                Some(Self { state })
            }
        }
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.state.set(SyncState::Idle);
    }
}
