//! Change coalescing for flush windows.
//!
//! Bursts of events arriving within one flush window are buffered in a
//! pending batch keyed by object, so the snapshot is recomputed once per
//! window instead of once per event. Later events for the same key
//! overwrite earlier ones; arrival order wins, regardless of kind, so an
//! add followed by a delete inside one window resolves to the delete.
//!
//! The batcher is a plain container; the view core serializes access and
//! owns the flush/arming protocol. Only the timer handle lives here so a
//! cancel discards both the window and its pending events in one step.

use fxhash::FxHashMap;

use crate::event::{ChangeEvent, ObjectKey};
use crate::timer::TimerHandle;

// ---------------------------------------------------------------------------
// ChangeBatcher
// ---------------------------------------------------------------------------

/// Coalesces change events into one pending batch per flush window.
///
/// At most one entry per key; [`drain`](ChangeBatcher::drain) empties the
/// batch atomically when the window's timer fires, and
/// [`cancel`](ChangeBatcher::cancel) discards the window entirely, pending
/// events included (the transport redelivers current state when a source
/// is re-subscribed).
#[derive(Debug, Default)]
pub struct ChangeBatcher {
    pending: FxHashMap<ObjectKey, ChangeEvent>,
    timer: Option<TimerHandle>,
}

impl ChangeBatcher {
    /// Creates an empty batcher with no armed timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `event` in the pending batch, overwriting any earlier event
    /// for the same key.
    pub fn record(&mut self, event: ChangeEvent) {
        self.pending.insert(event.key().clone(), event);
    }

    /// Returns `true` if a flush timer is currently armed.
    #[must_use]
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Arms the flush timer for the current window.
    ///
    /// The caller arms at most one timer per window (checked via
    /// [`timer_armed`](ChangeBatcher::timer_armed) under its own lock).
    /// Arming over an existing handle cancels the replaced timer.
    pub fn arm(&mut self, handle: TimerHandle) {
        if let Some(old) = self.timer.replace(handle) {
            old.cancel();
        }
    }

    /// Drains all pending events and disarms the timer.
    ///
    /// Called when the window's timer fires; the fired timer's handle is
    /// simply dropped.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        self.timer = None;
        self.pending.drain().map(|(_, event)| event).collect()
    }

    /// Discards the pending batch and cancels any armed timer without
    /// flushing.
    pub fn cancel(&mut self) {
        self.pending.clear();
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    /// Returns the number of keys with a pending event.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
