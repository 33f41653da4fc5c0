//! Time-varying values.
//!
//! A [`Watchable`] keeps track of a value which may change over time and
//! notifies registered observers of changes. Only the most recent value is
//! available; observers that need history must capture it themselves.
//!
//! Hosts with their own reactivity primitive implement [`Watch`] instead;
//! the engine only requires the get / on-change / unsubscribe contract.
//! Notifications fire on every `set`, including sets of a value that
//! compares equal to the previous one: host primitives are imprecise in
//! exactly this way, and consumers dedup by value where it matters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fxhash::FxHashMap;
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

/// Change-notification callback. Invoked on the thread that performed the
/// mutation; implementations re-read the current value via [`Watch::get`].
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// A readable value that can notify observers when it changes.
pub trait Watch<T>: Send + Sync {
    /// Returns a clone of the current value.
    fn get(&self) -> T;

    /// Registers a change observer.
    ///
    /// The observer is called after each subsequent mutation until the
    /// returned guard is dropped or explicitly unsubscribed.
    fn on_change(&self, callback: ChangeCallback) -> WatchGuard;
}

// ---------------------------------------------------------------------------
// WatchGuard
// ---------------------------------------------------------------------------

/// Subscription guard returned by [`Watch::on_change`].
///
/// Dropping the guard deregisters the observer.
pub struct WatchGuard {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchGuard {
    /// Wraps a deregistration closure into a guard.
    #[must_use]
    pub fn new(unsubscribe: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            unsubscribe: Some(unsubscribe),
        }
    }

    /// Deregisters the observer now instead of at drop time.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGuard").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Watchable
// ---------------------------------------------------------------------------

struct WatchShared<T> {
    value: Mutex<T>,
    observers: Mutex<FxHashMap<u64, ChangeCallback>>,
    next_id: AtomicU64,
}

/// The built-in [`Watch`] implementation.
///
/// Cheap to clone; all clones share the same underlying value and observer
/// set, so a producer holds one clone and sets while consumers watch
/// another.
pub struct Watchable<T> {
    shared: Arc<WatchShared<T>>,
}

impl<T> Clone for Watchable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Watchable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchable")
            .field("value", &*self.shared.value.lock())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Watchable<T> {
    /// Creates a watchable holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(WatchShared {
                value: Mutex::new(value),
                observers: Mutex::new(FxHashMap::default()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Replaces the value and notifies every observer.
    ///
    /// Observers run on the calling thread, after the value lock is
    /// released, so they may call [`get`](Watchable::get) or register
    /// further observers.
    pub fn set(&self, value: T) {
        *self.shared.value.lock() = value;
        let observers: Vec<ChangeCallback> =
            self.shared.observers.lock().values().cloned().collect();
        for observer in observers {
            observer();
        }
    }

    /// Returns a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.shared.value.lock().clone()
    }
}

impl<T: Clone + Send + Sync + 'static> Watch<T> for Watchable<T> {
    fn get(&self) -> T {
        self.shared.value.lock().clone()
    }

    fn on_change(&self, callback: ChangeCallback) -> WatchGuard {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.observers.lock().insert(id, callback);

        let weak: Weak<WatchShared<T>> = Arc::downgrade(&self.shared);
        WatchGuard::new(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.observers.lock().remove(&id);
            }
        }))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
