//! Views — the caller-facing live projection of the snapshot.
//!
//! A [`ViewHandle`] owns one snapshot store, one change batcher, one flush
//! timer, and (through its source watcher) one session per current source.
//! All mutable state sits behind a single mutex in the internal view core,
//! so transport callbacks, pull drain tasks, and timer fires serialize
//! without the caller being aware of any of them.
//!
//! # Lifecycle
//!
//! `Initializing → Active → Disposed`. Opening a view starts the initial
//! sessions; the steady state is flush cycles plus occasional source-set
//! diffs; [`ViewHandle::dispose`] is terminal. Disposal is synchronous from
//! the caller's point of view: the liveness flag flips under the state
//! mutex before `dispose()` returns, so an in-flight transport event can
//! never mutate the snapshot afterwards, even though transport-side
//! cancellation completes asynchronously.
//!
//! # Usage
//!
//! ```rust,ignore
//! let transport = Arc::new(MemTransport::new());
//! let view = open_view(transport, "chat-room", ViewConfig::default())?;
//!
//! // ... events arrive and flush on the configured interval ...
//! for object in view.values() {
//!     render(object);
//! }
//!
//! view.dispose();
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::batcher::ChangeBatcher;
use crate::config::ViewConfig;
use crate::event::{ChangeEvent, ObjectKey, ObjectValue};
use crate::source::{SourceId, SourceSpec};
use crate::store::SnapshotStore;
use crate::timer::{FlushScheduler, TokioScheduler};
use crate::transport::{Transport, TransportError};
use crate::watcher::SourceWatcher;

// ---------------------------------------------------------------------------
// ViewError
// ---------------------------------------------------------------------------

/// View-level failures.
///
/// Per-source delivery failures are *not* view errors; a failed source
/// simply stops updating. Only the inability to open a requested session
/// is surfaced here, because the view cannot honestly represent its source
/// set without it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ViewError {
    /// A session for a requested source could not be opened.
    #[error("failed to open subscription for source {source}: {cause}")]
    SessionOpen {
        /// The source the session was for.
        source: SourceId,
        /// The transport's refusal.
        #[source]
        cause: TransportError,
    },
}

// ---------------------------------------------------------------------------
// ViewMetrics
// ---------------------------------------------------------------------------

/// Atomic counters for one view.
#[derive(Debug, Default)]
pub struct ViewMetrics {
    /// Events accepted into the pending batch.
    pub(crate) events_recorded: AtomicU64,
    /// Events discarded because their session was closed or the view
    /// disposed.
    pub(crate) events_discarded: AtomicU64,
    /// Malformed wire events rejected at the session boundary.
    pub(crate) malformed_events: AtomicU64,
    /// Flush windows applied to the snapshot.
    pub(crate) flushes: AtomicU64,
    /// Full resets triggered by source-set changes.
    pub(crate) resets: AtomicU64,
    /// Sessions opened over the view's lifetime.
    pub(crate) sessions_opened: AtomicU64,
    /// Sessions closed over the view's lifetime.
    pub(crate) sessions_closed: AtomicU64,
}

impl ViewMetrics {
    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> ViewMetricsSnapshot {
        ViewMetricsSnapshot {
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            malformed_events: self.malformed_events.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a view's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewMetricsSnapshot {
    /// Events accepted into the pending batch.
    pub events_recorded: u64,
    /// Events discarded after session close or disposal.
    pub events_discarded: u64,
    /// Malformed wire events rejected and dropped.
    pub malformed_events: u64,
    /// Flush windows applied to the snapshot.
    pub flushes: u64,
    /// Full resets triggered by source-set changes.
    pub resets: u64,
    /// Sessions opened over the view's lifetime.
    pub sessions_opened: u64,
    /// Sessions closed over the view's lifetime.
    pub sessions_closed: u64,
}

// ---------------------------------------------------------------------------
// ViewCore
// ---------------------------------------------------------------------------

struct ViewState {
    batcher: ChangeBatcher,
    store: SnapshotStore,
    epoch: u64,
    live: bool,
}

/// Shared mutable heart of a view.
///
/// Sessions, the watcher, and flush timers all hold an `Arc` to the core;
/// the single mutex over [`ViewState`] is the serialization point for
/// every mutation. Timer callbacks capture the epoch they were armed
/// under and no-op if a reset or disposal bumped it since.
pub(crate) struct ViewCore {
    state: Mutex<ViewState>,
    scheduler: Arc<dyn FlushScheduler>,
    flush_interval: Duration,
    metrics: Arc<ViewMetrics>,
    error: Mutex<Option<ViewError>>,
    /// Self-reference handed to flush-timer closures.
    weak: Weak<ViewCore>,
}

impl ViewCore {
    pub(crate) fn new(flush_interval: Duration, scheduler: Arc<dyn FlushScheduler>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(ViewState {
                batcher: ChangeBatcher::new(),
                store: SnapshotStore::new(),
                epoch: 0,
                live: true,
            }),
            scheduler,
            flush_interval,
            metrics: Arc::new(ViewMetrics::default()),
            error: Mutex::new(None),
            weak: weak.clone(),
        })
    }

    /// Records one validated event, arming the flush timer if this is the
    /// first event of the window.
    ///
    /// `gate` is the recording session's liveness flag, re-checked under
    /// the state lock: an in-flight event from a session closed during a
    /// source-set change can never land after the reset that followed.
    pub(crate) fn record(&self, gate: &AtomicBool, event: ChangeEvent) {
        let mut state = self.state.lock();
        if !state.live || !gate.load(Ordering::SeqCst) {
            self.metrics.events_discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        state.batcher.record(event);
        self.metrics.events_recorded.fetch_add(1, Ordering::Relaxed);

        if !state.batcher.timer_armed() {
            let epoch = state.epoch;
            if let Some(core) = self.weak.upgrade() {
                let handle = self
                    .scheduler
                    .schedule(self.flush_interval, Box::new(move || core.flush(epoch)));
                state.batcher.arm(handle);
            }
        }
    }

    /// Applies the pending batch to the snapshot. No-op if the view was
    /// disposed or the epoch advanced since the timer was armed.
    fn flush(&self, epoch: u64) {
        let mut state = self.state.lock();
        if !state.live || state.epoch != epoch {
            return;
        }
        let drained = state.batcher.drain();
        if drained.is_empty() {
            return;
        }
        let applied = drained.len();
        for event in drained {
            state.store.apply(event);
        }
        self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(events = applied, "applied flush window");
    }

    /// Clears the snapshot and pending state and bumps the epoch, so the
    /// view is rebuilt from whatever the new source set delivers.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        if !state.live {
            return;
        }
        state.epoch += 1;
        state.batcher.cancel();
        state.store.clear();
        self.metrics.resets.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("snapshot reset for new source set");
    }

    /// Flips the liveness flag and cancels any pending flush without
    /// applying it. Returns `false` if already disposed.
    pub(crate) fn dispose(&self) -> bool {
        let mut state = self.state.lock();
        if !state.live {
            return false;
        }
        state.live = false;
        state.epoch += 1;
        state.batcher.cancel();
        true
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state.lock().live
    }

    pub(crate) fn values(&self) -> Vec<ObjectValue> {
        self.state.lock().store.values()
    }

    pub(crate) fn keys(&self) -> Vec<ObjectKey> {
        self.state.lock().store.keys()
    }

    pub(crate) fn get(&self, key: &ObjectKey) -> Option<ObjectValue> {
        self.state.lock().store.get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().store.len()
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.state.lock().batcher.pending_len()
    }

    pub(crate) fn metrics(&self) -> &Arc<ViewMetrics> {
        &self.metrics
    }

    pub(crate) fn set_error(&self, error: ViewError) {
        *self.error.lock() = Some(error);
    }

    pub(crate) fn error(&self) -> Option<ViewError> {
        self.error.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// ViewHandle
// ---------------------------------------------------------------------------

/// A live, read-only projection of one view's snapshot.
///
/// Reads never fail; after [`dispose`](ViewHandle::dispose) they return
/// the frozen final contents. Dropping the handle disposes the view.
pub struct ViewHandle {
    core: Arc<ViewCore>,
    watcher: Arc<SourceWatcher>,
    disposed: AtomicBool,
}

impl ViewHandle {
    /// Returns a clone of every object currently in the view, in key
    /// order. Callers must not depend on the ordering.
    #[must_use]
    pub fn values(&self) -> Vec<ObjectValue> {
        self.core.values()
    }

    /// Returns every key currently in the view.
    #[must_use]
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.core.keys()
    }

    /// Returns the object stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<ObjectValue> {
        self.core.get(key)
    }

    /// Returns the number of objects in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns `true` if the view holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`dispose`](ViewHandle::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Returns the most recent view-level error, if any.
    ///
    /// Set when a session could not be opened during a source-set change;
    /// per-source delivery failures do not appear here.
    #[must_use]
    pub fn error(&self) -> Option<ViewError> {
        self.core.error()
    }

    /// Returns a point-in-time copy of the view's counters.
    #[must_use]
    pub fn metrics(&self) -> ViewMetricsSnapshot {
        self.core.metrics().snapshot()
    }

    /// Tears the view down: closes every session, stops watching source
    /// cells, and cancels any pending flush without applying it.
    ///
    /// Idempotent: a second call is a no-op. After this returns, no
    /// transport event mutates the snapshot and `values()` stays frozen.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.core.dispose();
        self.watcher.teardown();
        tracing::debug!("view disposed");
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewHandle")
            .field("len", &self.len())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// open_view
// ---------------------------------------------------------------------------

/// Opens a live view over `spec`, flushing on the tokio timer.
///
/// # Errors
///
/// [`ViewError::SessionOpen`] if any initial session cannot be opened; no
/// sessions are leaked in that case.
///
/// # Panics
///
/// Panics if called outside a tokio runtime context (the runtime handle is
/// captured so transport callbacks arriving on foreign threads can still
/// spawn timers and drain tasks).
pub fn open_view(
    transport: Arc<dyn Transport>,
    spec: impl Into<SourceSpec>,
    config: ViewConfig,
) -> Result<ViewHandle, ViewError> {
    open_view_with_scheduler(transport, spec, config, Arc::new(TokioScheduler::new()))
}

/// Opens a live view with an explicit flush scheduler.
///
/// Use [`crate::timer::ManualScheduler`] in tests to drive flush windows
/// with a virtual clock.
///
/// # Errors
///
/// [`ViewError::SessionOpen`] if any initial session cannot be opened.
///
/// # Panics
///
/// Panics if called outside a tokio runtime context.
pub fn open_view_with_scheduler(
    transport: Arc<dyn Transport>,
    spec: impl Into<SourceSpec>,
    config: ViewConfig,
    scheduler: Arc<dyn FlushScheduler>,
) -> Result<ViewHandle, ViewError> {
    let runtime = tokio::runtime::Handle::current();
    let core = ViewCore::new(config.flush_interval, scheduler);
    let watcher = SourceWatcher::open(
        Arc::clone(&core),
        transport,
        spec.into(),
        config,
        runtime,
    )?;
    Ok(ViewHandle {
        core,
        watcher,
        disposed: AtomicBool::new(false),
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    use crate::timer::ManualScheduler;

    fn core_with_manual() -> (Arc<ViewCore>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let core = ViewCore::new(
            Duration::from_millis(100),
            Arc::clone(&scheduler) as Arc<dyn FlushScheduler>,
        );
        (core, scheduler)
    }

    fn open_gate() -> AtomicBool {
        AtomicBool::new(true)
    }

    // --- Record / flush ---

    #[test]
    fn test_record_arms_single_timer_per_window() {
        let (core, scheduler) = core_with_manual();
        let gate = open_gate();

        core.record(&gate, ChangeEvent::add("a", json!(1)));
        core.record(&gate, ChangeEvent::add("b", json!(2)));
        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(core.pending_len(), 2);
        assert!(core.values().is_empty());
    }

    #[test]
    fn test_flush_applies_and_clears() {
        let (core, scheduler) = core_with_manual();
        let gate = open_gate();

        core.record(&gate, ChangeEvent::add("a", json!("x")));
        scheduler.advance(Duration::from_millis(100));

        assert_eq!(core.values(), vec![json!("x")]);
        assert_eq!(core.pending_len(), 0);
        assert_eq!(core.metrics().snapshot().flushes, 1);
    }

    #[test]
    fn test_next_window_rearms() {
        let (core, scheduler) = core_with_manual();
        let gate = open_gate();

        core.record(&gate, ChangeEvent::add("a", json!(1)));
        scheduler.advance(Duration::from_millis(100));
        core.record(&gate, ChangeEvent::add("b", json!(2)));
        assert_eq!(scheduler.pending_count(), 1);
        scheduler.advance(Duration::from_millis(100));
        assert_eq!(core.len(), 2);
    }

    // --- Gate / epoch fencing ---

    #[test]
    fn test_closed_gate_discards_event() {
        let (core, _scheduler) = core_with_manual();
        let gate = AtomicBool::new(false);

        core.record(&gate, ChangeEvent::add("a", json!(1)));
        assert_eq!(core.pending_len(), 0);
        assert_eq!(core.metrics().snapshot().events_discarded, 1);
    }

    #[test]
    fn test_stale_timer_fire_is_noop_after_reset() {
        let (core, scheduler) = core_with_manual();
        let gate = open_gate();

        core.record(&gate, ChangeEvent::add("a", json!(1)));
        core.reset();
        // The armed timer was cancelled; even a leftover fire under the
        // old epoch must not apply anything.
        scheduler.advance(Duration::from_millis(100));
        assert!(core.values().is_empty());
        assert_eq!(core.metrics().snapshot().flushes, 0);
    }

    #[test]
    fn test_reset_clears_store_and_pending() {
        let (core, scheduler) = core_with_manual();
        let gate = open_gate();

        core.record(&gate, ChangeEvent::add("a", json!(1)));
        scheduler.advance(Duration::from_millis(100));
        core.record(&gate, ChangeEvent::add("b", json!(2)));
        assert_eq!(core.len(), 1);
        assert_eq!(core.pending_len(), 1);

        core.reset();
        assert_eq!(core.len(), 0);
        assert_eq!(core.pending_len(), 0);
        assert_eq!(core.metrics().snapshot().resets, 1);
    }

    // --- Disposal ---

    #[test]
    fn test_dispose_freezes_store_and_discards_pending() {
        let (core, scheduler) = core_with_manual();
        let gate = open_gate();

        core.record(&gate, ChangeEvent::add("a", json!(1)));
        scheduler.advance(Duration::from_millis(100));
        core.record(&gate, ChangeEvent::add("b", json!(2)));

        assert!(core.dispose());
        // Pending batch never flushes.
        scheduler.advance(Duration::from_secs(10));
        assert_eq!(core.values(), vec![json!(1)]);

        // Later events are discarded.
        core.record(&gate, ChangeEvent::add("c", json!(3)));
        assert_eq!(core.values(), vec![json!(1)]);

        // Second dispose reports already-disposed.
        assert!(!core.dispose());
    }
}
