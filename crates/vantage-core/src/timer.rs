//! Flush timing — an injectable one-shot scheduler.
//!
//! The flush window is driven through [`FlushScheduler`] rather than ambient
//! timers so the engine stays runtime-neutral and flush timing is
//! deterministic under test:
//!
//! - [`TokioScheduler`]: production implementation backed by a spawned
//!   sleep task.
//! - [`ManualScheduler`]: virtual clock for tests; timers fire only when
//!   the clock is advanced.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// TimerCallback / TimerHandle
// ---------------------------------------------------------------------------

/// One-shot callback invoked when a scheduled timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Handle to a scheduled timer.
///
/// [`cancel`](TimerHandle::cancel) revokes the timer if it has not fired
/// yet; cancelling a fired timer is a no-op. Dropping the handle does *not*
/// cancel: an armed flush must survive its handle changing owners.
pub struct TimerHandle {
    revoke: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    /// Wraps a revocation closure into a handle.
    #[must_use]
    pub fn new(revoke: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            revoke: Some(revoke),
        }
    }

    /// Cancels the timer without firing it. Idempotent per handle.
    pub fn cancel(mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// FlushScheduler
// ---------------------------------------------------------------------------

/// One-shot timer scheduling.
///
/// Implementations must invoke `callback` at most once, never synchronously
/// from inside `schedule` (callers may hold locks the callback also takes),
/// and never after the returned handle was cancelled.
pub trait FlushScheduler: Send + Sync + 'static {
    /// Schedules `callback` to run once after `delay`.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

// ---------------------------------------------------------------------------
// TokioScheduler
// ---------------------------------------------------------------------------

/// Production scheduler: each timer is a spawned task sleeping for the
/// delay, raced against a cancellation token.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Creates a scheduler bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Creates a scheduler bound to an explicit runtime handle.
    #[must_use]
    pub fn with_handle(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FlushScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let token = CancellationToken::new();
        let fire = token.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => callback(),
                () = fire.cancelled() => {}
            }
        });
        TimerHandle::new(Box::new(move || token.cancel()))
    }
}

// ---------------------------------------------------------------------------
// ManualScheduler
// ---------------------------------------------------------------------------

struct ManualEntry {
    id: u64,
    due: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualInner {
    now: Duration,
    next_id: u64,
    pending: Vec<ManualEntry>,
}

/// Virtual-clock scheduler for tests.
///
/// Timers are queued with an absolute due time against an internal clock
/// that only moves when [`advance`](ManualScheduler::advance) is called.
/// Due callbacks run on the advancing thread, in due order, outside the
/// scheduler's own lock (so callbacks may schedule further timers).
#[derive(Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualScheduler {
    /// Creates a scheduler with the clock at zero and no pending timers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `delta`, firing every timer that comes
    /// due, in due order.
    pub fn advance(&self, delta: Duration) {
        let due = {
            let mut inner = self.inner.lock();
            inner.now += delta;
            let now = inner.now;
            let mut due: Vec<ManualEntry> = Vec::new();
            let mut remaining = Vec::new();
            for entry in inner.pending.drain(..) {
                if entry.due <= now {
                    due.push(entry);
                } else {
                    remaining.push(entry);
                }
            }
            inner.pending = remaining;
            due.sort_by_key(|e| (e.due, e.id));
            due
        };
        for entry in due {
            (entry.callback)();
        }
    }

    /// Returns the number of timers that have not fired or been cancelled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let due = inner.now + delay;
        inner.pending.push(ManualEntry { id, due, callback });
        drop(inner);

        let revoke_inner = Arc::clone(&self.inner);
        TimerHandle::new(Box::new(move || {
            revoke_inner.lock().pending.retain(|e| e.id != id);
        }))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
