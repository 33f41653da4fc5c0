//! A live mirror of the transport's current identity.
//!
//! Transports that know who is logged in push identity changes through
//! [`Transport::subscribe_identity`]; the watcher mirrors the latest value
//! into a cell so callers can read it synchronously or observe changes.
//! Identity issuance itself stays on the transport side.

use std::sync::Arc;

use crate::cell::{ChangeCallback, Watch, WatchGuard, Watchable};
use crate::transport::{PushToken, Transport};

// ---------------------------------------------------------------------------
// IdentityWatcher
// ---------------------------------------------------------------------------

/// Mirrors the transport's current identity (`None` = logged out).
///
/// Dropping the watcher releases the transport registration.
pub struct IdentityWatcher {
    cell: Watchable<Option<String>>,
    transport: Arc<dyn Transport>,
    token: Option<PushToken>,
}

impl IdentityWatcher {
    /// Registers for identity changes on `transport`.
    ///
    /// Transports without an identity notion hand out no registration; the
    /// mirror then stays `None` forever.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let cell = Watchable::new(None);
        let sink_cell = cell.clone();
        let token = transport.subscribe_identity(Arc::new(move |me| sink_cell.set(me)));
        Self {
            cell,
            transport,
            token,
        }
    }

    /// Returns the current identity.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.cell.get()
    }

    /// Observes identity changes until the guard is dropped.
    #[must_use]
    pub fn on_change(&self, callback: ChangeCallback) -> WatchGuard {
        self.cell.on_change(callback)
    }

    /// Releases the transport registration now instead of at drop time.
    /// Idempotent.
    pub fn close(&mut self) {
        if let Some(token) = self.token.take() {
            self.transport.unsubscribe(token);
        }
    }
}

impl Drop for IdentityWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for IdentityWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityWatcher")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
