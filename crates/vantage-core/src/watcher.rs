//! Source-set watching — diff-driven session lifecycle.
//!
//! The watcher resolves a [`SourceSpec`] to its current list of source
//! values, opens one session per unique value, and re-resolves whenever
//! any cell in the spec notifies. Each change is handled as a value-level
//! diff against the previous list:
//!
//! - empty symmetric difference (reordering, or a notification whose new
//!   list is content-equal to the old one) → no action at all;
//! - otherwise → close sessions for removed values, fully reset the
//!   snapshot, open sessions for added values. Unchanged values keep
//!   their session.
//!
//! Source changes are rare; rebuilding the whole view is simpler and less
//! error-prone than migrating partial state between source sets.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::cell::{ChangeCallback, WatchGuard};
use crate::config::ViewConfig;
use crate::session::SourceSession;
use crate::source::{SourceId, SourceSpec};
use crate::transport::Transport;
use crate::view::{ViewCore, ViewError};

// ---------------------------------------------------------------------------
// SourceWatcher
// ---------------------------------------------------------------------------

/// Owns the sessions of one view and keeps them aligned with the source
/// spec's current value.
pub(crate) struct SourceWatcher {
    core: Arc<ViewCore>,
    transport: Arc<dyn Transport>,
    config: ViewConfig,
    runtime: tokio::runtime::Handle,
    spec: SourceSpec,
    /// The last resolved source list, diffed against on every change.
    current: Mutex<Vec<SourceId>>,
    /// One session per unique current source value.
    sessions: Mutex<FxHashMap<SourceId, SourceSession>>,
    /// Cell subscriptions; dropped at teardown.
    guards: Mutex<Vec<WatchGuard>>,
}

impl SourceWatcher {
    /// Opens the initial sessions and registers on every cell in `spec`.
    ///
    /// On failure, sessions opened so far are closed again and the error
    /// is returned: a view that cannot cover its requested sources is
    /// not opened at all.
    pub(crate) fn open(
        core: Arc<ViewCore>,
        transport: Arc<dyn Transport>,
        spec: SourceSpec,
        config: ViewConfig,
        runtime: tokio::runtime::Handle,
    ) -> Result<Arc<Self>, ViewError> {
        let watcher = Arc::new(Self {
            core,
            transport,
            config,
            runtime,
            spec,
            current: Mutex::new(Vec::new()),
            sessions: Mutex::new(FxHashMap::default()),
            guards: Mutex::new(Vec::new()),
        });

        let initial = watcher.spec.resolve();
        {
            let mut sessions = watcher.sessions.lock();
            for source in unique(&initial) {
                match SourceSession::open(
                    &watcher.transport,
                    &source,
                    &watcher.core,
                    &watcher.config,
                    &watcher.runtime,
                ) {
                    Ok(session) => {
                        sessions.insert(source, session);
                        watcher
                            .core
                            .metrics()
                            .sessions_opened
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(cause) => {
                        for (_, opened) in sessions.drain() {
                            opened.close();
                        }
                        return Err(ViewError::SessionOpen { source, cause });
                    }
                }
            }
        }
        *watcher.current.lock() = initial;

        let weak: Weak<Self> = Arc::downgrade(&watcher);
        let callback: ChangeCallback = Arc::new(move || {
            if let Some(watcher) = weak.upgrade() {
                watcher.handle_change();
            }
        });
        *watcher.guards.lock() = watcher.spec.watch_all(callback);

        Ok(watcher)
    }

    /// Re-resolves the spec and reconciles sessions against the value
    /// diff. Invoked from cell notifications, on the mutating thread.
    fn handle_change(&self) {
        if !self.core.is_live() {
            return;
        }

        let new = self.spec.resolve();
        let mut current = self.current.lock();

        let old_set: BTreeSet<SourceId> = current.iter().cloned().collect();
        let new_set: BTreeSet<SourceId> = new.iter().cloned().collect();
        let removed: Vec<SourceId> = old_set.difference(&new_set).cloned().collect();
        let added: Vec<SourceId> = new_set.difference(&old_set).cloned().collect();

        if removed.is_empty() && added.is_empty() {
            // Content-equal notification: reordering or a fresh list
            // instance with the same values. Nothing to do.
            *current = new;
            return;
        }

        tracing::debug!(
            added = added.len(),
            removed = removed.len(),
            "source set changed"
        );

        let mut sessions = self.sessions.lock();
        for source in &removed {
            if let Some(session) = sessions.remove(source) {
                session.close();
                self.core
                    .metrics()
                    .sessions_closed
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        // The view is rebuilt for the new source set: removed sessions are
        // gated off before the reset, so nothing of theirs lands after it.
        self.core.reset();

        for source in added {
            match SourceSession::open(
                &self.transport,
                &source,
                &self.core,
                &self.config,
                &self.runtime,
            ) {
                Ok(session) => {
                    sessions.insert(source, session);
                    self.core
                        .metrics()
                        .sessions_opened
                        .fetch_add(1, Ordering::Relaxed);
                }
                Err(cause) => {
                    tracing::error!(source = %source, %cause, "failed to open session after source change");
                    self.core.set_error(ViewError::SessionOpen { source, cause });
                }
            }
        }

        *current = new;
    }

    /// Stops watching cells and closes every session.
    pub(crate) fn teardown(&self) {
        self.guards.lock().clear();

        let drained: Vec<(SourceId, SourceSession)> =
            self.sessions.lock().drain().collect();
        for (_, session) in drained {
            session.close();
            self.core
                .metrics()
                .sessions_closed
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Order-preserving dedup of a resolved source list.
fn unique(sources: &[SourceId]) -> Vec<SourceId> {
    let mut seen = BTreeSet::new();
    sources
        .iter()
        .filter(|source| seen.insert((*source).clone()))
        .cloned()
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================
