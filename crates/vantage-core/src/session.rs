//! Subscription sessions — one transport registration per source.
//!
//! A session binds a single source to the transport using either the push
//! (callback) or pull (cancellable stream) delivery model and forwards
//! validated events into the view core. Both variants share the external
//! contract: deliver change events for one source until told to stop.
//!
//! Every session owns a gate flag flipped at close time. The gate is
//! re-checked inside the view core under its state lock, so events still
//! in flight when a session closes are discarded instead of leaking into
//! the snapshot after a source-set reset.
//!
//! A pull session whose stream terminates unexpectedly while the source is
//! still wanted reopens it immediately, at most once per session
//! ([`ResubscribePolicy`]). Cancellation is recognized by token state and
//! error variant, never treated as a failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::{DeliveryMode, ResubscribePolicy, ViewConfig};
use crate::event::RawObject;
use crate::source::SourceId;
use crate::transport::{PushSink, PushToken, Transport, TransportError, UpdateStream};
use crate::view::ViewCore;

// ---------------------------------------------------------------------------
// SourceSession
// ---------------------------------------------------------------------------

enum SessionKind {
    Push {
        transport: Arc<dyn Transport>,
        token: PushToken,
    },
    Pull {
        cancel: CancellationToken,
    },
}

/// An active subscription for one source.
///
/// Lifecycle: create → active → (replaced on source change | torn down on
/// dispose). [`close`](SourceSession::close) consumes the session: the
/// gate flips first, then the transport registration is released.
pub(crate) struct SourceSession {
    source: SourceId,
    gate: Arc<AtomicBool>,
    kind: SessionKind,
}

impl SourceSession {
    /// Opens a session for `source` using the view's configured delivery
    /// model.
    pub(crate) fn open(
        transport: &Arc<dyn Transport>,
        source: &SourceId,
        core: &Arc<ViewCore>,
        config: &ViewConfig,
        runtime: &tokio::runtime::Handle,
    ) -> Result<Self, TransportError> {
        match config.delivery {
            DeliveryMode::Push => Self::open_push(transport, source, core),
            DeliveryMode::Pull => {
                Self::open_pull(transport, source, core, config.resubscribe, runtime)
            }
        }
    }

    fn open_push(
        transport: &Arc<dyn Transport>,
        source: &SourceId,
        core: &Arc<ViewCore>,
    ) -> Result<Self, TransportError> {
        let gate = Arc::new(AtomicBool::new(true));

        let sink_gate = Arc::clone(&gate);
        let sink_core = Arc::clone(core);
        let sink_source = source.clone();
        let sink: PushSink = Arc::new(move |object: RawObject| {
            match object.into_event() {
                Ok(event) => sink_core.record(&sink_gate, event),
                Err(err) => {
                    sink_core
                        .metrics()
                        .malformed_events
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(source = %sink_source, %err, "dropping malformed push event");
                }
            }
        });

        let token = transport.subscribe(source, sink)?;
        tracing::debug!(source = %source, "opened push session");
        Ok(Self {
            source: source.clone(),
            gate,
            kind: SessionKind::Push {
                transport: Arc::clone(transport),
                token,
            },
        })
    }

    fn open_pull(
        transport: &Arc<dyn Transport>,
        source: &SourceId,
        core: &Arc<ViewCore>,
        policy: ResubscribePolicy,
        runtime: &tokio::runtime::Handle,
    ) -> Result<Self, TransportError> {
        let gate = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let stream = transport.open_updates(source, cancel.clone())?;

        runtime.spawn(drain_updates(
            Arc::clone(transport),
            source.clone(),
            Arc::clone(core),
            Arc::clone(&gate),
            cancel.clone(),
            stream,
            policy,
        ));
        tracing::debug!(source = %source, "opened pull session");
        Ok(Self {
            source: source.clone(),
            gate,
            kind: SessionKind::Pull { cancel },
        })
    }

    /// Closes the session: flips the gate, then releases the transport
    /// registration (push) or triggers cancellation (pull).
    pub(crate) fn close(self) {
        self.gate.store(false, Ordering::SeqCst);
        match self.kind {
            SessionKind::Push { transport, token } => {
                transport.unsubscribe(token);
                tracing::debug!(source = %self.source, "closed push session");
            }
            SessionKind::Pull { cancel } => {
                cancel.cancel();
                tracing::debug!(source = %self.source, "closed pull session");
            }
        }
    }
}

impl std::fmt::Debug for SourceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            SessionKind::Push { .. } => "push",
            SessionKind::Pull { .. } => "pull",
        };
        f.debug_struct("SourceSession")
            .field("source", &self.source)
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Pull drain task
// ---------------------------------------------------------------------------

/// Drains a pull stream into the view core until the stream ends or the
/// session is cancelled.
async fn drain_updates(
    transport: Arc<dyn Transport>,
    source: SourceId,
    core: Arc<ViewCore>,
    gate: Arc<AtomicBool>,
    cancel: CancellationToken,
    mut stream: UpdateStream,
    policy: ResubscribePolicy,
) {
    let mut reopened = false;
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => break,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(update)) => match update.into_event() {
                Ok(event) => core.record(&gate, event),
                Err(err) => {
                    core.metrics()
                        .malformed_events
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(source = %source, %err, "dropping malformed update");
                }
            },
            Some(Err(err)) if err.is_cancelled() => break,
            Some(Err(err)) => {
                tracing::error!(source = %source, %err, "update stream failed");
                if !reopen(&transport, &source, &cancel, &mut stream, &mut reopened, policy) {
                    break;
                }
            }
            None => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::debug!(source = %source, "update stream ended");
                if !reopen(&transport, &source, &cancel, &mut stream, &mut reopened, policy) {
                    break;
                }
            }
        }
    }
}

/// Attempts the session's single re-subscription. Returns `true` if a
/// fresh stream was installed.
fn reopen(
    transport: &Arc<dyn Transport>,
    source: &SourceId,
    cancel: &CancellationToken,
    stream: &mut UpdateStream,
    reopened: &mut bool,
    policy: ResubscribePolicy,
) -> bool {
    if policy == ResubscribePolicy::Never || *reopened || cancel.is_cancelled() {
        return false;
    }
    *reopened = true;
    match transport.open_updates(source, cancel.clone()) {
        Ok(fresh) => {
            tracing::debug!(source = %source, "reopened update stream");
            *stream = fresh;
            true
        }
        Err(err) => {
            tracing::error!(source = %source, %err, "re-subscription failed");
            false
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
