//! In-memory transport.
//!
//! Backs the test suite and local experimentation: objects published with
//! [`MemTransport::publish`] fan out synchronously to push registrations
//! and are forwarded into every open pull stream for the same source.
//! Failure and termination injection (`fail_pull`, `end_pull`,
//! `set_fail_subscribe`) exercise the engine's error paths.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Future, Stream, StreamExt};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::event::{ChangeKind, RawObject, RawUpdate};
use crate::source::SourceId;
use crate::transport::{
    IdentitySink, PushSink, PushToken, Transport, TransportError, UpdateStream,
};

// ---------------------------------------------------------------------------
// CancellableUpdates
// ---------------------------------------------------------------------------

/// Pull stream handed out by [`MemTransport`]: a channel-backed stream
/// raced against the session's cancellation token.
struct CancellableUpdates {
    inner: UnboundedReceiverStream<Result<RawUpdate, TransportError>>,
    cancelled: Pin<Box<dyn Future<Output = ()> + Send>>,
    terminated: bool,
}

impl Stream for CancellableUpdates {
    type Item = Result<RawUpdate, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.terminated {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.terminated = true;
            return Poll::Ready(Some(Err(TransportError::Cancelled)));
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(item)),
            Poll::Ready(None) => {
                this.terminated = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// MemTransport
// ---------------------------------------------------------------------------

type PullSender = mpsc::UnboundedSender<Result<RawUpdate, TransportError>>;

#[derive(Default)]
struct MemInner {
    next_token: u64,
    push: FxHashMap<u64, (SourceId, PushSink)>,
    identity: FxHashMap<u64, IdentitySink>,
    pull: FxHashMap<SourceId, Vec<PullSender>>,
    me: Option<String>,
    fail_subscribe: bool,
    open_counts: FxHashMap<SourceId, u64>,
}

/// An in-memory [`Transport`] for tests and examples.
///
/// Push sinks are invoked on the publishing thread; pull streams are
/// unbounded channels. All registrations for a source receive every
/// published object.
#[derive(Default)]
pub struct MemTransport {
    inner: Mutex<MemInner>,
}

impl MemTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `object` to every push registration and pull stream open
    /// for `source`.
    ///
    /// For pull streams the object is reshaped into a [`RawUpdate`];
    /// tombstones are forwarded value-free, as the pull wire requires.
    pub fn publish(&self, source: &SourceId, object: RawObject) {
        let update = RawUpdate {
            key: object.key.clone(),
            kind: if object.deleted {
                ChangeKind::Delete
            } else {
                ChangeKind::Add
            },
            value: if object.deleted {
                None
            } else {
                object.value.clone()
            },
        };
        self.forward_pull(source, Ok(update));

        let sinks: Vec<PushSink> = {
            let inner = self.inner.lock();
            inner
                .push
                .values()
                .filter(|(registered, _)| registered == source)
                .map(|(_, sink)| Arc::clone(sink))
                .collect()
        };
        for sink in sinks {
            sink(object.clone());
        }
    }

    /// Injects a raw update into every open pull stream for `source`,
    /// bypassing the push side. Lets tests deliver shapes `publish` would
    /// never produce, such as malformed pairings.
    pub fn publish_update(&self, source: &SourceId, update: RawUpdate) {
        self.forward_pull(source, Ok(update));
    }

    /// Injects `error` into every open pull stream for `source`.
    pub fn fail_pull(&self, source: &SourceId, error: TransportError) {
        self.forward_pull(source, Err(error));
    }

    /// Ends every open pull stream for `source` by dropping its sender.
    pub fn end_pull(&self, source: &SourceId) {
        self.inner.lock().pull.remove(source);
    }

    /// Sets the current identity and notifies identity registrations.
    pub fn set_identity(&self, me: Option<String>) {
        let sinks: Vec<IdentitySink> = {
            let mut inner = self.inner.lock();
            inner.me = me.clone();
            inner.identity.values().cloned().collect()
        };
        for sink in sinks {
            sink(me.clone());
        }
    }

    /// Makes subsequent `subscribe` / `open_updates` calls fail with
    /// [`TransportError::Unavailable`].
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.inner.lock().fail_subscribe = fail;
    }

    /// Returns the number of active push registrations for `source`.
    #[must_use]
    pub fn push_registrations(&self, source: &SourceId) -> usize {
        self.inner
            .lock()
            .push
            .values()
            .filter(|(registered, _)| registered == source)
            .count()
    }

    /// Returns the number of currently open pull streams for `source`.
    #[must_use]
    pub fn pull_streams(&self, source: &SourceId) -> usize {
        self.inner
            .lock()
            .pull
            .get(source)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    /// Returns how many times a registration (push or pull) was opened for
    /// `source` over the transport's lifetime.
    #[must_use]
    pub fn open_count(&self, source: &SourceId) -> u64 {
        self.inner.lock().open_counts.get(source).copied().unwrap_or(0)
    }

    fn forward_pull(&self, source: &SourceId, item: Result<RawUpdate, TransportError>) {
        let mut inner = self.inner.lock();
        if let Some(senders) = inner.pull.get_mut(source) {
            senders.retain(|sender| sender.send(item.clone()).is_ok());
        }
    }
}

impl Transport for MemTransport {
    fn subscribe(&self, source: &SourceId, sink: PushSink) -> Result<PushToken, TransportError> {
        let mut inner = self.inner.lock();
        if inner.fail_subscribe {
            return Err(TransportError::Unavailable(source.to_string()));
        }
        let token = inner.next_token;
        inner.next_token += 1;
        inner.push.insert(token, (source.clone(), sink));
        *inner.open_counts.entry(source.clone()).or_default() += 1;
        Ok(PushToken::new(token))
    }

    fn unsubscribe(&self, token: PushToken) {
        let mut inner = self.inner.lock();
        inner.push.remove(&token.raw());
        inner.identity.remove(&token.raw());
    }

    fn open_updates(
        &self,
        source: &SourceId,
        cancel: CancellationToken,
    ) -> Result<UpdateStream, TransportError> {
        let mut inner = self.inner.lock();
        if inner.fail_subscribe {
            return Err(TransportError::Unavailable(source.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.pull.entry(source.clone()).or_default().push(tx);
        *inner.open_counts.entry(source.clone()).or_default() += 1;

        Ok(CancellableUpdates {
            inner: UnboundedReceiverStream::new(rx),
            cancelled: Box::pin(cancel.cancelled_owned()),
            terminated: false,
        }
        .boxed())
    }

    fn subscribe_identity(&self, sink: IdentitySink) -> Option<PushToken> {
        let (token, me) = {
            let mut inner = self.inner.lock();
            let token = inner.next_token;
            inner.next_token += 1;
            inner.identity.insert(token, Arc::clone(&sink));
            (token, inner.me.clone())
        };
        sink(me);
        Some(PushToken::new(token))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
