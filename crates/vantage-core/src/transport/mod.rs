//! The transport seam.
//!
//! The engine consumes the remote object space through [`Transport`] and
//! nothing else: object storage, network sync, and identity issuance all
//! live behind it. Two delivery models are supported, both feeding the same
//! snapshot/flush machinery:
//!
//! - **Push**: the engine registers a callback per source and the transport
//!   invokes it with [`RawObject`]s until the registration is released.
//! - **Pull**: the engine opens a cancellable stream of [`RawUpdate`]s per
//!   source and drains it until the stream ends or the token fires.
//!
//! Cancellation is signalled with [`TransportError::Cancelled`] and is
//! detected by variant, never by matching message text.

mod mem;

pub use mem::MemTransport;

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::event::{RawObject, RawUpdate};
use crate::source::SourceId;

// ---------------------------------------------------------------------------
// Sinks and stream aliases
// ---------------------------------------------------------------------------

/// Callback registered for push-model delivery. Invoked by the transport
/// once per delivered object, on an arbitrary thread.
pub type PushSink = Arc<dyn Fn(RawObject) + Send + Sync>;

/// Callback for identity-change delivery (`None` = logged out).
pub type IdentitySink = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Pull-model update stream for one source.
///
/// Ends normally when the transport has nothing more to deliver; yields
/// `Err(TransportError::Cancelled)` (or just ends) once the token passed to
/// [`Transport::open_updates`] fires.
pub type UpdateStream = BoxStream<'static, Result<RawUpdate, TransportError>>;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Failures surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The subscription's cancellation token fired. Expected termination,
    /// not a failure.
    #[error("subscription cancelled")]
    Cancelled,
    /// The transport refused or could not open a subscription.
    #[error("source unavailable: {0}")]
    Unavailable(String),
    /// The underlying connection failed mid-delivery.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

impl TransportError {
    /// Returns `true` for the expected-cancellation case.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// PushToken
// ---------------------------------------------------------------------------

/// Opaque handle to a callback registration, released via
/// [`Transport::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushToken(u64);

impl PushToken {
    /// Wraps a transport-assigned registration id.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw registration id.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// The narrow interface the engine consumes the remote object space
/// through.
///
/// A transport instance is shared across views (`Arc<dyn Transport>`);
/// every registration it hands out is exclusively owned by one session and
/// released exactly once.
pub trait Transport: Send + Sync + 'static {
    /// Registers `sink` for push delivery of every change on `source`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Unavailable`] if the subscription cannot be
    /// opened.
    fn subscribe(&self, source: &SourceId, sink: PushSink) -> Result<PushToken, TransportError>;

    /// Releases a registration. Idempotent; unknown tokens are ignored.
    fn unsubscribe(&self, token: PushToken);

    /// Opens a pull-model update stream for `source`.
    ///
    /// The stream terminates once `cancel` fires; consumers treat that as
    /// expected termination.
    ///
    /// # Errors
    ///
    /// [`TransportError::Unavailable`] if the stream cannot be opened.
    fn open_updates(
        &self,
        source: &SourceId,
        cancel: CancellationToken,
    ) -> Result<UpdateStream, TransportError>;

    /// Registers `sink` for identity changes, delivering the current
    /// identity immediately.
    ///
    /// Transports without an identity notion return `None`; the default
    /// implementation does.
    fn subscribe_identity(&self, sink: IdentitySink) -> Option<PushToken> {
        let _ = sink;
        None
    }
}

// ===========================================================================
// Tests
// ===========================================================================
