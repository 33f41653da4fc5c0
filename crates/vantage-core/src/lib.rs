//! # Vantage Core
//!
//! A live, locally materialized view over a remote, multi-writer object
//! set. Change notifications arrive per *source* (a partition of the
//! remote object space), are coalesced within a flush window, and are
//! applied to an in-memory snapshot exposed through a read-only
//! [`ViewHandle`].
//!
//! The engine covers:
//! - **Subscription lifecycle**: one session per current source, opened
//!   and closed only for the value-level diff when the source set changes.
//! - **Coalescing**: bursts of events within one flush window collapse to
//!   the last event per key before touching the snapshot.
//! - **Tombstones**: delete events remove idempotently; unknown keys are
//!   a no-op.
//! - **Two delivery models**: push callbacks and cancellable pull
//!   streams, unified into the same snapshot/flush machinery.
//! - **Deterministic teardown**: disposal gates every in-flight event and
//!   cancels pending flushes before it returns.
//!
//! The transport (object storage, network sync, identity) lives behind the
//! [`Transport`] trait; [`MemTransport`] backs tests and local runs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vantage_core::{open_view, MemTransport, ViewConfig};
//!
//! let transport = Arc::new(MemTransport::new());
//! let view = open_view(transport, vec!["room-1", "room-2"], ViewConfig::default())?;
//!
//! // ... transport delivers change events; the snapshot follows ...
//! for object in view.values() {
//!     println!("{object}");
//! }
//! view.dispose();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batcher;
pub mod cell;
pub mod config;
pub mod event;
pub mod identity;
mod session;
pub mod source;
pub mod store;
pub mod timer;
pub mod transport;
pub mod view;
mod watcher;

pub use batcher::ChangeBatcher;
pub use cell::{ChangeCallback, Watch, WatchGuard, Watchable};
pub use config::{DeliveryMode, ResubscribePolicy, ViewConfig, DEFAULT_FLUSH_INTERVAL};
pub use event::{
    ChangeEvent, ChangeKind, EventError, ObjectKey, ObjectValue, RawObject, RawUpdate,
};
pub use identity::IdentityWatcher;
pub use source::{SourceElement, SourceId, SourceSpec};
pub use store::SnapshotStore;
pub use timer::{FlushScheduler, ManualScheduler, TimerCallback, TimerHandle, TokioScheduler};
pub use transport::{
    IdentitySink, MemTransport, PushSink, PushToken, Transport, TransportError, UpdateStream,
};
pub use view::{
    open_view, open_view_with_scheduler, ViewError, ViewHandle, ViewMetrics, ViewMetricsSnapshot,
};

/// Result type for vantage-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for vantage-core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level errors.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// View-level errors.
    #[error("view error: {0}")]
    View(#[from] ViewError),

    /// Malformed wire events.
    #[error("event error: {0}")]
    Event(#[from] EventError),
}
