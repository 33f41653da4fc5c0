//! Configuration for opening views.

use std::time::Duration;

/// Default flush window when none is configured.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// DeliveryMode
// ---------------------------------------------------------------------------

/// Which transport delivery model a view's sessions use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Callback registrations ([`Transport::subscribe`](crate::Transport::subscribe)).
    #[default]
    Push,
    /// Cancellable update streams ([`Transport::open_updates`](crate::Transport::open_updates)).
    Pull,
}

// ---------------------------------------------------------------------------
// ResubscribePolicy
// ---------------------------------------------------------------------------

/// What a pull session does when its stream terminates unexpectedly while
/// the source is still wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResubscribePolicy {
    /// Reopen the stream once, immediately. A second unexpected
    /// termination ends the session.
    #[default]
    Once,
    /// Never reopen; the session ends on first termination.
    Never,
}

// ---------------------------------------------------------------------------
// ViewConfig
// ---------------------------------------------------------------------------

/// Configuration for a view.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Length of the flush window: change events are buffered this long
    /// and applied to the snapshot in one step.
    pub flush_interval: Duration,
    /// Delivery model for the view's sessions.
    pub delivery: DeliveryMode,
    /// Re-subscription behavior for pull sessions.
    pub resubscribe: ResubscribePolicy,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            delivery: DeliveryMode::Push,
            resubscribe: ResubscribePolicy::Once,
        }
    }
}

impl ViewConfig {
    /// Returns a config with the given flush window.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Returns a config using the given delivery model.
    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Returns a config using the given re-subscription policy.
    #[must_use]
    pub fn with_resubscribe(mut self, policy: ResubscribePolicy) -> Self {
        self.resubscribe = policy;
        self
    }
}

// ===========================================================================
// Tests
// ===========================================================================
