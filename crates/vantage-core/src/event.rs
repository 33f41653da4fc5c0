//! Change event types for the view engine.
//!
//! Two tiers of types:
//! - Wire shapes: [`RawObject`] (push delivery, deletion-flag tagged) and
//!   [`RawUpdate`] (pull delivery, explicit kind). Both are validated at the
//!   session boundary before anything reaches the batcher.
//! - [`ChangeEvent`]: the validated engine-internal event. By construction
//!   an `Add` always carries a value and a `Delete` never does.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ObjectKey
// ---------------------------------------------------------------------------

/// Identity of an object within the remote object set.
///
/// Opaque to the engine: keys are only compared, hashed, and ordered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey(pub String);

impl ObjectKey {
    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// ObjectValue
// ---------------------------------------------------------------------------

/// The payload of an object in the view.
///
/// Objects are schemaless JSON values; the engine never inspects them beyond
/// cloning them in and out of the snapshot.
pub type ObjectValue = serde_json::Value;

// ---------------------------------------------------------------------------
// ChangeKind
// ---------------------------------------------------------------------------

/// Discriminant for change event kinds.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// An object was created or replaced under its key.
    Add = 0,
    /// The object under a key was removed (tombstone).
    Delete = 1,
}

impl ChangeKind {
    /// Returns `true` if events of this kind carry a payload.
    #[inline]
    #[must_use]
    pub fn has_value(self) -> bool {
        matches!(self, Self::Add)
    }
}

// ---------------------------------------------------------------------------
// EventError
// ---------------------------------------------------------------------------

/// Rejection reasons for malformed wire events.
///
/// Malformed events are dropped at the session boundary (logged, counted)
/// and never reach the pending batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// An add update arrived without a payload.
    #[error("add event for key {0} is missing a value")]
    MissingValue(ObjectKey),
    /// A delete update arrived carrying a payload.
    #[error("delete event for key {0} carries a value")]
    UnexpectedValue(ObjectKey),
}

// ---------------------------------------------------------------------------
// ChangeEvent
// ---------------------------------------------------------------------------

/// A validated change event, ready to be batched and applied.
///
/// The variants enforce the kind/value pairing: an `Add` always has a value,
/// a `Delete` is key-only. Construct via [`ChangeEvent::add`] /
/// [`ChangeEvent::delete`] or by validating a wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Insert or replace the object under `key`.
    Add {
        /// Target key.
        key: ObjectKey,
        /// New payload.
        value: ObjectValue,
    },
    /// Remove the object under `key` if present.
    Delete {
        /// Target key.
        key: ObjectKey,
    },
}

impl ChangeEvent {
    /// Creates an add event.
    #[must_use]
    pub fn add(key: impl Into<ObjectKey>, value: ObjectValue) -> Self {
        Self::Add {
            key: key.into(),
            value,
        }
    }

    /// Creates a delete event.
    #[must_use]
    pub fn delete(key: impl Into<ObjectKey>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Returns the key this event targets.
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        match self {
            Self::Add { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Returns the kind discriminant.
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Add { .. } => ChangeKind::Add,
            Self::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// Returns the payload for add events, `None` for deletes.
    #[must_use]
    pub fn value(&self) -> Option<&ObjectValue> {
        match self {
            Self::Add { value, .. } => Some(value),
            Self::Delete { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RawObject — push wire shape
// ---------------------------------------------------------------------------

/// An object as delivered by a push-model transport callback.
///
/// The transport redelivers the full object on every change, tagged with a
/// deletion flag. Tombstones (`deleted: true`) may still carry the final
/// payload; only the key is kept in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObject {
    /// Identity key of the object.
    pub key: ObjectKey,
    /// Whether this delivery is a tombstone.
    pub deleted: bool,
    /// The object payload. Required unless `deleted` is set.
    pub value: Option<ObjectValue>,
}

impl RawObject {
    /// Validates and converts into a [`ChangeEvent`].
    ///
    /// # Errors
    ///
    /// [`EventError::MissingValue`] if a non-deleted object has no payload.
    pub fn into_event(self) -> Result<ChangeEvent, EventError> {
        if self.deleted {
            return Ok(ChangeEvent::Delete { key: self.key });
        }
        match self.value {
            Some(value) => Ok(ChangeEvent::Add {
                key: self.key,
                value,
            }),
            None => Err(EventError::MissingValue(self.key)),
        }
    }
}

// ---------------------------------------------------------------------------
// RawUpdate — pull wire shape
// ---------------------------------------------------------------------------

/// An update as yielded by a pull-model update stream.
///
/// Unlike [`RawObject`], the kind is explicit, so both pairings are checked:
/// adds must carry a value and deletes must not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUpdate {
    /// Identity key of the object.
    pub key: ObjectKey,
    /// Explicit change kind.
    pub kind: ChangeKind,
    /// The payload for adds; must be absent for deletes.
    pub value: Option<ObjectValue>,
}

impl RawUpdate {
    /// Validates and converts into a [`ChangeEvent`].
    ///
    /// # Errors
    ///
    /// [`EventError::MissingValue`] for an add without a payload,
    /// [`EventError::UnexpectedValue`] for a delete with one.
    pub fn into_event(self) -> Result<ChangeEvent, EventError> {
        match (self.kind, self.value) {
            (ChangeKind::Add, Some(value)) => Ok(ChangeEvent::Add {
                key: self.key,
                value,
            }),
            (ChangeKind::Add, None) => Err(EventError::MissingValue(self.key)),
            (ChangeKind::Delete, None) => Ok(ChangeEvent::Delete { key: self.key }),
            (ChangeKind::Delete, Some(_)) => Err(EventError::UnexpectedValue(self.key)),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
