//! Source identifiers and source-set specifications.
//!
//! A source names a partition of the remote object space. Views are opened
//! over a [`SourceSpec`]: a single source, a fixed list, a watched list, or
//! a list whose elements are individually watched cells. The spec resolves
//! to a plain list of current values; all diffing downstream compares those
//! values, never cell identity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cell::{ChangeCallback, Watch, WatchGuard, Watchable};

// ---------------------------------------------------------------------------
// SourceId
// ---------------------------------------------------------------------------

/// Opaque identifier of a place objects are received from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// SourceElement
// ---------------------------------------------------------------------------

/// One element of a source list: a plain value or a cell whose current
/// value is the element.
#[derive(Clone)]
pub enum SourceElement {
    /// A fixed source identifier.
    Fixed(SourceId),
    /// A time-varying source identifier.
    Dynamic(Arc<dyn Watch<SourceId>>),
}

impl SourceElement {
    /// Returns the element's current value.
    #[must_use]
    pub fn current(&self) -> SourceId {
        match self {
            Self::Fixed(id) => id.clone(),
            Self::Dynamic(cell) => cell.get(),
        }
    }
}

impl std::fmt::Debug for SourceElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(id) => f.debug_tuple("Fixed").field(id).finish(),
            Self::Dynamic(cell) => f.debug_tuple("Dynamic").field(&cell.get()).finish(),
        }
    }
}

impl From<SourceId> for SourceElement {
    fn from(id: SourceId) -> Self {
        Self::Fixed(id)
    }
}

impl From<&str> for SourceElement {
    fn from(s: &str) -> Self {
        Self::Fixed(s.into())
    }
}

impl From<Watchable<SourceId>> for SourceElement {
    fn from(cell: Watchable<SourceId>) -> Self {
        Self::Dynamic(Arc::new(cell))
    }
}

// ---------------------------------------------------------------------------
// SourceSpec
// ---------------------------------------------------------------------------

/// What a view subscribes to.
///
/// All shapes resolve to an ordered list of current [`SourceId`] values via
/// [`resolve`](SourceSpec::resolve); the dynamic shapes additionally expose
/// their change notifications via [`watch_all`](SourceSpec::watch_all).
#[derive(Clone)]
pub enum SourceSpec {
    /// A fixed list of sources.
    Fixed(Vec<SourceId>),
    /// A watched cell yielding the whole list.
    List(Arc<dyn Watch<Vec<SourceId>>>),
    /// A fixed-length list whose elements may individually change.
    Elements(Vec<SourceElement>),
}

impl SourceSpec {
    /// Resolves the spec to the current list of source values.
    #[must_use]
    pub fn resolve(&self) -> Vec<SourceId> {
        match self {
            Self::Fixed(ids) => ids.clone(),
            Self::List(cell) => cell.get(),
            Self::Elements(elements) => elements.iter().map(SourceElement::current).collect(),
        }
    }

    /// Registers `callback` on every cell the spec contains.
    ///
    /// Returns one guard per registration; dropping the guards stops all
    /// notifications. Fixed specs return no guards.
    #[must_use]
    pub fn watch_all(&self, callback: ChangeCallback) -> Vec<WatchGuard> {
        match self {
            Self::Fixed(_) => Vec::new(),
            Self::List(cell) => vec![cell.on_change(callback)],
            Self::Elements(elements) => elements
                .iter()
                .filter_map(|element| match element {
                    SourceElement::Fixed(_) => None,
                    SourceElement::Dynamic(cell) => Some(cell.on_change(Arc::clone(&callback))),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SourceSpec").field(&self.resolve()).finish()
    }
}

impl From<SourceId> for SourceSpec {
    fn from(id: SourceId) -> Self {
        Self::Fixed(vec![id])
    }
}

impl From<&str> for SourceSpec {
    fn from(s: &str) -> Self {
        Self::Fixed(vec![s.into()])
    }
}

impl From<Vec<SourceId>> for SourceSpec {
    fn from(ids: Vec<SourceId>) -> Self {
        Self::Fixed(ids)
    }
}

impl From<Vec<&str>> for SourceSpec {
    fn from(ids: Vec<&str>) -> Self {
        Self::Fixed(ids.into_iter().map(Into::into).collect())
    }
}

impl From<Watchable<Vec<SourceId>>> for SourceSpec {
    fn from(cell: Watchable<Vec<SourceId>>) -> Self {
        Self::List(Arc::new(cell))
    }
}

impl From<Watchable<SourceId>> for SourceSpec {
    fn from(cell: Watchable<SourceId>) -> Self {
        Self::Elements(vec![cell.into()])
    }
}

impl From<Vec<SourceElement>> for SourceSpec {
    fn from(elements: Vec<SourceElement>) -> Self {
        Self::Elements(elements)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // --- Resolution ---

    #[test]
    fn test_fixed_resolution() {
        let spec = SourceSpec::from(vec!["a", "b"]);
        assert_eq!(spec.resolve(), vec![SourceId::from("a"), "b".into()]);
    }

    #[test]
    fn test_single_source_conversion() {
        let spec = SourceSpec::from("solo");
        assert_eq!(spec.resolve(), vec![SourceId::from("solo")]);
    }

    #[test]
    fn test_list_cell_resolution_tracks_value() {
        let cell = Watchable::new(vec![SourceId::from("a")]);
        let spec = SourceSpec::from(cell.clone());
        assert_eq!(spec.resolve(), vec![SourceId::from("a")]);

        cell.set(vec!["a".into(), "b".into()]);
        assert_eq!(spec.resolve(), vec![SourceId::from("a"), "b".into()]);
    }

    #[test]
    fn test_element_cells_resolve_current_values() {
        let dynamic = Watchable::new(SourceId::from("old"));
        let spec = SourceSpec::Elements(vec!["fixed".into(), dynamic.clone().into()]);
        assert_eq!(spec.resolve(), vec![SourceId::from("fixed"), "old".into()]);

        dynamic.set("new".into());
        assert_eq!(spec.resolve(), vec![SourceId::from("fixed"), "new".into()]);
    }

    // --- Watching ---

    #[test]
    fn test_fixed_spec_has_no_watches() {
        let spec = SourceSpec::from(vec!["a"]);
        let guards = spec.watch_all(Arc::new(|| {}));
        assert!(guards.is_empty());
    }

    #[test]
    fn test_list_cell_notifies() {
        let cell = Watchable::new(vec![SourceId::from("a")]);
        let spec = SourceSpec::from(cell.clone());

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let guards = spec.watch_all(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(guards.len(), 1);

        cell.set(vec!["b".into()]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_dynamic_elements_watched() {
        let dynamic = Watchable::new(SourceId::from("d"));
        let spec = SourceSpec::Elements(vec![
            "fixed-1".into(),
            dynamic.clone().into(),
            "fixed-2".into(),
        ]);

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let guards = spec.watch_all(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(guards.len(), 1);

        dynamic.set("d2".into());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_guards_stop_notifications() {
        let cell = Watchable::new(vec![SourceId::from("a")]);
        let spec = SourceSpec::from(cell.clone());

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let guards = spec.watch_all(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        drop(guards);

        cell.set(vec!["b".into()]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
