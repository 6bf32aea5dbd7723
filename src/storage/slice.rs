use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{DgError, Result};
use crate::events::Event;
use crate::types::{NodeId, Time};

/// Active filter applied to every storage query.
///
/// Each field narrows the event set; `None` leaves that dimension
/// unconstrained. The filter is the intersection of:
/// - `start_time <= time < end_time` (half-open),
/// - `start_idx <= global index <= end_idx` (inclusive),
/// - the event touches a member of `node_slice`.
///
/// The global index is an event's position in the storage's full
/// time-ordered sequence, so index bounds compose by plain intersection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SliceTracker {
    /// Inclusive lower time bound.
    pub start_time: Option<Time>,
    /// Exclusive upper time bound.
    pub end_time: Option<Time>,
    /// Inclusive lower global event index.
    pub start_idx: Option<usize>,
    /// Inclusive upper global event index.
    pub end_idx: Option<usize>,
    /// Node filter shared between views without copying.
    pub node_slice: Option<Arc<BTreeSet<NodeId>>>,
}

impl SliceTracker {
    /// An unconstrained slice.
    pub fn full() -> Self {
        Self::default()
    }

    /// A slice bounded to `[start, end)`.
    pub fn time_range(start: Option<Time>, end: Option<Time>) -> Result<Self> {
        validate_time_bounds(start, end)?;
        Ok(Self {
            start_time: start,
            end_time: end,
            ..Self::default()
        })
    }

    /// A slice restricted to events touching `nodes`.
    pub fn nodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            node_slice: Some(Arc::new(nodes.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Whether no field constrains the slice.
    pub fn is_unconstrained(&self) -> bool {
        self.start_time.is_none()
            && self.end_time.is_none()
            && self.start_idx.is_none()
            && self.end_idx.is_none()
            && self.node_slice.is_none()
    }

    /// Whether the time or index bounds alone already exclude everything.
    pub fn is_trivially_empty(&self) -> bool {
        let time_empty = matches!((self.start_time, self.end_time), (Some(s), Some(e)) if s >= e);
        let idx_empty = matches!((self.start_idx, self.end_idx), (Some(s), Some(e)) if s > e);
        let nodes_empty = self.node_slice.as_ref().is_some_and(|n| n.is_empty());
        time_empty || idx_empty || nodes_empty
    }

    /// Whether only the time bounds constrain the slice.
    pub(crate) fn is_time_only(&self) -> bool {
        self.start_idx.is_none() && self.end_idx.is_none() && self.node_slice.is_none()
    }

    /// Time predicate.
    #[inline]
    pub fn contains_time(&self, time: Time) -> bool {
        self.start_time.map_or(true, |s| time >= s) && self.end_time.map_or(true, |e| time < e)
    }

    /// Global index predicate.
    #[inline]
    pub fn contains_idx(&self, idx: usize) -> bool {
        self.start_idx.map_or(true, |s| idx >= s) && self.end_idx.map_or(true, |e| idx <= e)
    }

    /// Node predicate.
    #[inline]
    pub fn admits_nodes(&self, event: &Event) -> bool {
        self.node_slice.as_ref().map_or(true, |nodes| event.touches(nodes))
    }

    /// Full predicate for the event at global index `idx`.
    #[inline]
    pub fn matches(&self, idx: usize, event: &Event) -> bool {
        self.contains_time(event.time()) && self.contains_idx(idx) && self.admits_nodes(event)
    }

    /// Returns a copy whose time bounds are intersected with `[start, end)`.
    pub fn intersect_time(&self, start: Option<Time>, end: Option<Time>) -> Self {
        Self {
            start_time: max_bound(self.start_time, start),
            end_time: min_bound(self.end_time, end),
            ..self.clone()
        }
    }

    /// Returns a copy whose index bounds are intersected with `[start, end]`.
    pub fn intersect_idx(&self, start: Option<usize>, end: Option<usize>) -> Self {
        Self {
            start_idx: max_bound(self.start_idx, start),
            end_idx: min_bound(self.end_idx, end),
            ..self.clone()
        }
    }

    /// Returns a copy whose node filter is intersected with `nodes`.
    pub fn intersect_nodes(&self, nodes: &BTreeSet<NodeId>) -> Self {
        let narrowed = match &self.node_slice {
            Some(current) => current.intersection(nodes).copied().collect(),
            None => nodes.clone(),
        };
        Self {
            node_slice: Some(Arc::new(narrowed)),
            ..self.clone()
        }
    }
}

/// Rejects `start > end` when both bounds are present.
pub(crate) fn validate_time_bounds(start: Option<Time>, end: Option<Time>) -> Result<()> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(DgError::invalid(format!(
            "start_time ({s}) must be <= end_time ({e})"
        ))),
        _ => Ok(()),
    }
}

/// Tighter of two optional lower bounds.
pub(crate) fn max_bound<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Tighter of two optional upper bounds.
pub(crate) fn min_bound<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_open_time_predicate() {
        let slice = SliceTracker::time_range(Some(1), Some(5)).unwrap();
        assert!(slice.contains_time(1));
        assert!(slice.contains_time(4));
        assert!(!slice.contains_time(5));
        assert!(!slice.contains_time(0));
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert!(SliceTracker::time_range(Some(2), Some(1)).is_err());
        assert!(SliceTracker::time_range(Some(2), Some(2)).is_ok());
    }

    #[test]
    fn intersections_only_narrow() {
        let slice = SliceTracker::time_range(Some(2), Some(10)).unwrap();
        let narrowed = slice.intersect_time(Some(0), Some(6));
        assert_eq!(narrowed.start_time, Some(2));
        assert_eq!(narrowed.end_time, Some(6));

        let idx = SliceTracker::full().intersect_idx(Some(3), None).intersect_idx(Some(1), Some(7));
        assert_eq!((idx.start_idx, idx.end_idx), (Some(3), Some(7)));
    }

    #[test]
    fn node_filter_intersects() {
        let a: BTreeSet<NodeId> = [1, 2, 3].into_iter().map(NodeId).collect();
        let b: BTreeSet<NodeId> = [2, 3, 4].into_iter().map(NodeId).collect();
        let slice = SliceTracker::full().intersect_nodes(&a).intersect_nodes(&b);
        let nodes = slice.node_slice.unwrap();
        assert_eq!(nodes.iter().map(|n| n.0).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn trivially_empty_detection() {
        assert!(SliceTracker::time_range(Some(3), Some(3)).unwrap().is_trivially_empty());
        assert!(SliceTracker::nodes(Vec::new()).is_trivially_empty());
        assert!(!SliceTracker::full().is_trivially_empty());
    }
}
