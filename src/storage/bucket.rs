use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow};
use std::sync::OnceLock;

use ndarray::Array2;
use tracing::{debug, trace};

use crate::error::Result;
use crate::events::Event;
use crate::storage::backend::{scan_end_time, scan_start_time, BackendKind, DgStorage, StorageStats};
use crate::storage::features::{check_node_ids, check_static_rows, FeatureShapes};
use crate::storage::slice::SliceTracker;
use crate::types::{NodeId, Time};

/// Events sharing one timestamp, in insertion order.
#[derive(Clone, Debug, Default)]
struct Bucket {
    /// Global index of the first event in the bucket.
    offset: usize,
    events: Vec<Event>,
}

/// Storage that groups events into per-timestamp buckets.
///
/// Time-range queries walk only the buckets inside the range, and index
/// bounds skip whole buckets using their offsets.
#[derive(Debug)]
pub struct BucketStorage {
    buckets: BTreeMap<Time, Bucket>,
    len: usize,
    shapes: FeatureShapes,
    static_node_feats: Option<Array2<f32>>,
    stats: OnceLock<StorageStats>,
}

impl BucketStorage {
    /// Builds storage from events in any order.
    pub fn new(events: Vec<Event>, static_node_feats: Option<Array2<f32>>) -> Result<Self> {
        check_node_ids(&events)?;
        let shapes = FeatureShapes::from_events(&events)?;
        let mut storage = Self {
            buckets: BTreeMap::new(),
            len: 0,
            shapes,
            static_node_feats: None,
            stats: OnceLock::new(),
        };
        storage.insert_all(events);
        check_static_rows(static_node_feats.as_ref(), storage.stats().num_nodes)?;
        storage.static_node_feats = static_node_feats;
        debug!(
            events = storage.len,
            timestamps = storage.buckets.len(),
            "storage.bucket.built"
        );
        Ok(storage)
    }

    fn insert_all(&mut self, events: Vec<Event>) {
        self.len += events.len();
        for event in events {
            self.buckets.entry(event.time()).or_default().events.push(event);
        }
        let mut offset = 0usize;
        for bucket in self.buckets.values_mut() {
            bucket.offset = offset;
            offset += bucket.events.len();
        }
        self.stats = OnceLock::new();
    }

    fn range(&self, slice: &SliceTracker) -> impl DoubleEndedIterator<Item = (&Time, &Bucket)> {
        let lower = slice.start_time.map_or(Bound::Unbounded, Bound::Included);
        let upper = slice.end_time.map_or(Bound::Unbounded, Bound::Excluded);
        self.buckets.range((lower, upper))
    }
}

impl DgStorage for BucketStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Bucket
    }

    fn for_each_event(
        &self,
        slice: &SliceTracker,
        visit: &mut dyn FnMut(usize, &Event) -> ControlFlow<()>,
    ) {
        if self.buckets.is_empty() || slice.is_trivially_empty() {
            return;
        }
        for (_, bucket) in self.range(slice) {
            let bucket_end = bucket.offset + bucket.events.len();
            if slice.start_idx.is_some_and(|s| bucket_end <= s) {
                continue;
            }
            if slice.end_idx.is_some_and(|e| bucket.offset > e) {
                return;
            }
            for (pos, event) in bucket.events.iter().enumerate() {
                let idx = bucket.offset + pos;
                if slice.contains_idx(idx) && slice.admits_nodes(event) {
                    if let ControlFlow::Break(()) = visit(idx, event) {
                        return;
                    }
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn stats_cell(&self) -> &OnceLock<StorageStats> {
        &self.stats
    }

    fn node_feats_shape(&self) -> Option<&[usize]> {
        self.shapes.node.as_deref()
    }

    fn edge_feats_shape(&self) -> Option<&[usize]> {
        self.shapes.edge.as_deref()
    }

    fn static_node_feats(&self) -> Option<&Array2<f32>> {
        self.static_node_feats.as_ref()
    }

    fn append(&mut self, events: Vec<Event>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        check_node_ids(&events)?;
        let shapes = self.shapes.admit(&events, self.is_empty())?;
        let max_node = events.iter().map(Event::max_node).max();
        let num_nodes = max_node.map_or(0, NodeId::extent).max(self.stats().num_nodes);
        check_static_rows(self.static_node_feats.as_ref(), num_nodes)?;
        trace!(count = events.len(), "storage.bucket.append");
        self.shapes = shapes;
        self.insert_all(events);
        Ok(())
    }

    fn rebuild(&self, events: Vec<Event>) -> Result<Box<dyn DgStorage>> {
        Ok(Box::new(BucketStorage::new(
            events,
            self.static_node_feats.clone(),
        )?))
    }

    fn get_start_time(&self, slice: &SliceTracker) -> Option<Time> {
        if !slice.is_time_only() {
            return scan_start_time(self, slice);
        }
        if slice.is_trivially_empty() {
            return None;
        }
        self.range(slice).next().map(|(t, _)| *t)
    }

    fn get_end_time(&self, slice: &SliceTracker) -> Option<Time> {
        if !slice.is_time_only() {
            return scan_end_time(self, slice);
        }
        if slice.is_trivially_empty() {
            return None;
        }
        self.range(slice).next_back().map(|(t, _)| *t)
    }

    fn get_num_timestamps(&self, slice: &SliceTracker) -> usize {
        if !slice.is_time_only() {
            let mut count = 0usize;
            let mut prev = None;
            self.for_each_event(slice, &mut |_, event| {
                if prev != Some(event.time()) {
                    count += 1;
                    prev = Some(event.time());
                }
                ControlFlow::Continue(())
            });
            return count;
        }
        if slice.is_trivially_empty() {
            return 0;
        }
        self.range(slice).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> BucketStorage {
        BucketStorage::new(
            vec![
                Event::edge(5, 3u64, 4u64),
                Event::edge(1, 0u64, 1u64),
                Event::node(1, 7u64),
                Event::edge(3, 1u64, 2u64),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn events_come_back_time_ordered_with_ties_in_insertion_order() {
        let s = storage();
        let events = s.to_events(&SliceTracker::full());
        assert_eq!(events[0], Event::edge(1, 0u64, 1u64));
        assert_eq!(events[1], Event::node(1, 7u64));
        assert_eq!(events[3].time(), 5);
        assert_eq!(s.event_indices(&SliceTracker::full()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn index_bounds_skip_buckets() {
        let s = storage();
        let slice = SliceTracker::full().intersect_idx(Some(1), Some(2));
        let events = s.to_events(&slice);
        assert_eq!(events, vec![Event::node(1, 7u64), Event::edge(3, 1u64, 2u64)]);
    }

    #[test]
    fn time_only_overrides_agree_with_scan() {
        let s = storage();
        let slice = SliceTracker::time_range(Some(2), Some(6)).unwrap();
        assert_eq!(s.get_start_time(&slice), Some(3));
        assert_eq!(s.get_end_time(&slice), Some(5));
        assert_eq!(s.get_num_timestamps(&slice), 2);
        let empty = SliceTracker::time_range(Some(4), Some(4)).unwrap();
        assert_eq!(s.get_start_time(&empty), None);
        assert_eq!(s.get_num_timestamps(&empty), 0);
    }

    #[test]
    fn append_reindexes_and_resets_stats() {
        let mut s = storage();
        assert_eq!(s.stats().num_events, 4);
        s.append(vec![Event::edge(0, 9u64, 9u64)]).unwrap();
        assert_eq!(s.stats().num_events, 5);
        assert_eq!(s.stats().num_nodes, 10);
        assert_eq!(s.get_start_time(&SliceTracker::full()), Some(0));
        let first = s.to_events(&SliceTracker::full().intersect_idx(None, Some(0)));
        assert_eq!(first, vec![Event::edge(0, 9u64, 9u64)]);
    }
}
