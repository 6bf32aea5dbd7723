use std::ops::ControlFlow;
use std::sync::OnceLock;

use ndarray::Array2;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::Event;
use crate::storage::backend::{BackendKind, DgStorage, StorageStats};
use crate::storage::features::{check_node_ids, check_static_rows, FeatureShapes};
use crate::storage::slice::SliceTracker;
use crate::types::NodeId;

/// Storage over a flat vector kept sorted by time.
///
/// Time bounds resolve to a contiguous position range with a binary search,
/// so the position of an event is also its global index.
#[derive(Debug)]
pub struct EventListStorage {
    events: Vec<Event>,
    shapes: FeatureShapes,
    static_node_feats: Option<Array2<f32>>,
    stats: OnceLock<StorageStats>,
}

impl EventListStorage {
    /// Builds storage from events, sorting them if they arrive out of order.
    pub fn new(mut events: Vec<Event>, static_node_feats: Option<Array2<f32>>) -> Result<Self> {
        check_node_ids(&events)?;
        let shapes = FeatureShapes::from_events(&events)?;
        sort_if_needed(&mut events);
        let storage = Self {
            events,
            shapes,
            static_node_feats: None,
            stats: OnceLock::new(),
        };
        check_static_rows(static_node_feats.as_ref(), storage.stats().num_nodes)?;
        debug!(events = storage.events.len(), "storage.event_list.built");
        Ok(Self {
            static_node_feats,
            ..storage
        })
    }

    /// Position range `[lo, hi)` covering the slice's time and index bounds.
    fn bounds(&self, slice: &SliceTracker) -> (usize, usize) {
        let mut lo = slice
            .start_time
            .map_or(0, |s| self.events.partition_point(|e| e.time() < s));
        let mut hi = slice
            .end_time
            .map_or(self.events.len(), |e| self.events.partition_point(|ev| ev.time() < e));
        if let Some(s) = slice.start_idx {
            lo = lo.max(s);
        }
        if let Some(e) = slice.end_idx {
            hi = hi.min(e.saturating_add(1));
        }
        (lo, hi)
    }
}

fn sort_if_needed(events: &mut [Event]) {
    let sorted = events.windows(2).all(|w| w[0].time() <= w[1].time());
    if !sorted {
        warn!(events = events.len(), "storage.event_list.out_of_order");
        events.sort_by(Event::cmp_time);
    }
}

impl DgStorage for EventListStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::EventList
    }

    fn for_each_event(
        &self,
        slice: &SliceTracker,
        visit: &mut dyn FnMut(usize, &Event) -> ControlFlow<()>,
    ) {
        if slice.is_trivially_empty() {
            return;
        }
        let (lo, hi) = self.bounds(slice);
        if lo >= hi {
            return;
        }
        for (offset, event) in self.events[lo..hi].iter().enumerate() {
            if slice.admits_nodes(event) {
                if let ControlFlow::Break(()) = visit(lo + offset, event) {
                    return;
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.events.len()
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
        let incoming = events.iter().map(Event::max_node).max();
        let num_nodes = incoming
            .map_or(0, NodeId::extent)
            .max(self.stats().num_nodes);
        check_static_rows(self.static_node_feats.as_ref(), num_nodes)?;
        self.shapes = shapes;
        self.events.extend(events);
        // Stable sort keeps earlier events ahead of appended ties.
        sort_if_needed(&mut self.events);
        self.stats = OnceLock::new();
        Ok(())
    }

    fn rebuild(&self, events: Vec<Event>) -> Result<Box<dyn DgStorage>> {
        Ok(Box::new(EventListStorage::new(
            events,
            self.static_node_feats.clone(),
        )?))
    }
}
