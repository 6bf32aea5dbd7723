use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use tracing::debug;

use crate::error::{DgError, Result};
use crate::events::Event;
use crate::graph::batch::DgBatch;
use crate::graph::cache::{get_or_try_init, ViewCache};
use crate::graph::config::GraphConfig;
use crate::io::{read_csv, CsvOptions};
use crate::storage::{build_storage, AggFunc, DgStorage, Neighbors, SliceTracker, StorageStats};
use crate::tensor::{EdgeTensors, SparseTensor};
use crate::timedelta::TimeDelta;
use crate::types::{NodeId, Time};

/// Shareable handle pairing a storage backend with an active slice.
///
/// Slicing returns a new view over the same storage with a narrower
/// [`SliceTracker`]; the events are never copied. Derived values are
/// computed on first use and memoized per view.
#[derive(Clone)]
pub struct GraphView {
    storage: Arc<dyn DgStorage>,
    slice: SliceTracker,
    time_delta: TimeDelta,
    cache: ViewCache,
}

impl GraphView {
    /// Builds a view over `events` with the default backend.
    pub fn new(events: Vec<Event>, time_delta: TimeDelta) -> Result<Self> {
        Self::with_config(events, GraphConfig::new().time_delta(time_delta))
    }

    /// Builds a view over `events` using `config`.
    ///
    /// Fails when `events` is empty or feature shapes disagree.
    pub fn with_config(events: Vec<Event>, config: GraphConfig) -> Result<Self> {
        if events.is_empty() {
            return Err(DgError::invalid("cannot build a graph from an empty event list"));
        }
        let storage = build_storage(events, &config.storage)?;
        debug!(
            backend = %storage.kind(),
            events = storage.len(),
            time_delta = %config.time_delta,
            "graph.view.built"
        );
        Ok(Self::from_storage(Arc::from(storage), config.time_delta))
    }

    /// Wraps an existing backend in an unconstrained view.
    pub fn from_storage(storage: Arc<dyn DgStorage>, time_delta: TimeDelta) -> Self {
        Self {
            storage,
            slice: SliceTracker::full(),
            time_delta,
            cache: ViewCache::default(),
        }
    }

    /// Reads an edge list and builds a view over it.
    pub fn from_csv(path: impl AsRef<Path>, csv: &CsvOptions, config: GraphConfig) -> Result<Self> {
        let events = read_csv(path, csv)?;
        Self::with_config(events, config)
    }

    fn narrowed(&self, slice: SliceTracker) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            slice,
            time_delta: self.time_delta,
            cache: ViewCache::default(),
        }
    }

    /// Storage shared by this view.
    pub fn storage(&self) -> &Arc<dyn DgStorage> {
        &self.storage
    }

    /// Active slice.
    pub fn slice(&self) -> &SliceTracker {
        &self.slice
    }

    /// Timestamp granularity.
    pub fn time_delta(&self) -> TimeDelta {
        self.time_delta
    }

    /// Storage-wide stats when the view is unconstrained.
    fn full_stats(&self) -> Option<&StorageStats> {
        self.slice.is_unconstrained().then(|| self.storage.stats())
    }

    /// Earliest event time in the view.
    pub fn start_time(&self) -> Option<Time> {
        *self.cache.start_time.get_or_init(|| match self.full_stats() {
            Some(stats) => stats.start_time,
            None => self.storage.get_start_time(&self.slice),
        })
    }

    /// Latest event time in the view (inclusive).
    pub fn end_time(&self) -> Option<Time> {
        *self.cache.end_time.get_or_init(|| match self.full_stats() {
            Some(stats) => stats.end_time,
            None => self.storage.get_end_time(&self.slice),
        })
    }

    /// `max(node id) + 1` over the view.
    pub fn num_nodes(&self) -> usize {
        *self.cache.num_nodes.get_or_init(|| match self.full_stats() {
            Some(stats) => stats.num_nodes,
            None => self.storage.get_num_nodes(&self.slice),
        })
    }

    /// Distinct `(time, src, dst)` triples in the view.
    pub fn num_edges(&self) -> usize {
        *self.cache.num_edges.get_or_init(|| match self.full_stats() {
            Some(stats) => stats.num_edges,
            None => self.storage.get_num_edges(&self.slice),
        })
    }

    /// Distinct timestamps in the view.
    pub fn num_timestamps(&self) -> usize {
        *self.cache.num_timestamps.get_or_init(|| match self.full_stats() {
            Some(stats) => stats.num_timestamps,
            None => self.storage.get_num_timestamps(&self.slice),
        })
    }

    /// Events in the view, duplicates included.
    pub fn num_events(&self) -> usize {
        *self.cache.num_events.get_or_init(|| match self.full_stats() {
            Some(stats) => stats.num_events,
            None => self.storage.get_num_events(&self.slice),
        })
    }

    /// Smallest gap between consecutive distinct timestamps.
    pub fn time_granularity(&self) -> Option<Time> {
        *self.cache.time_granularity.get_or_init(|| match self.full_stats() {
            Some(stats) => stats.time_granularity,
            None => self.storage.get_time_granularity(&self.slice),
        })
    }

    /// Number of distinct timestamps, matching `num_timestamps`.
    pub fn len(&self) -> usize {
        self.num_timestamps()
    }

    /// Whether the view holds no events.
    pub fn is_empty(&self) -> bool {
        self.num_events() == 0
    }

    /// Node ids touched by events in the view.
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        self.cache
            .nodes
            .get_or_init(|| self.storage.get_nodes(&self.slice))
    }

    /// Edge endpoint and time vectors in time order.
    pub fn edges(&self) -> &EdgeTensors {
        self.cache
            .edges
            .get_or_init(|| self.storage.get_edges(&self.slice))
    }

    /// Dynamic node features indexed by `(time, node)`.
    pub fn node_feats(&self) -> Result<Option<&SparseTensor>> {
        get_or_try_init(&self.cache.node_feats, || {
            self.storage.get_dynamic_node_feats(&self.slice)
        })
        .map(Option::as_ref)
    }

    /// Alias of [`GraphView::node_feats`].
    pub fn dynamic_node_feats(&self) -> Result<Option<&SparseTensor>> {
        self.node_feats()
    }

    /// Edge features indexed by `(time, src, dst)`.
    pub fn edge_feats(&self) -> Result<Option<&SparseTensor>> {
        get_or_try_init(&self.cache.edge_feats, || self.storage.get_edge_feats(&self.slice))
            .map(Option::as_ref)
    }

    /// Static per-node feature table.
    pub fn static_node_feats(&self) -> Option<&Array2<f32>> {
        self.storage.static_node_feats()
    }

    /// Node feature shape established by the storage.
    pub fn node_feats_shape(&self) -> Option<&[usize]> {
        self.storage.node_feats_shape()
    }

    /// Edge feature shape established by the storage.
    pub fn edge_feats_shape(&self) -> Option<&[usize]> {
        self.storage.edge_feats_shape()
    }

    /// Flattened node feature length.
    pub fn node_feats_dim(&self) -> Option<usize> {
        self.node_feats_shape().map(|s| s.iter().product())
    }

    /// Flattened edge feature length.
    pub fn edge_feats_dim(&self) -> Option<usize> {
        self.edge_feats_shape().map(|s| s.iter().product())
    }

    /// Column count of the static node table.
    pub fn static_node_feats_dim(&self) -> Option<usize> {
        self.static_node_feats().map(Array2::ncols)
    }

    /// Events in the view, in time order.
    pub fn to_events(&self) -> Vec<Event> {
        self.storage.to_events(&self.slice)
    }

    /// One-hop neighbours of `nodes` inside the view.
    pub fn nbrs(&self, nodes: &[NodeId], num_hops: usize) -> Result<Neighbors> {
        self.storage.get_nbrs(nodes, num_hops, &self.slice)
    }

    /// New view bounded to `[start, end)` intersected with the current bounds.
    pub fn slice_time(&self, start: Option<Time>, end: Option<Time>) -> Result<Self> {
        let bounds = SliceTracker::time_range(start, end)?;
        Ok(self.narrowed(self.slice.intersect_time(bounds.start_time, bounds.end_time)))
    }

    /// New view restricted to events touching `nodes`.
    ///
    /// Time bounds tighten to the matching events but never widen past the
    /// parent's bounds.
    pub fn slice_nodes(&self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let wanted: BTreeSet<NodeId> = nodes.into_iter().collect();
        let mut slice = self.slice.intersect_nodes(&wanted);
        let start = self.storage.get_start_time(&slice);
        let end = self.storage.get_end_time(&slice);
        if let (Some(start), Some(end)) = (start, end) {
            slice = slice.intersect_time(Some(start), end.checked_add(1));
        }
        self.narrowed(slice)
    }

    /// New view bounded to global event indices `[start, end]` (inclusive).
    pub fn slice_events(&self, start: Option<usize>, end: Option<usize>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(DgError::invalid(format!(
                    "start_idx ({s}) must be <= end_idx ({e})"
                )));
            }
        }
        Ok(self.narrowed(self.slice.intersect_idx(start, end)))
    }

    /// Global event indices matching the view, ascending.
    pub fn event_indices(&self) -> Vec<usize> {
        self.storage.event_indices(&self.slice)
    }

    /// New view over a coarsened copy of this view's events.
    ///
    /// Events are re-bucketed from the current granularity into `target`
    /// and duplicate keys in a bin are merged with `agg`.
    pub fn temporal_coarsening(&self, target: TimeDelta, agg: AggFunc) -> Result<Self> {
        let storage =
            self.storage
                .temporal_coarsening(&self.slice, &self.time_delta, &target, agg)?;
        Ok(Self::from_storage(Arc::from(storage), target))
    }

    /// Adds events to the underlying storage.
    ///
    /// Only allowed while this view is the sole owner of its storage.
    pub fn append(&mut self, events: Vec<Event>) -> Result<()> {
        let storage = Arc::get_mut(&mut self.storage).ok_or_else(|| {
            DgError::invalid("cannot append to storage shared with other views")
        })?;
        storage.append(events)?;
        self.cache = ViewCache::default();
        Ok(())
    }

    /// Converts the view into tensors.
    ///
    /// Features are included only when requested and present.
    pub fn materialize(&self, include_features: bool) -> Result<DgBatch> {
        let edges = self.edges().clone();
        let mut batch = DgBatch {
            src: edges.src,
            dst: edges.dst,
            time: edges.time,
            ..DgBatch::default()
        };
        if !include_features {
            return Ok(batch);
        }
        batch.static_node_feats = self.static_node_feats().cloned();
        if let Some(feats) = self.node_feats()? {
            batch.node_times = Some(feats.index_row(0));
            batch.node_ids = Some(feats.index_row(1));
            batch.dynamic_node_feats = Some(feats.values().clone());
        }
        if let Some(feats) = self.edge_feats()? {
            batch.edge_feats = Some(feats.values().clone());
        }
        Ok(batch)
    }
}

impl fmt::Debug for GraphView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphView")
            .field("backend", &self.storage.kind())
            .field("slice", &self.slice)
            .field("time_delta", &self.time_delta)
            .finish()
    }
}

impl fmt::Display for GraphView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.storage.kind() {
            crate::storage::BackendKind::Bucket => "BucketStorage",
            crate::storage::BackendKind::EventList => "EventListStorage",
        };
        write!(f, "GraphView(storage={name}, time_delta={})", self.time_delta)
    }
}
