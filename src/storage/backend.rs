use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::OnceLock;

use ndarray::Array2;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DgError, Result};
use crate::events::Event;
use crate::storage::coarsen::{coarsen_events, AggFunc, BinScale};
use crate::storage::slice::SliceTracker;
use crate::tensor::{EdgeTensors, SparseTensor};
use crate::timedelta::TimeDelta;
use crate::types::{NodeId, Time};

/// Available storage implementations.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Events bucketed by timestamp in an ordered map. Canonical backend.
    #[default]
    Bucket,
    /// Flat event vector kept sorted by time.
    EventList,
}

impl BackendKind {
    /// Every backend, in preference order.
    pub const ALL: [BackendKind; 2] = [BackendKind::Bucket, BackendKind::EventList];

    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Bucket => "bucket",
            BackendKind::EventList => "list",
        }
    }
}

impl FromStr for BackendKind {
    type Err = DgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bucket" | "dict" | "dictionary" => Ok(BackendKind::Bucket),
            "list" | "array" | "event_list" => Ok(BackendKind::EventList),
            other => Err(DgError::invalid(format!("unknown storage backend '{other}'"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derived scalars for a set of events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Earliest event time.
    pub start_time: Option<Time>,
    /// Latest event time (inclusive).
    pub end_time: Option<Time>,
    /// `max(node id) + 1`, or 0 when there are no events.
    pub num_nodes: usize,
    /// Distinct `(time, src, dst)` triples.
    pub num_edges: usize,
    /// Distinct timestamps.
    pub num_timestamps: usize,
    /// Events, duplicates included.
    pub num_events: usize,
    /// Smallest gap between consecutive distinct timestamps.
    pub time_granularity: Option<Time>,
}

impl StorageStats {
    /// Computes every scalar in a single pass over the matching events.
    pub fn compute<S: DgStorage + ?Sized>(storage: &S, slice: &SliceTracker) -> Self {
        let mut stats = StorageStats::default();
        let mut max_node: Option<NodeId> = None;
        let mut edges: FxHashSet<(Time, NodeId, NodeId)> = FxHashSet::default();
        let mut prev_time: Option<Time> = None;
        storage.for_each_event(slice, &mut |_, event| {
            let time = event.time();
            stats.num_events += 1;
            if stats.start_time.is_none() {
                stats.start_time = Some(time);
            }
            stats.end_time = Some(time);
            if prev_time != Some(time) {
                stats.num_timestamps += 1;
                if let Some(prev) = prev_time {
                    let gap = time - prev;
                    stats.time_granularity =
                        Some(stats.time_granularity.map_or(gap, |g| g.min(gap)));
                }
                prev_time = Some(time);
            }
            max_node = max_node.max(Some(event.max_node()));
            if let Event::Edge(edge) = event {
                edges.insert((time, edge.src, edge.dst));
            }
            ControlFlow::Continue(())
        });
        stats.num_nodes = max_node.map_or(0, NodeId::extent);
        stats.num_edges = edges.len();
        stats
    }
}

/// Neighbour lists keyed by the queried node.
pub type Neighbors = BTreeMap<NodeId, Vec<(NodeId, Time)>>;

/// Contract every temporal-graph storage backend satisfies.
///
/// A backend owns the authoritative events and exposes them in time order
/// (ties in insertion order) through [`DgStorage::for_each_event`]. All
/// queries are provided methods built on that visitor, so every backend
/// answers them identically:
///
/// - time bounds are half-open, `[start_time, end_time)`;
/// - a node filter keeps events touching at least one member node;
/// - `num_nodes` is `max(node id) + 1`, not the count of distinct ids;
/// - `num_edges` counts distinct `(time, src, dst)` triples while
///   `num_events` counts every event;
/// - sparse features keep the last write on index collisions.
///
/// Backends may override a provided query when an index answers it faster,
/// but the result must not change.
pub trait DgStorage: Send + Sync + fmt::Debug {
    /// Backend implementation tag.
    fn kind(&self) -> BackendKind;

    /// Visits `(global index, event)` for every event matching `slice`, in time order.
    fn for_each_event(
        &self,
        slice: &SliceTracker,
        visit: &mut dyn FnMut(usize, &Event) -> ControlFlow<()>,
    );

    /// Total number of stored events.
    fn len(&self) -> usize;

    /// Whether the storage holds no events.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Memo cell for [`DgStorage::stats`]; reset whenever events change.
    fn stats_cell(&self) -> &OnceLock<StorageStats>;

    /// Shape shared by every node feature tensor, if any node event has features.
    fn node_feats_shape(&self) -> Option<&[usize]>;

    /// Shape shared by every edge feature tensor, if any edge event has features.
    fn edge_feats_shape(&self) -> Option<&[usize]>;

    /// Per-node features that live outside the event stream.
    fn static_node_feats(&self) -> Option<&Array2<f32>>;

    /// Adds events, failing on feature-shape conflicts.
    fn append(&mut self, events: Vec<Event>) -> Result<()>;

    /// Creates a fresh backend of the same kind over `events`.
    ///
    /// Static node features carry over.
    fn rebuild(&self, events: Vec<Event>) -> Result<Box<dyn DgStorage>>;

    /// Scalars over the whole storage, computed once.
    fn stats(&self) -> &StorageStats {
        self.stats_cell()
            .get_or_init(|| StorageStats::compute(self, &SliceTracker::full()))
    }

    /// Matching events in time order.
    fn to_events(&self, slice: &SliceTracker) -> Vec<Event> {
        let mut out = Vec::new();
        self.for_each_event(slice, &mut |_, event| {
            out.push(event.clone());
            ControlFlow::Continue(())
        });
        out
    }

    /// Global indices of matching events, ascending.
    fn event_indices(&self, slice: &SliceTracker) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_event(slice, &mut |idx, _| {
            out.push(idx);
            ControlFlow::Continue(())
        });
        out
    }

    /// Earliest matching time.
    fn get_start_time(&self, slice: &SliceTracker) -> Option<Time> {
        scan_start_time(self, slice)
    }

    /// Latest matching time (inclusive).
    fn get_end_time(&self, slice: &SliceTracker) -> Option<Time> {
        scan_end_time(self, slice)
    }

    /// Every node touched by a matching event.
    fn get_nodes(&self, slice: &SliceTracker) -> BTreeSet<NodeId> {
        let mut nodes = BTreeSet::new();
        self.for_each_event(slice, &mut |_, event| {
            event.for_each_node(|n| {
                nodes.insert(n);
            });
            ControlFlow::Continue(())
        });
        nodes
    }

    /// `max(node id) + 1` over matching events.
    fn get_num_nodes(&self, slice: &SliceTracker) -> usize {
        let mut max_node: Option<NodeId> = None;
        self.for_each_event(slice, &mut |_, event| {
            max_node = max_node.max(Some(event.max_node()));
            ControlFlow::Continue(())
        });
        max_node.map_or(0, NodeId::extent)
    }

    /// Distinct `(time, src, dst)` triples among matching edge events.
    fn get_num_edges(&self, slice: &SliceTracker) -> usize {
        let mut edges: FxHashSet<(Time, NodeId, NodeId)> = FxHashSet::default();
        self.for_each_event(slice, &mut |_, event| {
            if let Event::Edge(edge) = event {
                edges.insert((edge.time, edge.src, edge.dst));
            }
            ControlFlow::Continue(())
        });
        edges.len()
    }

    /// Distinct timestamps among matching events.
    fn get_num_timestamps(&self, slice: &SliceTracker) -> usize {
        let mut count = 0usize;
        let mut prev: Option<Time> = None;
        self.for_each_event(slice, &mut |_, event| {
            if prev != Some(event.time()) {
                count += 1;
                prev = Some(event.time());
            }
            ControlFlow::Continue(())
        });
        count
    }

    /// Matching events, duplicates included.
    fn get_num_events(&self, slice: &SliceTracker) -> usize {
        let mut count = 0usize;
        self.for_each_event(slice, &mut |_, _| {
            count += 1;
            ControlFlow::Continue(())
        });
        count
    }

    /// Smallest gap between consecutive distinct matching timestamps.
    fn get_time_granularity(&self, slice: &SliceTracker) -> Option<Time> {
        let mut gran: Option<Time> = None;
        let mut prev: Option<Time> = None;
        self.for_each_event(slice, &mut |_, event| {
            let time = event.time();
            match prev {
                Some(p) if p == time => {}
                Some(p) => {
                    gran = Some(gran.map_or(time - p, |g| g.min(time - p)));
                    prev = Some(time);
                }
                None => prev = Some(time),
            }
            ControlFlow::Continue(())
        });
        gran
    }

    /// One `(src, dst, time)` row per matching edge event, in time order.
    fn get_edges(&self, slice: &SliceTracker) -> EdgeTensors {
        let mut rows = Vec::new();
        self.for_each_event(slice, &mut |_, event| {
            if let Event::Edge(edge) = event {
                rows.push((edge.src.as_i64(), edge.dst.as_i64(), edge.time));
            }
            ControlFlow::Continue(())
        });
        EdgeTensors::from_rows(&rows)
    }

    /// Node features indexed by `(time, node)`; alias of [`DgStorage::get_dynamic_node_feats`].
    fn get_node_feats(&self, slice: &SliceTracker) -> Result<Option<SparseTensor>> {
        self.get_dynamic_node_feats(slice)
    }

    /// Node features indexed by `(time, node)`.
    ///
    /// Shape is `(max time + 1, max node + 1, *feature_shape)` over matching events.
    /// Fails when a featured event has a negative timestamp.
    fn get_dynamic_node_feats(&self, slice: &SliceTracker) -> Result<Option<SparseTensor>> {
        let Some(feat_shape) = self.node_feats_shape().map(<[usize]>::to_vec) else {
            return Ok(None);
        };
        let mut entries = Vec::new();
        let (mut max_time, mut max_node) = (None::<Time>, None::<NodeId>);
        self.for_each_event(slice, &mut |_, event| {
            max_time = max_time.max(Some(event.time()));
            max_node = max_node.max(Some(event.max_node()));
            if let Event::Node(node) = event {
                if let Some(features) = &node.features {
                    entries.push((vec![node.time, node.node_id.as_i64()], features.clone()));
                }
            }
            ControlFlow::Continue(())
        });
        if entries.is_empty() {
            return Ok(None);
        }
        let t_dim = time_extent(entries.iter().map(|(idx, _)| idx[0]).min(), max_time)?;
        let v_dim = max_node.map_or(0, NodeId::extent);
        SparseTensor::from_entries(entries, vec![t_dim, v_dim], &feat_shape).map(Some)
    }

    /// Edge features indexed by `(time, src, dst)`.
    ///
    /// Shape is `(max time + 1, V, V, *feature_shape)` with `V = max node + 1`.
    /// Fails when a featured event has a negative timestamp.
    fn get_edge_feats(&self, slice: &SliceTracker) -> Result<Option<SparseTensor>> {
        let Some(feat_shape) = self.edge_feats_shape().map(<[usize]>::to_vec) else {
            return Ok(None);
        };
        let mut entries = Vec::new();
        let (mut max_time, mut max_node) = (None::<Time>, None::<NodeId>);
        self.for_each_event(slice, &mut |_, event| {
            max_time = max_time.max(Some(event.time()));
            max_node = max_node.max(Some(event.max_node()));
            if let Event::Edge(edge) = event {
                if let Some(features) = &edge.features {
                    entries.push((
                        vec![edge.time, edge.src.as_i64(), edge.dst.as_i64()],
                        features.clone(),
                    ));
                }
            }
            ControlFlow::Continue(())
        });
        if entries.is_empty() {
            return Ok(None);
        }
        let t_dim = time_extent(entries.iter().map(|(idx, _)| idx[0]).min(), max_time)?;
        let v_dim = max_node.map_or(0, NodeId::extent);
        SparseTensor::from_entries(entries, vec![t_dim, v_dim, v_dim], &feat_shape).map(Some)
    }

    /// One-hop neighbours of `nodes` among matching edge events.
    ///
    /// Both edge directions count. Nodes without neighbours are omitted.
    fn get_nbrs(&self, nodes: &[NodeId], num_hops: usize, slice: &SliceTracker) -> Result<Neighbors> {
        if num_hops != 1 {
            return Err(DgError::Unsupported("multi-hop neighbour queries"));
        }
        let wanted: BTreeSet<NodeId> = nodes.iter().copied().collect();
        let mut nbrs = Neighbors::new();
        self.for_each_event(slice, &mut |_, event| {
            if let Event::Edge(edge) = event {
                if wanted.contains(&edge.src) {
                    nbrs.entry(edge.src).or_default().push((edge.dst, edge.time));
                }
                if wanted.contains(&edge.dst) {
                    nbrs.entry(edge.dst).or_default().push((edge.src, edge.time));
                }
            }
            ControlFlow::Continue(())
        });
        Ok(nbrs)
    }

    /// New backend restricted to `[start, end)`.
    fn slice_time(&self, start: Option<Time>, end: Option<Time>) -> Result<Box<dyn DgStorage>> {
        let slice = SliceTracker::time_range(start, end)?;
        self.rebuild(self.to_events(&slice))
    }

    /// New backend restricted to events touching `nodes`.
    fn slice_nodes(&self, nodes: &[NodeId]) -> Result<Box<dyn DgStorage>> {
        let slice = SliceTracker::nodes(nodes.iter().copied());
        self.rebuild(self.to_events(&slice))
    }

    /// New backend with matching events re-bucketed from `source` into `target` units.
    fn temporal_coarsening(
        &self,
        slice: &SliceTracker,
        source: &TimeDelta,
        target: &TimeDelta,
        agg: AggFunc,
    ) -> Result<Box<dyn DgStorage>> {
        let events = self.to_events(slice);
        if events.is_empty() {
            return Err(DgError::invalid("cannot coarsen an empty graph"));
        }
        let scale = BinScale::new(source, target)?;
        let coarse = coarsen_events(&events, scale, agg)?;
        debug!(
            integral = scale.is_integral(),
            agg = agg.name(),
            before = events.len(),
            after = coarse.len(),
            "storage.coarsen"
        );
        self.rebuild(coarse)
    }
}

/// Earliest matching time found by scanning.
pub(crate) fn scan_start_time<S: DgStorage + ?Sized>(storage: &S, slice: &SliceTracker) -> Option<Time> {
    let mut start = None;
    storage.for_each_event(slice, &mut |_, event| {
        start = Some(event.time());
        ControlFlow::Break(())
    });
    start
}

/// Latest matching time found by scanning.
pub(crate) fn scan_end_time<S: DgStorage + ?Sized>(storage: &S, slice: &SliceTracker) -> Option<Time> {
    let mut end = None;
    storage.for_each_event(slice, &mut |_, event| {
        end = Some(event.time());
        ControlFlow::Continue(())
    });
    end
}

/// Leading tensor dimension for feature rows indexed by time.
///
/// Times index the tensor directly, so a featured event before time 0 has no row.
fn time_extent(min_featured: Option<Time>, max_time: Option<Time>) -> Result<usize> {
    if let Some(min) = min_featured.filter(|t| *t < 0) {
        return Err(DgError::invalid(format!(
            "feature tensors are indexed by time and need non-negative timestamps, got {min}"
        )));
    }
    Ok(max_time.map_or(0, |t| usize::try_from(t).map_or(usize::MAX, |t| t.saturating_add(1))))
}
