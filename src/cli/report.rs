use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::graph::GraphView;
use crate::io::{write_csv, CsvOptions};
use crate::loader::DgLoader;
use crate::storage::AggFunc;
use crate::timedelta::TimeDelta;
use crate::types::Time;

/// Summary of a graph view.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Storage backend name.
    pub backend: String,
    /// Timestamp granularity.
    pub time_delta: String,
    /// Earliest event time.
    pub start_time: Option<Time>,
    /// Latest event time.
    pub end_time: Option<Time>,
    /// `max(node id) + 1`.
    pub num_nodes: usize,
    /// Distinct `(time, src, dst)` triples.
    pub num_edges: usize,
    /// Events, duplicates included.
    pub num_events: usize,
    /// Distinct timestamps.
    pub num_timestamps: usize,
    /// Smallest gap between consecutive timestamps.
    pub time_granularity: Option<Time>,
    /// Per-event node feature shape.
    pub node_feats_shape: Option<Vec<usize>>,
    /// Per-event edge feature shape.
    pub edge_feats_shape: Option<Vec<usize>>,
    /// Width of the static node table.
    pub static_node_feats_dim: Option<usize>,
}

/// One emitted batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Position in the loader.
    pub index: usize,
    /// Edges in the batch.
    pub edges: usize,
    /// Time of the first edge.
    pub first_time: Option<Time>,
    /// Time of the last edge.
    pub last_time: Option<Time>,
    /// Rows of materialized edge features.
    pub edge_feats_rows: Option<usize>,
}

/// Outcome of a coarsening run.
#[derive(Debug, Clone, Serialize)]
pub struct CoarsenReport {
    /// Events before coarsening.
    pub source_events: usize,
    /// Events after coarsening.
    pub coarse_events: usize,
    /// Target time delta.
    pub time_delta: String,
    /// Aggregation applied to merged features.
    pub agg: String,
    /// Output path.
    pub out: String,
}

/// Collects the headline numbers of `view`.
pub fn stats_report(view: &GraphView) -> StatsReport {
    StatsReport {
        backend: view.storage().kind().to_string(),
        time_delta: view.time_delta().to_string(),
        start_time: view.start_time(),
        end_time: view.end_time(),
        num_nodes: view.num_nodes(),
        num_edges: view.num_edges(),
        num_events: view.num_events(),
        num_timestamps: view.num_timestamps(),
        time_granularity: view.time_granularity(),
        node_feats_shape: view.node_feats_shape().map(<[usize]>::to_vec),
        edge_feats_shape: view.edge_feats_shape().map(<[usize]>::to_vec),
        static_node_feats_dim: view.static_node_feats_dim(),
    }
}

/// Drains `loader`, summarizing each batch.
pub fn batch_reports(loader: DgLoader) -> Result<Vec<BatchReport>> {
    loader
        .enumerate()
        .map(|(index, batch)| {
            let batch = batch?;
            Ok(BatchReport {
                index,
                edges: batch.len(),
                first_time: batch.time.first().copied(),
                last_time: batch.time.last().copied(),
                edge_feats_rows: batch.edge_feats.as_ref().map(|f| f.shape()[0]),
            })
        })
        .collect()
}

/// Coarsens `view` into `target` and writes the resulting edge list.
pub fn coarsen_to_csv(
    view: &GraphView,
    target: TimeDelta,
    agg: AggFunc,
    out: &Path,
    csv: &CsvOptions,
) -> Result<CoarsenReport> {
    let coarse = view.temporal_coarsening(target, agg)?;
    let events = coarse.to_events();
    write_csv(&events, out, csv)?;
    Ok(CoarsenReport {
        source_events: view.num_events(),
        coarse_events: events.len(),
        time_delta: target.to_string(),
        agg: agg.to_string(),
        out: out.display().to_string(),
    })
}
