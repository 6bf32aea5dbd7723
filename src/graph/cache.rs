use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::error::Result;
use crate::tensor::{EdgeTensors, SparseTensor};
use crate::types::{NodeId, Time};

/// Per-view memo table.
///
/// Every cell is filled at most once for the lifetime of the view. Slicing
/// creates a new view with a new table, so entries never go stale.
#[derive(Clone, Debug, Default)]
pub(crate) struct ViewCache {
    pub start_time: OnceLock<Option<Time>>,
    pub end_time: OnceLock<Option<Time>>,
    pub num_nodes: OnceLock<usize>,
    pub num_edges: OnceLock<usize>,
    pub num_timestamps: OnceLock<usize>,
    pub num_events: OnceLock<usize>,
    pub time_granularity: OnceLock<Option<Time>>,
    pub nodes: OnceLock<BTreeSet<NodeId>>,
    pub edges: OnceLock<EdgeTensors>,
    pub node_feats: OnceLock<Option<SparseTensor>>,
    pub edge_feats: OnceLock<Option<SparseTensor>>,
}

/// Fills `cell` from a fallible initializer, leaving it empty on error.
pub(crate) fn get_or_try_init<T>(cell: &OnceLock<T>, init: impl FnOnce() -> Result<T>) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}
