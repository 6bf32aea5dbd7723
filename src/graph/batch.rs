use ndarray::{Array1, Array2, ArrayD};

/// Tensors materialized from one view, ready for a model to consume.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DgBatch {
    /// Edge sources, in time order.
    pub src: Array1<i64>,
    /// Edge destinations, aligned with `src`.
    pub dst: Array1<i64>,
    /// Edge timestamps, aligned with `src`.
    pub time: Array1<i64>,
    /// Static per-node table, if the graph has one.
    pub static_node_feats: Option<Array2<f32>>,
    /// Node feature rows of shape `(n, *node_feature_shape)`.
    pub dynamic_node_feats: Option<ArrayD<f32>>,
    /// Timestamp of each row of `dynamic_node_feats`.
    pub node_times: Option<Array1<i64>>,
    /// Node id of each row of `dynamic_node_feats`.
    pub node_ids: Option<Array1<i64>>,
    /// Edge feature rows of shape `(m, *edge_feature_shape)`, one per distinct
    /// `(time, src, dst)` in index order.
    pub edge_feats: Option<ArrayD<f32>>,
}

impl DgBatch {
    /// Number of edges in the batch.
    pub fn len(&self) -> usize {
        self.src.len()
    }

    /// Whether the batch has no edges.
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }
}
