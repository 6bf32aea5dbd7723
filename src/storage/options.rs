use ndarray::Array2;

use crate::error::Result;
use crate::events::Event;
use crate::storage::backend::{BackendKind, DgStorage};
use crate::storage::bucket::BucketStorage;
use crate::storage::event_list::EventListStorage;

/// Configuration supplied when building a storage backend.
#[derive(Clone, Debug, Default)]
pub struct StorageOptions {
    /// Backend implementation to build.
    pub backend: BackendKind,
    /// Per-node feature table of shape `(num_nodes, d_static)`.
    pub static_node_feats: Option<Array2<f32>>,
}

impl StorageOptions {
    /// Creates options with the default backend and no static features.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the backend implementation.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Attaches a static node feature table.
    ///
    /// The table needs at least one row per node id the events mention.
    pub fn static_node_feats(mut self, feats: Array2<f32>) -> Self {
        self.static_node_feats = Some(feats);
        self
    }
}

/// Builds the configured backend over `events`.
pub fn build_storage(events: Vec<Event>, options: &StorageOptions) -> Result<Box<dyn DgStorage>> {
    let feats = options.static_node_feats.clone();
    Ok(match options.backend {
        BackendKind::Bucket => Box::new(BucketStorage::new(events, feats)?),
        BackendKind::EventList => Box::new(EventListStorage::new(events, feats)?),
    })
}
