use crate::storage::{BackendKind, StorageOptions};
use crate::timedelta::TimeDelta;

/// Construction-time settings for a [`super::GraphView`].
#[derive(Clone, Debug, Default)]
pub struct GraphConfig {
    /// Backend selection and static node features.
    pub storage: StorageOptions,
    /// Granularity of the event timestamps; ordered when unspecified.
    pub time_delta: TimeDelta,
}

impl GraphConfig {
    /// Creates a config with the default backend and ordered time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timestamp granularity.
    pub fn time_delta(mut self, time_delta: TimeDelta) -> Self {
        self.time_delta = time_delta;
        self
    }

    /// Selects the storage backend.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.storage = self.storage.backend(backend);
        self
    }

    /// Replaces the storage options wholesale.
    pub fn storage(mut self, storage: StorageOptions) -> Self {
        self.storage = storage;
        self
    }
}
