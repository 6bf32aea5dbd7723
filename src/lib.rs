//! Temporal graph data model.
//!
//! A dynamic graph is an ordered stream of timestamped node and edge
//! [`Event`]s held by a pluggable [`DgStorage`] backend. A [`GraphView`]
//! pairs the storage with a [`SliceTracker`] and answers cached queries;
//! slicing a view narrows the tracker without copying events. A [`DgLoader`]
//! walks a view in fixed windows and materializes each one into a
//! [`DgBatch`] of tensors.

#![warn(missing_docs)]

pub mod baseline;
pub mod cli;
pub mod error;
pub mod events;
pub mod graph;
pub mod io;
pub mod loader;
pub mod storage;
pub mod tensor;
pub mod timedelta;
pub mod types;

pub use error::{DgError, FeatureKind, Result};
pub use events::{EdgeEvent, Event, NodeEvent};
pub use graph::{DgBatch, GraphConfig, GraphView};
pub use loader::{BatchHook, DgLoader, LoaderOptions};
pub use storage::{
    build_storage, AggFunc, BackendKind, BucketStorage, DgStorage, EventListStorage, SliceTracker,
    StorageOptions, StorageStats,
};
pub use tensor::{EdgeTensors, SparseTensor};
pub use timedelta::{TimeDelta, TimeUnit};
pub use types::{NodeId, Time};
