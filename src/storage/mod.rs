//! Event storage backends and the query contract they share.
//!
//! Every backend implements [`DgStorage`]. Queries take a [`SliceTracker`]
//! describing the active view, so many views can share one backend.

mod backend;
mod bucket;
mod coarsen;
mod event_list;
mod features;
mod options;
mod slice;

pub use backend::{BackendKind, DgStorage, Neighbors, StorageStats};
pub use bucket::BucketStorage;
pub use coarsen::AggFunc;
pub use event_list::EventListStorage;
pub use options::{build_storage, StorageOptions};
pub use slice::SliceTracker;
