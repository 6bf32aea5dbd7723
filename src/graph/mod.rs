//! Cached, sliceable views over a shared storage backend.

mod batch;
mod cache;
mod config;
mod view;

pub use batch::DgBatch;
pub use config::GraphConfig;
pub use view::GraphView;
