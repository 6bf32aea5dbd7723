//! Error taxonomy shared by every module.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DgError>;

/// Which family of features a shape check refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FeatureKind {
    /// Features carried by node events.
    Node,
    /// Features carried by edge events.
    Edge,
    /// Per-node features supplied outside the event stream.
    StaticNode,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Node => f.write_str("node"),
            FeatureKind::Edge => f.write_str("edge"),
            FeatureKind::StaticNode => f.write_str("static node"),
        }
    }
}

/// Errors raised by storage, views, loaders and the I/O collaborators.
#[derive(Debug, Error)]
pub enum DgError {
    /// A constructor or query argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Two events of the same kind disagree on feature shape.
    #[error("{kind} feature shape mismatch: expected {expected:?}, got {actual:?}")]
    FeatureShapeMismatch {
        /// Feature family that was being checked.
        kind: FeatureKind,
        /// Shape already established by the storage.
        expected: Vec<usize>,
        /// Offending shape.
        actual: Vec<usize>,
    },
    /// The operation exists in the interface but is not implemented.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    /// I/O error from a file collaborator.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// CSV parsing or writing error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl DgError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DgError::InvalidArgument(msg.into())
    }
}
