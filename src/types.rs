//! Primitive identifiers shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Event timestamp expressed in units of the graph's [`crate::TimeDelta`].
///
/// Negative values are allowed; only relative order matters.
pub type Time = i64;

/// Dense, non-negative node identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Largest id storage accepts; every id must fit a signed tensor index.
    pub const MAX: NodeId = NodeId(i64::MAX as u64);

    /// Returns the id as a tensor index value, saturating above [`NodeId::MAX`].
    #[inline]
    pub fn as_i64(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Returns the id as an array offset, saturating where `usize` is narrower.
    #[inline]
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }

    /// Size of a dense id space holding this id (`id + 1`), saturating.
    #[inline]
    pub fn extent(self) -> usize {
        self.as_usize().saturating_add(1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        NodeId(value)
    }
}

impl From<NodeId> for u64 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}
