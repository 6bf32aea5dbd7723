use ndarray::Array2;
use tracing::debug;

use crate::error::{DgError, FeatureKind, Result};
use crate::events::Event;
use crate::types::NodeId;

/// Feature shapes established by the events a storage has ingested.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct FeatureShapes {
    pub node: Option<Vec<usize>>,
    pub edge: Option<Vec<usize>>,
}

impl FeatureShapes {
    /// Checks that all featured events of each kind agree on shape.
    pub fn from_events(events: &[Event]) -> Result<Self> {
        Ok(Self {
            node: check_kind(events, FeatureKind::Node, None)?,
            edge: check_kind(events, FeatureKind::Edge, None)?,
        })
    }

    /// Validates `events` against the shapes already established.
    ///
    /// On empty storage the incoming shapes become authoritative.
    pub fn admit(&self, events: &[Event], storage_empty: bool) -> Result<Self> {
        let (node, edge) = if storage_empty {
            (None, None)
        } else {
            (self.node.clone(), self.edge.clone())
        };
        let admitted = Self {
            node: check_kind(events, FeatureKind::Node, node)?,
            edge: check_kind(events, FeatureKind::Edge, edge)?,
        };
        if storage_empty && admitted != *self {
            debug!(
                node = ?admitted.node,
                edge = ?admitted.edge,
                "storage.features.adopted"
            );
        }
        Ok(admitted)
    }
}

fn check_kind(
    events: &[Event],
    kind: FeatureKind,
    mut expected: Option<Vec<usize>>,
) -> Result<Option<Vec<usize>>> {
    for event in events.iter().filter(|e| e.kind() == kind) {
        let Some(features) = event.features() else {
            continue;
        };
        match &expected {
            None => expected = Some(features.shape().to_vec()),
            Some(shape) if shape.as_slice() != features.shape() => {
                return Err(DgError::FeatureShapeMismatch {
                    kind,
                    expected: shape.clone(),
                    actual: features.shape().to_vec(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(expected)
}

/// Rejects node ids that do not fit a signed tensor index.
pub(crate) fn check_node_ids(events: &[Event]) -> Result<()> {
    match events.iter().map(Event::max_node).max() {
        Some(id) if id > NodeId::MAX => Err(DgError::invalid(format!(
            "node id {id} exceeds the largest supported id {}",
            NodeId::MAX
        ))),
        _ => Ok(()),
    }
}

/// Checks that static node features have a row for every node id.
pub(crate) fn check_static_rows(feats: Option<&Array2<f32>>, num_nodes: usize) -> Result<()> {
    let Some(feats) = feats else {
        return Ok(());
    };
    if feats.nrows() < num_nodes {
        return Err(DgError::FeatureShapeMismatch {
            kind: FeatureKind::StaticNode,
            expected: vec![num_nodes, feats.ncols()],
            actual: feats.shape().to_vec(),
        });
    }
    Ok(())
}
