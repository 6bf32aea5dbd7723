//! Timestamped change records that make up a dynamic graph.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use ndarray::ArrayD;

use crate::error::FeatureKind;
use crate::types::{NodeId, Time};

/// A node appeared or had its features updated at `time`.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeEvent {
    /// Event timestamp.
    pub time: Time,
    /// Subject node.
    pub node_id: NodeId,
    /// Optional feature tensor of any rank.
    pub features: Option<ArrayD<f32>>,
}

/// An edge appeared or had its features updated at `time`.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeEvent {
    /// Event timestamp.
    pub time: Time,
    /// Source endpoint.
    pub src: NodeId,
    /// Destination endpoint.
    pub dst: NodeId,
    /// Optional feature tensor of any rank.
    pub features: Option<ArrayD<f32>>,
}

impl EdgeEvent {
    /// Returns the `(src, dst)` endpoint pair.
    #[inline]
    pub fn edge(&self) -> (NodeId, NodeId) {
        (self.src, self.dst)
    }
}

/// A single immutable change to the graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Node appearance or feature update.
    Node(NodeEvent),
    /// Edge appearance or feature update.
    Edge(EdgeEvent),
}

impl Event {
    /// Creates a featureless node event.
    pub fn node(time: Time, node_id: impl Into<NodeId>) -> Self {
        Event::Node(NodeEvent {
            time,
            node_id: node_id.into(),
            features: None,
        })
    }

    /// Creates a featureless edge event.
    pub fn edge(time: Time, src: impl Into<NodeId>, dst: impl Into<NodeId>) -> Self {
        Event::Edge(EdgeEvent {
            time,
            src: src.into(),
            dst: dst.into(),
            features: None,
        })
    }

    /// Attaches a feature tensor, replacing any existing one.
    pub fn with_features(mut self, features: ArrayD<f32>) -> Self {
        match &mut self {
            Event::Node(ev) => ev.features = Some(features),
            Event::Edge(ev) => ev.features = Some(features),
        }
        self
    }

    /// Event timestamp.
    #[inline]
    pub fn time(&self) -> Time {
        match self {
            Event::Node(ev) => ev.time,
            Event::Edge(ev) => ev.time,
        }
    }

    /// Feature tensor, if any.
    #[inline]
    pub fn features(&self) -> Option<&ArrayD<f32>> {
        match self {
            Event::Node(ev) => ev.features.as_ref(),
            Event::Edge(ev) => ev.features.as_ref(),
        }
    }

    /// Feature family this event contributes to.
    #[inline]
    pub fn kind(&self) -> FeatureKind {
        match self {
            Event::Node(_) => FeatureKind::Node,
            Event::Edge(_) => FeatureKind::Edge,
        }
    }

    /// Largest node id mentioned by the event.
    #[inline]
    pub fn max_node(&self) -> NodeId {
        match self {
            Event::Node(ev) => ev.node_id,
            Event::Edge(ev) => ev.src.max(ev.dst),
        }
    }

    /// Calls `f` for every node id the event mentions (one for nodes, two for edges).
    #[inline]
    pub fn for_each_node(&self, mut f: impl FnMut(NodeId)) {
        match self {
            Event::Node(ev) => f(ev.node_id),
            Event::Edge(ev) => {
                f(ev.src);
                f(ev.dst);
            }
        }
    }

    /// Whether the event touches at least one member of `nodes`.
    #[inline]
    pub fn touches(&self, nodes: &BTreeSet<NodeId>) -> bool {
        match self {
            Event::Node(ev) => nodes.contains(&ev.node_id),
            Event::Edge(ev) => nodes.contains(&ev.src) || nodes.contains(&ev.dst),
        }
    }

    /// Compares two events by timestamp only.
    #[inline]
    pub fn cmp_time(&self, other: &Event) -> Ordering {
        self.time().cmp(&other.time())
    }
}

impl From<NodeEvent> for Event {
    fn from(value: NodeEvent) -> Self {
        Event::Node(value)
    }
}

impl From<EdgeEvent> for Event {
    fn from(value: EdgeEvent) -> Self {
        Event::Edge(value)
    }
}
