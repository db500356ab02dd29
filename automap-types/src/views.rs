//! Derived views served to a front end.

use std::collections::BTreeMap;

use crate::{CounterSample, Link, Node, UtilizationSnapshot};

/// A node of the visual topology graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphNode {
    /// Device name.
    pub id: String,
    pub groupx: u32,
    pub groupy: u32,
    pub image: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub system_description: String,
}

/// A deduplicated edge between two devices.
///
/// One visual edge stands for every physical link between the same unordered
/// pair of devices. `source_interfaces[i]` and `target_interfaces[i]` are the
/// two ends of the i-th physical link, so both lists always have the same
/// length.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisualEdge {
    pub source: String,
    pub target: String,
    pub source_interfaces: Vec<String>,
    pub target_interfaces: Vec<String>,

    /// Combined capacity in bits/s.
    pub speed: u64,

    /// Combined utilization in bits/s.
    pub highest_utilization: u64,

    /// `highest_utilization` as a share of `speed`, in `[0, 100]`.
    pub percent_utilization: f64,
}

impl VisualEdge {
    /// Number of physical links merged into this edge.
    pub fn link_count(&self) -> usize {
        self.source_interfaces.len()
    }
}

/// The topology graph: placed nodes and aggregated edges.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<VisualEdge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The edge between two devices, in either orientation.
    pub fn edge_between(&self, a: &str, b: &str) -> Option<&VisualEdge> {
        self.edges
            .iter()
            .find(|e| (e.source == a && e.target == b) || (e.source == b && e.target == a))
    }
}

/// Interval speed of one interface between two consecutive samples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateSample {
    /// Inbound bits/s.
    pub in_speed: u64,
    /// Outbound bits/s.
    pub out_speed: u64,
    /// Unix seconds of the later sample.
    pub timestamp: u64,
    /// `timestamp` formatted as `yy-mm-dd HH:MM:SS` (UTC).
    pub time: String,
}

/// Speed history of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterfaceRates {
    pub description: String,
    pub index: String,
    pub samples: Vec<RateSample>,
}

/// Speed history keyed by device name, then interface name.
pub type DeviceRates = BTreeMap<String, BTreeMap<String, InterfaceRates>>;

/// One neighbor of a device, seen from that device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Neighborship {
    pub local_intf: String,
    pub neighbor: String,
    pub neighbor_intf: String,
}

/// Everything stored about one device.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeDetails {
    pub node: Node,
    pub links: Vec<Link>,
    pub samples: Vec<CounterSample>,
    pub utilization: Vec<UtilizationSnapshot>,
}
