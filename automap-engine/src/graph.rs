//! Topology graph construction.
//!
//! Collapses directed link records into one visual edge per unordered device
//! pair. Each physical link is counted once, whether it was stored from one
//! side, from both sides, or several times.

use std::collections::{HashMap, HashSet};

use automap_types::{Graph, GraphNode, InterfaceKey, Link, Node, VisualEdge};
use tracing::warn;

use crate::placement::PlacementRules;
use crate::rates::{capacity_bits, percent_of_capacity, DEFAULT_CAPACITY_BITS};

/// Unordered pair of device names.
///
/// Two names are kept side by side rather than concatenated, so `("ab", "c")`
/// and `("a", "bc")` are different pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DevicePair {
    low: String,
    high: String,
}

impl DevicePair {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    pub fn contains(&self, device_name: &str) -> bool {
        self.low == device_name || self.high == device_name
    }
}

/// Capacity and current rate of every interface, as inputs to a build.
#[derive(Debug, Clone, Default)]
pub struct InterfaceMetrics {
    /// Latest reported speed in Mbps.
    pub capacities: HashMap<InterfaceKey, u64>,
    /// Derived rate in bits/s.
    pub rates: HashMap<InterfaceKey, u64>,
}

impl InterfaceMetrics {
    /// Capacity in bits/s and rate in bits/s for one end of a link.
    ///
    /// An interface with unknown capacity gets the default capacity and a
    /// rate of 0.
    fn lookup(&self, link: &Link) -> (u64, u64) {
        let key = InterfaceKey::new(link.device_name.clone(), link.iface_name.clone());
        match self.capacities.get(&key).copied().and_then(capacity_bits) {
            Some(capacity) => (capacity, self.rates.get(&key).copied().unwrap_or(0)),
            None => {
                warn!(
                    device = %link.device_name,
                    iface = %link.iface_name,
                    "no capacity known for interface, using default"
                );
                (DEFAULT_CAPACITY_BITS, 0)
            }
        }
    }
}

/// Keep the links whose neighbor name contains at least one pattern.
pub fn filter_links_by_neighbor(links: &mut Vec<Link>, patterns: &[String]) {
    links.retain(|l| patterns.iter().any(|p| l.neighbor_name.contains(p.as_str())));
}

/// Graph nodes with coordinates, placing undetermined ones.
///
/// Placement uses a fresh registry, so the result depends only on `nodes`.
pub fn place_nodes(rules: &PlacementRules, nodes: &[Node]) -> Vec<GraphNode> {
    let mut registry = rules.registry();
    nodes
        .iter()
        .map(|node| {
            let (groupx, groupy) = registry.place(node);
            GraphNode {
                id: node.device_name.clone(),
                groupx,
                groupy,
                image: node.image_or_default().to_string(),
                system_description: node.system_description.clone().unwrap_or_default(),
            }
        })
        .collect()
}

struct EdgeAccumulator {
    edge: VisualEdge,
    members: HashSet<(String, String)>,
}

impl EdgeAccumulator {
    fn new(link: &Link, capacity: u64, rate: u64) -> Self {
        let mut members = HashSet::new();
        members.insert((link.iface_name.clone(), link.neighbor_iface.clone()));
        Self {
            edge: VisualEdge {
                source: link.device_name.clone(),
                target: link.neighbor_name.clone(),
                source_interfaces: vec![link.iface_name.clone()],
                target_interfaces: vec![link.neighbor_iface.clone()],
                speed: capacity,
                highest_utilization: rate,
                percent_utilization: percent_of_capacity(rate, capacity),
            },
            members,
        }
    }

    /// Add a record to the edge unless its physical link is already in it.
    fn merge(&mut self, link: &Link, capacity: u64, rate: u64) {
        let (local, remote) = if link.device_name == self.edge.source {
            (&link.iface_name, &link.neighbor_iface)
        } else {
            (&link.neighbor_iface, &link.iface_name)
        };
        if !self.members.insert((local.clone(), remote.clone())) {
            return;
        }
        self.edge.source_interfaces.push(local.clone());
        self.edge.target_interfaces.push(remote.clone());
        self.edge.speed = self.edge.speed.saturating_add(capacity);
        self.edge.highest_utilization = self.edge.highest_utilization.saturating_add(rate);
        self.edge.percent_utilization =
            percent_of_capacity(self.edge.highest_utilization, self.edge.speed);
    }
}

/// Aggregate link records into visual edges.
///
/// Records are processed in `(device_name, neighbor_name)` order. Records
/// with an empty identifying field are dropped. Edges come out in the order
/// their device pair was first seen.
pub fn aggregate_links(links: &[Link], metrics: &InterfaceMetrics) -> Vec<VisualEdge> {
    let mut sorted: Vec<&Link> = links.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.device_name, &a.neighbor_name, &a.iface_name, &a.neighbor_iface).cmp(&(
            &b.device_name,
            &b.neighbor_name,
            &b.iface_name,
            &b.neighbor_iface,
        ))
    });

    let mut index: HashMap<DevicePair, usize> = HashMap::new();
    let mut edges: Vec<EdgeAccumulator> = Vec::new();

    for link in sorted {
        if !link.is_complete() {
            warn!(?link, "dropping link record with empty field");
            continue;
        }
        let (capacity, rate) = metrics.lookup(link);
        let pair = DevicePair::new(&link.device_name, &link.neighbor_name);
        match index.get(&pair) {
            Some(&i) => edges[i].merge(link, capacity, rate),
            None => {
                index.insert(pair, edges.len());
                edges.push(EdgeAccumulator::new(link, capacity, rate));
            }
        }
    }

    edges.into_iter().map(|acc| acc.edge).collect()
}

/// Build the full graph from stored records.
pub fn build_graph(
    rules: &PlacementRules,
    nodes: &[Node],
    links: &[Link],
    metrics: &InterfaceMetrics,
) -> Graph {
    Graph {
        nodes: place_nodes(rules, nodes),
        edges: aggregate_links(links, metrics),
    }
}
