//! Administrative writes: manual nodes and links, fabric files, synthetic
//! lab fabrics.
//!
//! Every operation here ends by invalidating the aggregate cache so the next
//! read sees the change.

use automap_types::{
    CounterSample, InterfaceKey, Link, LinkKey, NodeUpdate, UNDETERMINED_GROUP,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::AggregateCache;
use crate::rates::advance_snapshot;
use crate::{EngineError, Store, TopologyService};

/// Speed in Mbps recorded for placeholder samples of manual interfaces.
pub const PLACEHOLDER_SPEED_MBPS: u64 = 10;

/// Upper bound of random bytes added per synthetic sample.
const SYNTHETIC_MAX_BYTES: u64 = 1_250_000;

/// A node described by an operator rather than discovered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    pub name: String,
    pub addr: Option<String>,
    pub groupx: Option<u32>,
    pub groupy: Option<u32>,
    pub image: Option<String>,
    pub system_description: Option<String>,
    pub ifaces: Option<Vec<String>>,
    pub to_poll: Option<bool>,
}

impl NodeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The node's name, falling back to its address.
    fn resolved_name(&self) -> Option<String> {
        let name = self.name.trim();
        if !name.is_empty() {
            return Some(name.to_lowercase());
        }
        self.addr
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_lowercase)
    }

    fn to_update(&self) -> NodeUpdate {
        NodeUpdate {
            device_ip: self.addr.clone(),
            groupx: Some(self.groupx.unwrap_or(UNDETERMINED_GROUP)),
            groupy: Some(self.groupy.unwrap_or(UNDETERMINED_GROUP)),
            image: self.image.clone(),
            to_poll: self.to_poll,
            last_poll: None,
            system_description: self.system_description.clone(),
        }
    }
}

/// A neighbor of a manually added node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighborSpec {
    pub name: String,
    pub addr: Option<String>,
    /// Interface on the neighbor.
    pub iface: String,
    /// Interface on the manually added node.
    pub node_iface: String,
}

/// A physical link between two named interfaces.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSpec {
    pub name_node1: String,
    pub iface_id_node1: String,
    pub iface_descr_node1: Option<String>,
    pub name_node2: String,
    pub iface_id_node2: String,
    pub iface_descr_node2: Option<String>,
}

impl LinkSpec {
    pub fn new(
        node1: impl Into<String>,
        iface1: impl Into<String>,
        node2: impl Into<String>,
        iface2: impl Into<String>,
    ) -> Self {
        Self {
            name_node1: node1.into(),
            iface_id_node1: iface1.into(),
            name_node2: node2.into(),
            iface_id_node2: iface2.into(),
            ..Default::default()
        }
    }

    /// The link as seen from node 1.
    fn forward(&self) -> Result<Link, EngineError> {
        let mut link = Link::new(
            self.name_node1.trim(),
            self.iface_id_node1.trim(),
            self.name_node2.trim(),
            self.iface_id_node2.trim(),
        );
        if !link.is_complete() {
            return Err(EngineError::invalid(format!(
                "link {}:{} - {}:{} has an empty field",
                self.name_node1, self.iface_id_node1, self.name_node2, self.iface_id_node2
            )));
        }
        link.iface_descr = self.iface_descr_node1.clone();
        link.neighbor_iface_descr = self.iface_descr_node2.clone();
        Ok(link)
    }
}

/// A fabric file: a set of nodes and the links between them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricDocument {
    pub nodes: Vec<NodeSpec>,
    pub links: Vec<LinkSpec>,
}

impl FabricDocument {
    /// Parse a YAML fabric document.
    pub fn from_yaml(yaml: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| EngineError::invalid(format!("invalid fabric document: {e}")))
    }
}

/// Parameters of a generated lab fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticFabric {
    /// Total number of devices, spread evenly over the levels.
    pub nodes: usize,
    /// Fabric stages; must be odd. `s` stages fold into `s / 2 + 1` levels.
    pub stages: usize,
    /// Random traffic per sample, or a deterministic ramp.
    pub random_bytes: bool,
    /// Only add a new round of samples to an existing fabric.
    pub stats_only: bool,
}

impl Default for SyntheticFabric {
    fn default() -> Self {
        Self {
            nodes: 6,
            stages: 5,
            random_bytes: true,
            stats_only: false,
        }
    }
}

/// Counts of what a write operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    pub nodes: usize,
    pub links: usize,
    pub samples: usize,
}

fn synthetic_name(level: usize, index: usize) -> String {
    format!("fake_device_stage{level}_{index}")
}

impl<S: Store, C: AggregateCache> TopologyService<S, C> {
    /// Add pollable nodes by name. Existing nodes are left as they are.
    pub fn add_nodes(&self, names: &[String]) -> Result<WriteSummary, EngineError> {
        let names = normalized_names(names)?;
        for name in &names {
            self.store.merge_node(name, &NodeUpdate::new())?;
        }
        self.cache.invalidate_all();
        Ok(WriteSummary {
            nodes: names.len(),
            ..Default::default()
        })
    }

    /// Delete nodes and everything recorded about them.
    pub fn delete_nodes(&self, names: &[String]) -> Result<WriteSummary, EngineError> {
        let names = normalized_names(names)?;
        let mut deleted = 0;
        for name in &names {
            if self.store.delete_device(name)? {
                deleted += 1;
            }
        }
        self.cache.invalidate_all();
        info!(deleted, "nodes deleted");
        Ok(WriteSummary {
            nodes: deleted,
            ..Default::default()
        })
    }

    /// Stop polling the given nodes. Unknown names are skipped.
    pub fn disable_polling(&self, names: &[String]) -> Result<WriteSummary, EngineError> {
        let names = normalized_names(names)?;
        let mut updated = 0;
        for name in &names {
            if self.store.set_polling(name, false)? {
                updated += 1;
            } else {
                warn!(device = %name, "cannot disable polling of unknown node");
            }
        }
        self.cache.invalidate_all();
        Ok(WriteSummary {
            nodes: updated,
            ..Default::default()
        })
    }

    /// Add a node that cannot be discovered.
    ///
    /// The node is stored with polling disabled. Links are added in both
    /// directions to neighbors that already exist; others are skipped. Each
    /// involved interface gets a placeholder sample and a zeroed utilization
    /// snapshot so it shows up with a capacity.
    pub fn add_static_node(
        &self,
        node: &NodeSpec,
        neighbors: &[NeighborSpec],
    ) -> Result<WriteSummary, EngineError> {
        let Some(name) = node.resolved_name() else {
            return Err(EngineError::invalid("node needs a name or an address"));
        };
        if neighbors.is_empty() && node.ifaces.is_none() {
            return Err(EngineError::invalid("node has no interfaces and no neighbors"));
        }

        let mut update = node.to_update();
        update.to_poll = Some(false);
        self.store.merge_node(&name, &update)?;
        let mut summary = WriteSummary {
            nodes: 1,
            ..Default::default()
        };

        if neighbors.is_empty() {
            for iface in node.ifaces.iter().flatten() {
                self.add_placeholder_interface(&name, iface)?;
                summary.samples += 1;
            }
        }

        for neighbor in neighbors {
            let neighbor_name = if neighbor.name.trim().is_empty() {
                neighbor.addr.clone().unwrap_or_default()
            } else {
                neighbor.name.clone()
            };
            let neighbor_name = neighbor_name.trim().to_lowercase();
            if self.store.node(&neighbor_name)?.is_none() {
                warn!(node = %name, neighbor = %neighbor_name, "neighbor does not exist, link not added");
                continue;
            }
            let link = Link::new(&name, &neighbor.node_iface, &neighbor_name, &neighbor.iface);
            if !link.is_complete() {
                warn!(?link, "neighbor link has an empty field, not added");
                continue;
            }
            self.store.upsert_link(link.reversed())?;
            self.store.upsert_link(link)?;
            self.add_placeholder_interface(&name, &neighbor.node_iface)?;
            self.add_placeholder_interface(&neighbor_name, &neighbor.iface)?;
            summary.links += 2;
            summary.samples += 2;
        }

        self.cache.invalidate_all();
        Ok(summary)
    }

    fn add_placeholder_interface(&self, device: &str, iface: &str) -> Result<(), EngineError> {
        let sample = CounterSample::builder(device, iface)
            .timestamp(self.clock.now())
            .speed(PLACEHOLDER_SPEED_MBPS)
            .mtu(1500)
            .build();
        self.store
            .upsert_utilization(automap_types::UtilizationSnapshot::empty(
                sample.device_name.clone(),
                sample.iface_name.clone(),
            ))?;
        self.store.insert_sample(sample)?;
        Ok(())
    }

    /// Add physical links, stored in both directions.
    ///
    /// The whole list is validated before anything is written.
    pub fn add_links(&self, specs: &[LinkSpec]) -> Result<WriteSummary, EngineError> {
        let links = specs
            .iter()
            .map(LinkSpec::forward)
            .collect::<Result<Vec<_>, _>>()?;
        for link in &links {
            self.store.upsert_link(link.reversed())?;
            self.store.upsert_link(link.clone())?;
        }
        self.cache.invalidate_all();
        Ok(WriteSummary {
            links: links.len() * 2,
            ..Default::default()
        })
    }

    /// Delete physical links in both directions.
    pub fn delete_links(&self, specs: &[LinkSpec]) -> Result<WriteSummary, EngineError> {
        let keys: Vec<LinkKey> = specs
            .iter()
            .map(|s| s.forward().map(|l| l.key()))
            .collect::<Result<_, _>>()?;
        let mut deleted = 0;
        for key in keys {
            let reverse = LinkKey {
                device_name: key.neighbor_name.clone(),
                iface_name: key.neighbor_iface.clone(),
                neighbor_name: key.device_name.clone(),
                neighbor_iface: key.iface_name.clone(),
            };
            deleted += usize::from(self.store.delete_link(&key)?);
            deleted += usize::from(self.store.delete_link(&reverse)?);
        }
        self.cache.invalidate_all();
        Ok(WriteSummary {
            links: deleted,
            ..Default::default()
        })
    }

    /// Apply a YAML fabric document: upsert its nodes, then its links.
    pub fn apply_fabric(&self, yaml: &str) -> Result<WriteSummary, EngineError> {
        let doc = FabricDocument::from_yaml(yaml)?;
        let names = doc
            .nodes
            .iter()
            .map(|n| {
                n.resolved_name()
                    .ok_or_else(|| EngineError::invalid("fabric node needs a name or an address"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (name, node) in names.iter().zip(&doc.nodes) {
            self.store.merge_node(name, &node.to_update())?;
        }
        let links = self.add_links(&doc.links)?;
        info!(nodes = names.len(), links = links.links, "fabric applied");
        Ok(WriteSummary {
            nodes: names.len(),
            ..links
        })
    }

    /// Delete every node a YAML fabric document names.
    pub fn remove_fabric(&self, yaml: &str) -> Result<WriteSummary, EngineError> {
        let doc = FabricDocument::from_yaml(yaml)?;
        let names: Vec<String> = doc.nodes.iter().filter_map(NodeSpec::resolved_name).collect();
        if names.is_empty() {
            return Err(EngineError::invalid("fabric document names no nodes"));
        }
        self.delete_nodes(&names)
    }

    /// Generate a layered `fake_device_stage<N>_<M>` fabric for labs.
    ///
    /// Every device of level `n` links to every device of level `n + 1`.
    /// Each link end gets a sample with growing counters and an advanced
    /// utilization snapshot, so calling this again later yields rates.
    pub fn seed_synthetic_fabric(
        &self,
        fabric: SyntheticFabric,
    ) -> Result<WriteSummary, EngineError> {
        if fabric.stages == 0 || fabric.stages % 2 == 0 {
            return Err(EngineError::invalid(
                "fabric stages must be an odd number greater than 0",
            ));
        }
        let levels = if fabric.stages == 1 {
            1
        } else {
            fabric.stages / 2 + 1
        };
        let per_level = fabric.nodes / levels;
        if per_level == 0 {
            return Err(EngineError::invalid(format!(
                "{} nodes cannot fill {levels} levels",
                fabric.nodes
            )));
        }

        let mut summary = WriteSummary::default();
        if !fabric.stats_only {
            for level in 1..=levels {
                for index in 1..=per_level {
                    self.store
                        .merge_node(&synthetic_name(level, index), &NodeUpdate::new())?;
                    summary.nodes += 1;
                }
            }
        }

        let now = self.clock.now();
        let increment = SYNTHETIC_MAX_BYTES / fabric.nodes as u64;
        let mut ramp = 0u64;
        let mut rng = rand::thread_rng();

        for level in 1..levels {
            for up in 1..=per_level {
                let up_device = synthetic_name(level, up);
                let up_iface = format!("0/{up}");
                for down in 1..=per_level {
                    let down_device = synthetic_name(level + 1, down);
                    let down_iface = format!("1/{down}");
                    if !fabric.stats_only {
                        let link = Link::new(&up_device, &down_iface, &down_device, &up_iface);
                        self.store.upsert_link(link.reversed())?;
                        self.store.upsert_link(link)?;
                        summary.links += 2;
                    }
                    let bytes = if fabric.random_bytes {
                        rng.gen_range(0..=SYNTHETIC_MAX_BYTES)
                    } else {
                        ramp
                    };
                    self.add_synthetic_sample(&up_device, &down_iface, now, bytes)?;
                    self.add_synthetic_sample(&down_device, &up_iface, now, bytes)?;
                    summary.samples += 2;
                }
                ramp += increment;
            }
        }

        self.cache.invalidate_all();
        info!(
            nodes = summary.nodes,
            links = summary.links,
            samples = summary.samples,
            "synthetic fabric seeded"
        );
        Ok(summary)
    }

    fn add_synthetic_sample(
        &self,
        device: &str,
        iface: &str,
        now: u64,
        bytes: u64,
    ) -> Result<(), EngineError> {
        let key = InterfaceKey::new(device, iface);
        let existing = self.store.utilization(&key)?;
        let base = existing.as_ref().map_or(0, |s| s.last_utilization / 8);
        let total = base.saturating_add(bytes);
        let sample = CounterSample::builder(device, iface)
            .timestamp(now)
            .in_bytes(total)
            .out_bytes(total)
            .speed(PLACEHOLDER_SPEED_MBPS)
            .mtu(1500)
            .ifalias(iface)
            .build();
        self.store
            .upsert_utilization(advance_snapshot(existing.as_ref(), &sample))?;
        self.store.insert_sample(sample)?;
        Ok(())
    }
}

fn normalized_names(names: &[String]) -> Result<Vec<String>, EngineError> {
    if names.is_empty() {
        return Err(EngineError::invalid("node list is empty"));
    }
    names
        .iter()
        .map(|n| {
            let n = n.trim();
            if n.is_empty() {
                Err(EngineError::invalid("node names must not be blank"))
            } else {
                Ok(n.to_lowercase())
            }
        })
        .collect()
}
