//! Neighbor discovery: LLDP remote tables turned into nodes and links.

use std::collections::BTreeMap;

use automap_engine::Store;
use automap_types::{Link, NodeUpdate};
use tracing::{debug, warn};

use crate::poller::{find_by_prefix, Row};
use crate::PollError;

/// lldpRemSysName
pub const LLDP_REMOTE_SYS_NAME: &str = "1.0.8802.1.1.2.1.4.1.1.9";
/// lldpRemPortId
pub const LLDP_REMOTE_PORT_ID: &str = "1.0.8802.1.1.2.1.4.1.1.7";
/// lldpRemPortDesc
pub const LLDP_REMOTE_PORT_DESC: &str = "1.0.8802.1.1.2.1.4.1.1.8";
/// lldpRemSysDesc
pub const LLDP_REMOTE_SYS_DESC: &str = "1.0.8802.1.1.2.1.4.1.1.10";
/// lldpRemManAddrEntry. The address is encoded in the instance identifier.
pub const LLDP_REMOTE_MGMT_ADDR: &str = "1.0.8802.1.1.2.1.4.2.1";
/// lldpLocPortId
pub const LLDP_LOCAL_PORT_ID: &str = "1.0.8802.1.1.2.1.3.7.1.3";

/// Columns requested from each device during discovery.
pub const DISCOVERY_COLUMNS: [&str; 6] = [
    LLDP_REMOTE_SYS_NAME,
    LLDP_REMOTE_PORT_ID,
    LLDP_REMOTE_PORT_DESC,
    LLDP_REMOTE_SYS_DESC,
    LLDP_REMOTE_MGMT_ADDR,
    LLDP_LOCAL_PORT_ID,
];

const IGNORED_NEIGHBORS: [&str; 2] = ["null", "localhost.localdomain"];

/// Keep only the digit groups of an interface name, joined by `/`.
///
/// Vendors prefix the same port differently (`Et1/1`, `Ethernet1/1`,
/// `eth1/1`), the numbers are what identifies it.
pub fn normalize_interface(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_digit())
        .filter(|group| !group.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode the IPv4 address held in the last four components of an
/// instance identifier.
pub fn ip_from_oid(oid: &str) -> Option<String> {
    let parts: Vec<&str> = oid.rsplit('.').take(4).collect();
    if parts.len() < 4 || parts.iter().any(|p| p.parse::<u8>().is_err()) {
        return None;
    }
    Some(parts.into_iter().rev().collect::<Vec<_>>().join("."))
}

/// A neighbor learned from a discovery row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborRecord {
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    /// Whether the name matches the configured node patterns.
    pub in_scope: bool,
}

/// Everything one device told us about its neighbors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub device: String,
    pub neighbors: Vec<NeighborRecord>,
    /// Directed links, both directions of every physical link.
    pub links: Vec<Link>,
}

fn text(row: &Row, prefix: &str) -> Option<String> {
    find_by_prefix(row, prefix)
        .map(|(_, value)| value.as_text().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn in_scope(name: &str, node_patterns: &[String]) -> bool {
    node_patterns.is_empty() || node_patterns.iter().any(|p| name.contains(p.as_str()))
}

/// Translate a device's discovery table into neighbors and links.
pub fn translate_neighbors(device: &str, rows: &[Row], node_patterns: &[String]) -> Discovery {
    let device = device.to_lowercase();
    let mut neighbors: BTreeMap<String, NeighborRecord> = BTreeMap::new();
    let mut links = Vec::new();

    for row in rows {
        let name = text(row, LLDP_REMOTE_SYS_NAME)
            .map(|n| n.to_lowercase())
            .unwrap_or_default();
        if name.is_empty() || IGNORED_NEIGHBORS.contains(&name.as_str()) {
            debug!(device = %device, neighbor = %name, "Ignoring unnamed neighbor");
            continue;
        }

        let address = find_by_prefix(row, LLDP_REMOTE_MGMT_ADDR).and_then(|(id, _)| ip_from_oid(id));
        let description = text(row, LLDP_REMOTE_SYS_DESC);
        let record = neighbors
            .entry(name.clone())
            .or_insert_with(|| NeighborRecord {
                name: name.clone(),
                address: None,
                description: None,
                in_scope: in_scope(&name, node_patterns),
            });
        if address.is_some() {
            record.address = address;
        }
        if description.is_some() {
            record.description = description;
        }

        let local_iface = text(row, LLDP_LOCAL_PORT_ID)
            .map(|s| normalize_interface(&s))
            .unwrap_or_default();
        let neighbor_iface = text(row, LLDP_REMOTE_PORT_ID)
            .map(|s| normalize_interface(&s))
            .unwrap_or_default();

        let mut link = Link::new(&device, local_iface, &name, neighbor_iface);
        link.neighbor_iface_descr = text(row, LLDP_REMOTE_PORT_DESC);
        if !link.is_complete() {
            warn!(
                device = %link.device_name,
                iface = %link.iface_name,
                neighbor = %link.neighbor_name,
                neighbor_iface = %link.neighbor_iface,
                "Link not added, missing fields"
            );
            continue;
        }
        let reverse = link.reversed();
        links.push(link);
        links.push(reverse);
    }

    Discovery {
        device,
        neighbors: neighbors.into_values().collect(),
        links,
    }
}

/// Write a discovery result to the store.
///
/// The polled device is marked pollable with `last_poll = now`. A new
/// neighbor is pollable when it is in scope; an existing one only loses its
/// flag when it falls out of scope, so an operator's choice to stop polling
/// it survives rediscovery.
pub fn apply_discovery<S: Store + ?Sized>(
    store: &S,
    discovery: &Discovery,
    now: u64,
) -> Result<usize, PollError> {
    store.merge_node(
        &discovery.device,
        &NodeUpdate::new().to_poll(true).last_poll(now),
    )?;

    for neighbor in &discovery.neighbors {
        let mut update = NodeUpdate::new();
        if let Some(address) = &neighbor.address {
            update = update.device_ip(address.clone());
        }
        if let Some(description) = &neighbor.description {
            update = update.system_description(description.clone());
        }
        let known = store.node(&neighbor.name)?.is_some();
        if !known || !neighbor.in_scope {
            update = update.to_poll(neighbor.in_scope);
        }
        store.merge_node(&neighbor.name, &update)?;
    }

    for link in &discovery.links {
        store.upsert_link(link.clone())?;
    }
    Ok(discovery.links.len())
}
