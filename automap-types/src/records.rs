//! Persisted record kinds: nodes, links, counter samples and utilization
//! snapshots.

/// Placement coordinate meaning "not placed yet".
///
/// Nodes carrying this value on both axes are placed by the graph builder's
/// heuristic on every build.
pub const UNDETERMINED_GROUP: u32 = 11;

/// Image used for nodes that were never given one.
pub const DEFAULT_IMAGE: &str = "router.png";

/// A network device.
///
/// Keyed by its lowercase `device_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Node {
    /// Unique device name, always lowercase.
    pub device_name: String,

    /// Management address learned from discovery or given on manual add.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub device_ip: Option<String>,

    /// Horizontal placement group (device function).
    pub groupx: u32,

    /// Vertical placement group (device location).
    pub groupy: u32,

    /// Image shown by the front end.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub image: Option<String>,

    /// Whether the pollers should contact this device.
    pub to_poll: bool,

    /// Unix seconds of the last successful discovery poll, 0 if never.
    pub last_poll: u64,

    /// Free-form system description reported by the device or its neighbors.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub system_description: Option<String>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            device_ip: None,
            groupx: UNDETERMINED_GROUP,
            groupy: UNDETERMINED_GROUP,
            image: None,
            to_poll: true,
            last_poll: 0,
            system_description: None,
        }
    }
}

impl Node {
    /// Create a node with default attributes. The name is lowercased.
    pub fn new(device_name: impl AsRef<str>) -> Self {
        Self {
            device_name: device_name.as_ref().to_lowercase(),
            ..Default::default()
        }
    }

    /// Whether the stored coordinates still hold the sentinel pair.
    pub fn has_undetermined_placement(&self) -> bool {
        self.groupx == UNDETERMINED_GROUP && self.groupy == UNDETERMINED_GROUP
    }

    /// Image to display, falling back to [`DEFAULT_IMAGE`].
    pub fn image_or_default(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    /// Overwrite every field the update provides. Other fields are kept.
    pub fn apply(&mut self, update: &NodeUpdate) {
        if let Some(ip) = &update.device_ip {
            self.device_ip = Some(ip.clone());
        }
        if let Some(x) = update.groupx {
            self.groupx = x;
        }
        if let Some(y) = update.groupy {
            self.groupy = y;
        }
        if let Some(image) = &update.image {
            self.image = Some(image.clone());
        }
        if let Some(to_poll) = update.to_poll {
            self.to_poll = to_poll;
        }
        if let Some(last_poll) = update.last_poll {
            self.last_poll = last_poll;
        }
        if let Some(descr) = &update.system_description {
            self.system_description = Some(descr.clone());
        }
    }
}

/// A partial node write. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NodeUpdate {
    pub device_ip: Option<String>,
    pub groupx: Option<u32>,
    pub groupy: Option<u32>,
    pub image: Option<String>,
    pub to_poll: Option<bool>,
    pub last_poll: Option<u64>,
    pub system_description: Option<String>,
}

impl NodeUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_ip(mut self, ip: impl Into<String>) -> Self {
        self.device_ip = Some(ip.into());
        self
    }

    pub fn placement(mut self, groupx: u32, groupy: u32) -> Self {
        self.groupx = Some(groupx);
        self.groupy = Some(groupy);
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn to_poll(mut self, to_poll: bool) -> Self {
        self.to_poll = Some(to_poll);
        self
    }

    pub fn last_poll(mut self, last_poll: u64) -> Self {
        self.last_poll = Some(last_poll);
        self
    }

    pub fn system_description(mut self, descr: impl Into<String>) -> Self {
        self.system_description = Some(descr.into());
        self
    }
}

/// Identity of a directed link record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub device_name: String,
    pub iface_name: String,
    pub neighbor_name: String,
    pub neighbor_iface: String,
}

/// One direction of a physical link.
///
/// A physical link between two interfaces is stored as two `Link` records,
/// one from each side.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Link {
    pub device_name: String,
    pub iface_name: String,
    pub neighbor_name: String,
    pub neighbor_iface: String,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub iface_descr: Option<String>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub neighbor_iface_descr: Option<String>,
}

impl Link {
    /// Create a link. Device names are lowercased, interfaces kept as given.
    pub fn new(
        device_name: impl AsRef<str>,
        iface_name: impl Into<String>,
        neighbor_name: impl AsRef<str>,
        neighbor_iface: impl Into<String>,
    ) -> Self {
        Self {
            device_name: device_name.as_ref().to_lowercase(),
            iface_name: iface_name.into(),
            neighbor_name: neighbor_name.as_ref().to_lowercase(),
            neighbor_iface: neighbor_iface.into(),
            iface_descr: None,
            neighbor_iface_descr: None,
        }
    }

    /// The same physical link seen from the neighbor's side.
    pub fn reversed(&self) -> Self {
        Self {
            device_name: self.neighbor_name.clone(),
            iface_name: self.neighbor_iface.clone(),
            neighbor_name: self.device_name.clone(),
            neighbor_iface: self.iface_name.clone(),
            iface_descr: self.neighbor_iface_descr.clone(),
            neighbor_iface_descr: self.iface_descr.clone(),
        }
    }

    pub fn key(&self) -> LinkKey {
        LinkKey {
            device_name: self.device_name.clone(),
            iface_name: self.iface_name.clone(),
            neighbor_name: self.neighbor_name.clone(),
            neighbor_iface: self.neighbor_iface.clone(),
        }
    }

    /// All four identifying fields are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.device_name.is_empty()
            && !self.iface_name.is_empty()
            && !self.neighbor_name.is_empty()
            && !self.neighbor_iface.is_empty()
    }

    /// Whether either end of the link is the given device.
    pub fn touches(&self, device_name: &str) -> bool {
        self.device_name == device_name || self.neighbor_name == device_name
    }
}

/// Identity of an interface: `(device_name, iface_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceKey {
    pub device_name: String,
    pub iface_name: String,
}

impl InterfaceKey {
    pub fn new(device_name: impl Into<String>, iface_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            iface_name: iface_name.into(),
        }
    }
}

/// Raw interface counters read at one point in time.
///
/// Samples are append-only and keyed by `(device_name, iface_name, timestamp)`.
/// Byte and packet counters are cumulative and normally only grow; they may
/// reset when a device reboots or a counter wraps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CounterSample {
    pub device_name: String,
    pub iface_name: String,

    /// Unix seconds at which the counters were read.
    pub timestamp: u64,

    pub in_bytes: u64,
    pub out_bytes: u64,
    pub in_discards: u64,
    pub in_errors: u64,
    pub out_discards: u64,
    pub out_errors: u64,
    pub in_ucast_pkts: u64,
    pub in_mcast_pkts: u64,
    pub in_bcast_pkts: u64,
    pub out_ucast_pkts: u64,
    pub out_mcast_pkts: u64,
    pub out_bcast_pkts: u64,

    /// Nominal capacity in Mbps, as reported by the device. 0 when unknown.
    pub speed: u64,

    pub mtu: u32,
    pub mac: String,
    pub ifalias: String,
}

impl CounterSample {
    /// Create a builder for a sample of the given interface.
    pub fn builder(device_name: impl AsRef<str>, iface_name: impl Into<String>) -> CounterSampleBuilder {
        CounterSampleBuilder::new(device_name, iface_name)
    }

    pub fn key(&self) -> (InterfaceKey, u64) {
        (self.interface(), self.timestamp)
    }

    pub fn interface(&self) -> InterfaceKey {
        InterfaceKey::new(self.device_name.clone(), self.iface_name.clone())
    }

    /// Cumulative inbound bits.
    pub fn in_bits(&self) -> u64 {
        self.in_bytes.saturating_mul(8)
    }

    /// Cumulative outbound bits.
    pub fn out_bits(&self) -> u64 {
        self.out_bytes.saturating_mul(8)
    }

    /// The larger of the two directions, in bits.
    pub fn highest_bits(&self) -> u64 {
        self.in_bits().max(self.out_bits())
    }
}

/// The two most recent cumulative bit counters of one interface.
///
/// Upserted in place on every new sample. `timestamp >= prev_timestamp`
/// always holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UtilizationSnapshot {
    pub device_name: String,
    pub iface_name: String,
    pub prev_utilization: u64,
    pub prev_timestamp: u64,
    pub last_utilization: u64,
    pub timestamp: u64,
}

impl UtilizationSnapshot {
    /// A zeroed snapshot, as if the interface had never reported.
    pub fn empty(device_name: impl Into<String>, iface_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            iface_name: iface_name.into(),
            ..Default::default()
        }
    }

    pub fn interface(&self) -> InterfaceKey {
        InterfaceKey::new(self.device_name.clone(), self.iface_name.clone())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Builder for [`CounterSample`].
#[derive(Debug, Clone)]
pub struct CounterSampleBuilder {
    sample: CounterSample,
}

impl CounterSampleBuilder {
    pub fn new(device_name: impl AsRef<str>, iface_name: impl Into<String>) -> Self {
        Self {
            sample: CounterSample {
                device_name: device_name.as_ref().to_lowercase(),
                iface_name: iface_name.into(),
                ..Default::default()
            },
        }
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.sample.timestamp = timestamp;
        self
    }

    pub fn in_bytes(mut self, bytes: u64) -> Self {
        self.sample.in_bytes = bytes;
        self
    }

    pub fn out_bytes(mut self, bytes: u64) -> Self {
        self.sample.out_bytes = bytes;
        self
    }

    /// Inbound and outbound discards.
    pub fn discards(mut self, inbound: u64, outbound: u64) -> Self {
        self.sample.in_discards = inbound;
        self.sample.out_discards = outbound;
        self
    }

    /// Inbound and outbound errors.
    pub fn errors(mut self, inbound: u64, outbound: u64) -> Self {
        self.sample.in_errors = inbound;
        self.sample.out_errors = outbound;
        self
    }

    /// Inbound unicast, multicast and broadcast packets.
    pub fn in_packets(mut self, ucast: u64, mcast: u64, bcast: u64) -> Self {
        self.sample.in_ucast_pkts = ucast;
        self.sample.in_mcast_pkts = mcast;
        self.sample.in_bcast_pkts = bcast;
        self
    }

    /// Outbound unicast, multicast and broadcast packets.
    pub fn out_packets(mut self, ucast: u64, mcast: u64, bcast: u64) -> Self {
        self.sample.out_ucast_pkts = ucast;
        self.sample.out_mcast_pkts = mcast;
        self.sample.out_bcast_pkts = bcast;
        self
    }

    /// Nominal capacity in Mbps.
    pub fn speed(mut self, mbps: u64) -> Self {
        self.sample.speed = mbps;
        self
    }

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.sample.mtu = mtu;
        self
    }

    pub fn mac(mut self, mac: impl Into<String>) -> Self {
        self.sample.mac = mac.into();
        self
    }

    pub fn ifalias(mut self, alias: impl Into<String>) -> Self {
        self.sample.ifalias = alias.into();
        self
    }

    pub fn build(self) -> CounterSample {
        self.sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Node Tests
    // ========================================================================

    #[test]
    fn node_new_lowercases_and_uses_sentinel() {
        let node = Node::new("SW1-Paris");
        assert_eq!(node.device_name, "sw1-paris");
        assert_eq!(node.groupx, UNDETERMINED_GROUP);
        assert_eq!(node.groupy, UNDETERMINED_GROUP);
        assert!(node.to_poll);
        assert!(node.has_undetermined_placement());
        assert_eq!(node.image_or_default(), "router.png");
    }

    #[test]
    fn node_apply_only_touches_provided_fields() {
        let mut node = Node::new("rtr1");
        node.system_description = Some("core router".to_string());

        node.apply(&NodeUpdate::new().to_poll(false).last_poll(42));

        assert!(!node.to_poll);
        assert_eq!(node.last_poll, 42);
        assert_eq!(node.system_description.as_deref(), Some("core router"));
        assert!(node.has_undetermined_placement());
    }

    #[test]
    fn node_apply_placement_clears_sentinel() {
        let mut node = Node::new("rtr1");
        node.apply(&NodeUpdate::new().placement(2, 1));
        assert!(!node.has_undetermined_placement());
    }

    #[test]
    fn node_with_one_sentinel_axis_is_placed() {
        let mut node = Node::new("rtr1");
        node.groupx = 3;
        assert!(!node.has_undetermined_placement());
    }

    // ========================================================================
    // Link Tests
    // ========================================================================

    #[test]
    fn link_new_lowercases_device_names_only() {
        let link = Link::new("SW1", "Eth0/1", "RTR2", "Gi1/1");
        assert_eq!(link.device_name, "sw1");
        assert_eq!(link.neighbor_name, "rtr2");
        assert_eq!(link.iface_name, "Eth0/1");
        assert_eq!(link.neighbor_iface, "Gi1/1");
    }

    #[test]
    fn link_reversed_swaps_ends_and_descriptions() {
        let mut link = Link::new("a", "0/1", "b", "0/2");
        link.iface_descr = Some("uplink".to_string());

        let rev = link.reversed();
        assert_eq!(rev.device_name, "b");
        assert_eq!(rev.iface_name, "0/2");
        assert_eq!(rev.neighbor_name, "a");
        assert_eq!(rev.neighbor_iface, "0/1");
        assert_eq!(rev.neighbor_iface_descr.as_deref(), Some("uplink"));
        assert_eq!(rev.iface_descr, None);
        assert_eq!(rev.reversed(), link);
    }

    #[test]
    fn link_is_complete_requires_all_four_fields() {
        assert!(Link::new("a", "1", "b", "2").is_complete());
        assert!(!Link::new("", "1", "b", "2").is_complete());
        assert!(!Link::new("a", "", "b", "2").is_complete());
        assert!(!Link::new("a", "1", "", "2").is_complete());
        assert!(!Link::new("a", "1", "b", "").is_complete());
    }

    #[test]
    fn link_touches_either_end() {
        let link = Link::new("a", "1", "b", "2");
        assert!(link.touches("a"));
        assert!(link.touches("b"));
        assert!(!link.touches("c"));
    }

    #[test]
    fn link_keys_differ_by_direction() {
        let link = Link::new("a", "1", "b", "2");
        assert_ne!(link.key(), link.reversed().key());
    }

    // ========================================================================
    // CounterSample Tests
    // ========================================================================

    #[test]
    fn sample_builder_all_fields() {
        let sample = CounterSample::builder("SW1", "0/1")
            .timestamp(100)
            .in_bytes(10)
            .out_bytes(20)
            .discards(1, 2)
            .errors(3, 4)
            .in_packets(5, 6, 7)
            .out_packets(8, 9, 10)
            .speed(1000)
            .mtu(1500)
            .mac("aabbccddeeff")
            .ifalias("to core")
            .build();

        assert_eq!(sample.device_name, "sw1");
        assert_eq!(sample.timestamp, 100);
        assert_eq!(sample.in_discards, 1);
        assert_eq!(sample.out_errors, 4);
        assert_eq!(sample.in_bcast_pkts, 7);
        assert_eq!(sample.out_ucast_pkts, 8);
        assert_eq!(sample.speed, 1000);
        assert_eq!(sample.mtu, 1500);
        assert_eq!(sample.ifalias, "to core");
    }

    #[test]
    fn sample_bits_use_larger_direction() {
        let sample = CounterSample::builder("a", "1").in_bytes(100).out_bytes(250).build();
        assert_eq!(sample.in_bits(), 800);
        assert_eq!(sample.out_bits(), 2000);
        assert_eq!(sample.highest_bits(), 2000);
    }

    #[test]
    fn sample_bits_saturate() {
        let sample = CounterSample::builder("a", "1").in_bytes(u64::MAX).build();
        assert_eq!(sample.in_bits(), u64::MAX);
    }

    // ========================================================================
    // UtilizationSnapshot Tests
    // ========================================================================

    #[test]
    fn snapshot_empty_is_zeroed() {
        let snap = UtilizationSnapshot::empty("a", "1");
        assert_eq!(snap.prev_timestamp, 0);
        assert_eq!(snap.timestamp, 0);
        assert_eq!(snap.last_utilization, 0);
        assert_eq!(snap.interface(), InterfaceKey::new("a", "1"));
    }

    // ========================================================================
    // Serialization Tests
    // ========================================================================

    #[cfg(feature = "serde")]
    #[test]
    fn node_deserializes_with_defaults() {
        let node: Node = serde_json::from_str(r#"{"device_name":"sw1"}"#).unwrap();
        assert!(node.to_poll);
        assert!(node.has_undetermined_placement());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn link_serializes_snake_case_fields() {
        let json = serde_json::to_value(Link::new("a", "1", "b", "2")).unwrap();
        assert_eq!(json["device_name"], "a");
        assert_eq!(json["neighbor_iface"], "2");
        assert!(json.get("iface_descr").is_none());
    }
}
