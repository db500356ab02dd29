//! Persistent document store contract.
//!
//! Four record kinds are kept, each under a unique key:
//!
//! | kind | key |
//! |------|-----|
//! | [`Node`] | `device_name` |
//! | [`Link`] | `(device_name, iface_name, neighbor_name, neighbor_iface)` |
//! | [`CounterSample`] | `(device_name, iface_name, timestamp)` |
//! | [`UtilizationSnapshot`] | `(device_name, iface_name)` |
//!
//! Every write is a key-based upsert, so replaying a write is harmless.
//! Pattern queries match when the device name contains any of the patterns.

use automap_types::{
    CounterSample, InterfaceKey, Link, LinkKey, Node, NodeUpdate, UtilizationSnapshot,
};

use crate::StoreError;

/// Storage backend for topology and telemetry records.
pub trait Store: Send + Sync {
    // Nodes

    fn node(&self, device_name: &str) -> Result<Option<Node>, StoreError>;

    /// All nodes, ordered by name.
    fn nodes(&self) -> Result<Vec<Node>, StoreError>;

    /// Nodes whose name contains any of `patterns`, ordered by name.
    fn nodes_matching(&self, patterns: &[String]) -> Result<Vec<Node>, StoreError>;

    /// Create the node if missing, then apply the fields `update` provides.
    fn merge_node(&self, device_name: &str, update: &NodeUpdate) -> Result<Node, StoreError>;

    /// Set the polling flag of an existing node. Returns whether it existed.
    fn set_polling(&self, device_name: &str, to_poll: bool) -> Result<bool, StoreError>;

    /// Remove a node with its links (both directions), samples and
    /// utilization snapshots. Returns whether the node existed.
    fn delete_device(&self, device_name: &str) -> Result<bool, StoreError>;

    // Links

    fn links(&self) -> Result<Vec<Link>, StoreError>;

    /// Links whose local device name contains any of `patterns`.
    fn links_matching(&self, patterns: &[String]) -> Result<Vec<Link>, StoreError>;

    /// Links with the device on either end.
    fn links_of(&self, device_name: &str) -> Result<Vec<Link>, StoreError>;

    fn upsert_link(&self, link: Link) -> Result<(), StoreError>;

    /// Returns whether the link existed.
    fn delete_link(&self, key: &LinkKey) -> Result<bool, StoreError>;

    // Counter samples

    /// Samples of the given devices, ordered by device, interface, then time.
    fn samples_for(&self, device_names: &[String]) -> Result<Vec<CounterSample>, StoreError>;

    /// The most recent sample of every interface.
    fn latest_samples(&self) -> Result<Vec<CounterSample>, StoreError>;

    /// Insert a sample. A sample with the same key is replaced.
    fn insert_sample(&self, sample: CounterSample) -> Result<(), StoreError>;

    // Utilization snapshots

    fn utilization(&self, key: &InterfaceKey) -> Result<Option<UtilizationSnapshot>, StoreError>;

    fn all_utilization(&self) -> Result<Vec<UtilizationSnapshot>, StoreError>;

    fn upsert_utilization(&self, snapshot: UtilizationSnapshot) -> Result<(), StoreError>;

    /// Persist pending writes, if the backend buffers them.
    fn flush(&self) -> Result<(), StoreError>;
}
