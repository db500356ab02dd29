//! The serving surface of the engine.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use automap_types::{
    DeviceRates, Graph, InterfaceKey, InterfaceRates, Link, Neighborship, Node, NodeDetails,
};
use serde_json::Value;
use tracing::debug;

use crate::cache::{AggregateCache, EpochCache, DEFAULT_TTL_SECS};
use crate::clock::{Clock, SystemClock};
use crate::graph::{self, InterfaceMetrics};
use crate::placement::{PlacementRules, PlacementSettings};
use crate::rates::{self, STALE_AFTER_SECS};
use crate::{EngineError, Store};

/// Longest device name accepted by [`TopologyService::get_neighbors`].
pub const MAX_DEVICE_NAME_LEN: usize = 100;

/// Topology and telemetry queries over a [`Store`], behind an aggregate cache.
///
/// Every read first expires the cache epoch if it has run out, then serves
/// store queries from the cache. The graph itself is rebuilt on each call
/// from cached inputs, so placement and aggregation always see one
/// consistent set of records.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use automap_engine::{MemoryStore, Store, TopologyService};
/// use automap_types::Link;
///
/// let store = Arc::new(MemoryStore::new());
/// store.upsert_link(Link::new("sw1", "0/1", "sw2", "0/1")).unwrap();
///
/// let service = TopologyService::builder(store).build().unwrap();
/// let graph = service.build_graph(None).unwrap();
/// assert_eq!(graph.edges.len(), 1);
/// ```
#[derive(Debug)]
pub struct TopologyService<S, C = EpochCache> {
    pub(crate) store: Arc<S>,
    pub(crate) cache: C,
    pub(crate) clock: Arc<dyn Clock>,
    rules: PlacementRules,
    stale_after_secs: u64,
}

impl<S: Store> TopologyService<S, EpochCache> {
    /// Create a builder for a service over `store`.
    pub fn builder(store: Arc<S>) -> TopologyServiceBuilder<S> {
        TopologyServiceBuilder::new(store)
    }
}

impl<S: Store, C: AggregateCache> TopologyService<S, C> {
    /// Create a service with a caller-supplied cache.
    pub fn with_cache(
        store: Arc<S>,
        cache: C,
        clock: Arc<dyn Clock>,
        placement: &PlacementSettings,
        stale_after_secs: u64,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            store,
            cache,
            clock,
            rules: PlacementRules::compile(placement)?,
            stale_after_secs,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Build the topology graph.
    ///
    /// With patterns, only nodes whose name contains a pattern are returned,
    /// and only links whose both ends contain a pattern are aggregated. An
    /// empty pattern list means no filtering. Patterns match case-insensitively.
    pub fn build_graph(&self, patterns: Option<&[String]>) -> Result<Graph, EngineError> {
        self.cache.mark_all_stale_if_epoch_expired();

        let patterns: Option<Vec<String>> = patterns
            .filter(|p| !p.is_empty())
            .map(|p| p.iter().map(|s| s.to_lowercase()).collect());
        let (nodes, links) = match patterns.as_deref() {
            Some(p) => {
                let nodes = self
                    .cache
                    .try_get_or_compute(&format!("nodes{p:?}"), || self.store.nodes_matching(p))?;
                let links = self.cache.try_get_or_compute(&format!("links{p:?}"), || {
                    let mut links = self.store.links_matching(p)?;
                    graph::filter_links_by_neighbor(&mut links, p);
                    Ok::<_, crate::StoreError>(links)
                })?;
                (nodes, links)
            }
            None => (
                self.cache
                    .try_get_or_compute("nodes", || self.store.nodes())?,
                self.cache
                    .try_get_or_compute("links", || self.store.links())?,
            ),
        };
        let metrics = self.interface_metrics()?;

        let graph = graph::build_graph(&self.rules, &nodes, &links, &metrics);
        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "graph built"
        );
        Ok(graph)
    }

    fn interface_metrics(&self) -> Result<InterfaceMetrics, EngineError> {
        let capacities = self.cache.try_get_or_compute("capacities", || {
            let latest = self.store.latest_samples()?;
            Ok::<_, crate::StoreError>(
                latest
                    .into_iter()
                    .map(|s| (s.interface(), s.speed))
                    .collect::<HashMap<InterfaceKey, u64>>(),
            )
        })?;
        let rates = self.cache.try_get_or_compute("utilizations", || {
            let now = self.clock.now();
            let snapshots = self.store.all_utilization()?;
            Ok::<_, crate::StoreError>(
                snapshots
                    .iter()
                    .map(|s| {
                        (
                            s.interface(),
                            rates::derived_rate(s, now, self.stale_after_secs),
                        )
                    })
                    .collect::<HashMap<InterfaceKey, u64>>(),
            )
        })?;
        Ok(InterfaceMetrics {
            capacities: (*capacities).clone(),
            rates: (*rates).clone(),
        })
    }

    /// Interval speed history of every interface of the given devices.
    ///
    /// Fails with [`EngineError::InvalidArgument`] on an empty list or a
    /// blank name.
    pub fn get_rates(&self, device_names: &[String]) -> Result<Arc<DeviceRates>, EngineError> {
        if device_names.is_empty() {
            return Err(EngineError::invalid("device list is empty"));
        }
        if device_names.iter().any(|d| d.trim().is_empty()) {
            return Err(EngineError::invalid("device names must not be blank"));
        }
        self.cache.mark_all_stale_if_epoch_expired();

        let devices: Vec<String> = device_names.iter().map(|d| d.trim().to_lowercase()).collect();
        let rates = self
            .cache
            .try_get_or_compute(&format!("rates_by_device{devices:?}"), || {
                let samples = self.store.samples_for(&devices)?;
                Ok::<_, crate::StoreError>(rates_by_device(samples))
            })?;
        Ok(rates)
    }

    /// [`get_rates`](Self::get_rates) for an untyped request value.
    ///
    /// Only a non-empty array of non-empty strings is accepted.
    pub fn get_rates_json(&self, request: &Value) -> Result<Arc<DeviceRates>, EngineError> {
        let Value::Array(items) = request else {
            return Err(EngineError::invalid("devices must be a list of names"));
        };
        let names = items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(EngineError::invalid(format!(
                    "device name must be a string, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.get_rates(&names)
    }

    /// Neighbors of a device, seen from that device, deduplicated.
    pub fn get_neighbors(&self, device_name: &str) -> Result<Vec<Neighborship>, EngineError> {
        let len = device_name.chars().count();
        if len == 0 || len > MAX_DEVICE_NAME_LEN {
            return Err(EngineError::invalid(format!(
                "device name must be 1 to {MAX_DEVICE_NAME_LEN} characters"
            )));
        }
        self.cache.mark_all_stale_if_epoch_expired();

        let device = device_name.to_lowercase();
        let neighbors = self
            .cache
            .try_get_or_compute(&format!("neighbors_{device}"), || {
                let links = self.store.links_of(&device)?;
                Ok::<_, crate::StoreError>(neighborships(&device, &links))
            })?;
        Ok((*neighbors).clone())
    }

    /// Everything stored about one device, uncached.
    pub fn node_details(&self, device_name: &str) -> Result<Option<NodeDetails>, EngineError> {
        let device = device_name.to_lowercase();
        let Some(node) = self.store.node(&device)? else {
            return Ok(None);
        };
        let links = self.store.links_of(&device)?;
        let samples = self.store.samples_for(std::slice::from_ref(&device))?;
        let utilization = self
            .store
            .all_utilization()?
            .into_iter()
            .filter(|u| u.device_name == device)
            .collect();
        Ok(Some(NodeDetails {
            node,
            links,
            samples,
            utilization,
        }))
    }

    /// All stored nodes, served from the cache.
    pub fn nodes(&self) -> Result<Arc<Vec<Node>>, EngineError> {
        self.cache.mark_all_stale_if_epoch_expired();
        Ok(self
            .cache
            .try_get_or_compute("nodes", || self.store.nodes())?)
    }
}

/// Group samples into per-interface speed histories.
///
/// `samples` must be ordered by device, interface and time.
fn rates_by_device(samples: Vec<automap_types::CounterSample>) -> DeviceRates {
    let mut series: BTreeMap<InterfaceKey, Vec<automap_types::CounterSample>> = BTreeMap::new();
    for sample in samples {
        series.entry(sample.interface()).or_default().push(sample);
    }

    let mut out = DeviceRates::new();
    for (key, samples) in series {
        let rates = InterfaceRates {
            description: key.iface_name.clone(),
            index: key.iface_name.clone(),
            samples: rates::interval_speeds(&samples),
        };
        out.entry(key.device_name)
            .or_default()
            .insert(key.iface_name, rates);
    }
    out
}

fn neighborships(device: &str, links: &[Link]) -> Vec<Neighborship> {
    links
        .iter()
        .map(|l| {
            if l.device_name == device {
                Neighborship {
                    local_intf: l.iface_name.clone(),
                    neighbor: l.neighbor_name.clone(),
                    neighbor_intf: l.neighbor_iface.clone(),
                }
            } else {
                Neighborship {
                    local_intf: l.neighbor_iface.clone(),
                    neighbor: l.device_name.clone(),
                    neighbor_intf: l.iface_name.clone(),
                }
            }
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Builder for [`TopologyService`].
#[derive(Debug)]
pub struct TopologyServiceBuilder<S> {
    store: Arc<S>,
    clock: Option<Arc<dyn Clock>>,
    cache_ttl_secs: Option<u64>,
    stale_after_secs: Option<u64>,
    placement: Option<PlacementSettings>,
}

impl<S: Store> TopologyServiceBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: None,
            cache_ttl_secs: None,
            stale_after_secs: None,
            placement: None,
        }
    }

    /// Set the clock (defaults to the system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the cache epoch length (defaults to 300 seconds).
    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = Some(secs);
        self
    }

    /// Set how old a utilization snapshot may be before its rate reads as 0
    /// (defaults to 1300 seconds).
    pub fn stale_after_secs(mut self, secs: u64) -> Self {
        self.stale_after_secs = Some(secs);
        self
    }

    pub fn placement(mut self, settings: PlacementSettings) -> Self {
        self.placement = Some(settings);
        self
    }

    /// Build the service. Fails only on an invalid placement pattern.
    pub fn build(self) -> Result<TopologyService<S>, EngineError> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let cache = EpochCache::with_ttl(
            clock.clone(),
            self.cache_ttl_secs.unwrap_or(DEFAULT_TTL_SECS),
        );
        TopologyService::with_cache(
            self.store,
            cache,
            clock,
            &self.placement.unwrap_or_default(),
            self.stale_after_secs.unwrap_or(STALE_AFTER_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rates::advance_snapshot;
    use crate::MemoryStore;
    use automap_types::{CounterSample, NodeUpdate};
    use serde_json::json;

    const T0: u64 = 1_700_000_000;

    fn service() -> (Arc<MemoryStore>, Arc<ManualClock>, TopologyService<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let service = TopologyService::builder(store.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        (store, clock, service)
    }

    fn add_physical_link(store: &MemoryStore, a: &str, ai: &str, b: &str, bi: &str) {
        let link = Link::new(a, ai, b, bi);
        store.upsert_link(link.reversed()).unwrap();
        store.upsert_link(link).unwrap();
    }

    fn add_sample(store: &MemoryStore, dev: &str, iface: &str, ts: u64, bytes: u64, speed: u64) {
        let sample = CounterSample::builder(dev, iface)
            .timestamp(ts)
            .in_bytes(bytes)
            .out_bytes(bytes)
            .speed(speed)
            .build();
        let existing = store.utilization(&sample.interface()).unwrap();
        store
            .upsert_utilization(advance_snapshot(existing.as_ref(), &sample))
            .unwrap();
        store.insert_sample(sample).unwrap();
    }

    #[test]
    fn single_link_graph() {
        let (store, _clock, service) = service();
        store.merge_node("a", &NodeUpdate::new()).unwrap();
        store.merge_node("b", &NodeUpdate::new()).unwrap();
        add_physical_link(&store, "a", "0/1", "b", "0/1");
        add_sample(&store, "a", "0/1", T0, 0, 1000);
        add_sample(&store, "b", "0/1", T0, 0, 1000);

        let graph = service.build_graph(None).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert_eq!(edge.speed, 1_000_000_000);
        assert_eq!(edge.highest_utilization, 0);
        assert_eq!(edge.percent_utilization, 0.0);
    }

    #[test]
    fn parallel_links_graph() {
        let (store, _clock, service) = service();
        add_physical_link(&store, "a", "0/1", "b", "0/1");
        add_physical_link(&store, "a", "0/2", "b", "0/2");
        for iface in ["0/1", "0/2"] {
            add_sample(&store, "a", iface, T0, 0, 1000);
        }

        let graph = service.build_graph(None).unwrap();
        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert_eq!(edge.source_interfaces.len(), 2);
        assert_eq!(edge.target_interfaces.len(), 2);
        assert_eq!(edge.speed, 2_000_000_000);
    }

    #[test]
    fn graph_build_is_idempotent() {
        let (store, _clock, service) = service();
        store.merge_node("sw1", &NodeUpdate::new()).unwrap();
        store.merge_node("sw2", &NodeUpdate::new()).unwrap();
        add_physical_link(&store, "sw1", "0/1", "sw2", "0/1");
        add_physical_link(&store, "sw2", "0/2", "rtr1", "1/1");
        assert_eq!(
            service.build_graph(None).unwrap(),
            service.build_graph(None).unwrap()
        );
    }

    #[test]
    fn edge_rate_from_utilization() {
        let (store, clock, service) = service();
        add_physical_link(&store, "a", "0/1", "b", "0/1");
        // 1_250_000 bytes over 10 s = 1 Mbit/s on a 10 Mbit/s interface.
        add_sample(&store, "a", "0/1", T0, 0, 10);
        add_sample(&store, "a", "0/1", T0 + 10, 1_250_000, 10);
        clock.advance(10);

        let graph = service.build_graph(None).unwrap();
        let edge = &graph.edges[0];
        assert_eq!(edge.highest_utilization, 1_000_000);
        assert!((edge.percent_utilization - 10.0).abs() < 1e-9);
    }

    #[test]
    fn stale_snapshot_reads_zero() {
        let (store, clock, service) = service();
        add_physical_link(&store, "a", "0/1", "b", "0/1");
        add_sample(&store, "a", "0/1", T0, 0, 10);
        add_sample(&store, "a", "0/1", T0 + 10, 1_250_000, 10);
        clock.advance(2000);

        let graph = service.build_graph(None).unwrap();
        assert_eq!(graph.edges[0].highest_utilization, 0);
    }

    #[test]
    fn graph_served_from_cache_until_epoch_expires() {
        let (store, clock, service) = service();
        add_physical_link(&store, "a", "0/1", "b", "0/1");
        assert_eq!(service.build_graph(None).unwrap().edges.len(), 1);

        add_physical_link(&store, "c", "0/1", "d", "0/1");
        assert_eq!(service.build_graph(None).unwrap().edges.len(), 1);

        clock.advance(DEFAULT_TTL_SECS + 1);
        assert_eq!(service.build_graph(None).unwrap().edges.len(), 2);
    }

    #[test]
    fn graph_with_patterns() {
        let (store, _clock, service) = service();
        for name in ["paris-sw1", "paris-sw2", "lyon-sw1"] {
            store.merge_node(name, &NodeUpdate::new()).unwrap();
        }
        add_physical_link(&store, "paris-sw1", "1", "paris-sw2", "1");
        add_physical_link(&store, "paris-sw1", "2", "lyon-sw1", "1");

        let patterns = vec!["paris".to_string()];
        let graph = service.build_graph(Some(patterns.as_slice())).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edge_between("paris-sw1", "paris-sw2").is_some());

        // Empty pattern list means everything.
        assert_eq!(service.build_graph(Some(&[][..])).unwrap().nodes.len(), 3);
    }

    #[test]
    fn graph_patterns_ignore_case() {
        let (store, _clock, service) = service();
        for name in ["SW1", "sw2", "rtr1"] {
            store.merge_node(name, &NodeUpdate::new()).unwrap();
        }
        add_physical_link(&store, "sw1", "1", "SW2", "1");
        add_physical_link(&store, "sw2", "2", "rtr1", "1");

        let patterns = vec!["SW".to_string()];
        let graph = service.build_graph(Some(patterns.as_slice())).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edge_between("sw1", "sw2").is_some());
    }

    #[test]
    fn rates_for_device() {
        let (store, _clock, service) = service();
        add_sample(&store, "x", "0/1", T0, 1000, 1000);
        add_sample(&store, "x", "0/1", T0 + 10, 1250, 1000);

        let rates = service.get_rates(&["X".to_string()]).unwrap();
        let iface = &rates["x"]["0/1"];
        assert_eq!(iface.description, "0/1");
        assert_eq!(iface.samples.len(), 2);
        assert_eq!(iface.samples[0].in_speed, 0);
        assert_eq!(iface.samples[1].in_speed, 200);
    }

    #[test]
    fn rates_reject_bad_requests() {
        let (_store, _clock, service) = service();
        assert!(service.get_rates(&[]).unwrap_err().is_client_error());
        assert!(service
            .get_rates(&["a".to_string(), "  ".to_string()])
            .unwrap_err()
            .is_client_error());
    }

    #[test]
    fn rates_json_rejects_bare_string() {
        let (_store, _clock, service) = service();
        let err = service.get_rates_json(&json!("X")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert!(service.get_rates_json(&json!([])).is_err());
        assert!(service.get_rates_json(&json!([1, 2])).is_err());
        assert!(service.get_rates_json(&json!(["x", ""])).is_err());
        assert!(service.get_rates_json(&json!(["x"])).is_ok());
    }

    #[test]
    fn neighbors_from_either_side() {
        let (store, _clock, service) = service();
        add_physical_link(&store, "a", "0/1", "b", "1/1");
        store.upsert_link(Link::new("c", "2/2", "a", "0/3")).unwrap();

        let neighbors = service.get_neighbors("a").unwrap();
        assert_eq!(
            neighbors,
            vec![
                Neighborship {
                    local_intf: "0/1".to_string(),
                    neighbor: "b".to_string(),
                    neighbor_intf: "1/1".to_string(),
                },
                Neighborship {
                    local_intf: "0/3".to_string(),
                    neighbor: "c".to_string(),
                    neighbor_intf: "2/2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn neighbors_name_length() {
        let (_store, _clock, service) = service();
        assert!(service.get_neighbors("").unwrap_err().is_client_error());
        let long = "a".repeat(MAX_DEVICE_NAME_LEN + 1);
        assert!(service.get_neighbors(&long).unwrap_err().is_client_error());
        assert!(service
            .get_neighbors(&"a".repeat(MAX_DEVICE_NAME_LEN))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn node_details_collects_records() {
        let (store, _clock, service) = service();
        store.merge_node("a", &NodeUpdate::new()).unwrap();
        add_physical_link(&store, "a", "0/1", "b", "0/1");
        add_sample(&store, "a", "0/1", T0, 10, 100);
        add_sample(&store, "b", "0/1", T0, 10, 100);

        let details = service.node_details("A").unwrap().unwrap();
        assert_eq!(details.node.device_name, "a");
        assert_eq!(details.links.len(), 2);
        assert_eq!(details.samples.len(), 1);
        assert_eq!(details.utilization.len(), 1);
        assert!(service.node_details("ghost").unwrap().is_none());
    }
}
