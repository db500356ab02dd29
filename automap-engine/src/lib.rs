//! # automap-engine
//!
//! Topology and telemetry aggregation for network maps.
//!
//! This crate turns stored discovery and counter records into what a network
//! map front end displays: a deduplicated topology graph with per-edge
//! capacity and utilization, and per-interface bandwidth history.
//!
//! ## Components
//!
//! - **Cache** ([`EpochCache`]): store queries are cached until a single
//!   global epoch expires, then recomputed lazily on the next read
//! - **Rates** ([`rates`]): interval speeds from counter deltas, and the
//!   persisted utilization snapshot a current rate is derived from
//! - **Graph** ([`graph`]): link records collapsed into one edge per device
//!   pair, with device placement from naming conventions
//! - **Store** ([`Store`], [`MemoryStore`]): the record store contract and an
//!   in-memory implementation with JSON file persistence
//! - **Service** ([`TopologyService`]): the read operations and the
//!   administrative writes a request layer would expose
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use automap_engine::{MemoryStore, TopologyService};
//!
//! let store = Arc::new(MemoryStore::new());
//! let service = TopologyService::builder(store).build().unwrap();
//!
//! service.add_nodes(&["sw1".to_string(), "sw2".to_string()]).unwrap();
//! let graph = service.build_graph(None).unwrap();
//! assert_eq!(graph.nodes.len(), 2);
//! ```

mod admin;
mod cache;
mod clock;
mod error;
mod memory;
mod service;
mod store;

pub mod graph;
pub mod placement;
pub mod rates;

pub use admin::{
    FabricDocument, LinkSpec, NeighborSpec, NodeSpec, SyntheticFabric, WriteSummary,
    PLACEHOLDER_SPEED_MBPS,
};
pub use cache::{AggregateCache, CachedValue, EpochCache, DEFAULT_TTL_SECS};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, StoreError};
pub use memory::MemoryStore;
pub use placement::PlacementSettings;
pub use service::{TopologyService, TopologyServiceBuilder, MAX_DEVICE_NAME_LEN};
pub use store::Store;

// Re-export types for convenience
pub use automap_types::{
    CounterSample, Graph, GraphNode, InterfaceKey, Link, LinkKey, Neighborship, Node,
    NodeDetails, NodeUpdate, UtilizationSnapshot, VisualEdge,
};
