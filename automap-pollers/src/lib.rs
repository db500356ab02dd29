//! # automap-pollers
//!
//! Device polling for automap: neighbor discovery and interface counters.
//!
//! This crate talks to network devices through the [`Poller`] trait and turns
//! what they return into the records the engine's store keeps.
//!
//! ## Components
//!
//! - **Poller** ([`Poller`], [`FixturePoller`]): the device read contract and
//!   a poller answering from recorded data
//! - **HTTP gateway** (`http` feature): a poller that delegates to a JSON
//!   polling gateway
//! - **Discovery** ([`discovery`]): LLDP neighbor rows to nodes and links
//! - **Counters** ([`counters`]): interface table rows to counter samples and
//!   utilization snapshots
//! - **Orchestrator** ([`PollOrchestrator`]): batched passes with per-device
//!   timeouts, looped until shutdown
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use automap_engine::MemoryStore;
//! use automap_pollers::{FixturePoller, PollKind, PollOrchestrator, Target, PollSettings};
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let poller = Arc::new(FixturePoller::builder().build());
//! let settings = PollSettings {
//!     seeds: vec![Target::new("core1")],
//!     ..Default::default()
//! };
//!
//! let orchestrator = PollOrchestrator::builder(poller, store)
//!     .settings(settings)
//!     .build();
//!
//! // The seed does not answer, so the pass records one failure.
//! let report = orchestrator.run_pass(PollKind::Discovery).await.unwrap();
//! assert_eq!(report.failed, 1);
//! # });
//! ```

pub mod counters;
pub mod discovery;
mod error;
mod fixture;
mod orchestrator;
mod poller;

#[cfg(feature = "http")]
pub mod http;

pub use error::PollError;
pub use fixture::{DeviceFixture, FixturePoller, FixturePollerBuilder};
pub use orchestrator::{
    PassDelay, PassReport, PollHandle, PollKind, PollOrchestrator, PollOrchestratorBuilder,
    PollSettings,
};
pub use poller::{find_by_prefix, Credentials, MetricValue, Poller, Row, Target, DEFAULT_PORT};
