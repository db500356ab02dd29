//! # automap-types
//!
//! Core types for network topology mapping. This crate defines the records
//! persisted by the discovery and counter pollers, and the views the
//! aggregation engine hands to a front end.
//!
//! ## Record kinds
//!
//! - [`Node`]: a device, keyed by its lowercase name
//! - [`Link`]: one direction of a physical link between two interfaces
//! - [`CounterSample`]: raw interface counters at a point in time
//! - [`UtilizationSnapshot`]: the two most recent cumulative bit counters of
//!   an interface, used to derive a bandwidth rate
//!
//! ## Views
//!
//! - [`Graph`], [`GraphNode`], [`VisualEdge`]: the deduplicated topology graph
//! - [`InterfaceRates`], [`RateSample`]: per-interface speed history
//! - [`Neighborship`], [`NodeDetails`]: per-device views
//!
//! ## Features
//!
//! - `serde`: serialization of every record and view via serde. Field names
//!   are the stable contract other tooling reads from the store.
//!
//! ## Example
//!
//! ```rust
//! use automap_types::{CounterSample, Link};
//!
//! let link = Link::new("SW1", "0/1", "rtr2", "1/1");
//! assert_eq!(link.device_name, "sw1");
//! assert_eq!(link.reversed().device_name, "rtr2");
//!
//! let sample = CounterSample::builder("sw1", "0/1")
//!     .timestamp(1_700_000_000)
//!     .in_bytes(1_500)
//!     .out_bytes(900)
//!     .speed(1000)
//!     .build();
//! assert_eq!(sample.in_bits(), 12_000);
//! ```

mod records;
mod views;

pub use records::*;
pub use views::*;
