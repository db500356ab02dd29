//! # automap
//!
//! Network topology discovery and bandwidth mapping.
//!
//! The binary wires the workspace crates together:
//!
//! ```text
//! ┌──────────────┐   rows   ┌──────────────────┐  records  ┌─────────────┐
//! │    Poller    │─────────▶│ PollOrchestrator │──────────▶│ MemoryStore │
//! │ fixture|http │          │ discovery/counters│          │ (JSON file) │
//! └──────────────┘          └──────────────────┘           └──────┬──────┘
//!                                                                 │
//!                                                                 ▼
//!                            graph.json ◀── export ◀── TopologyService
//! ```
//!
//! - **[`settings`]**: layered configuration (defaults, `automap.toml`,
//!   `AUTOMAP_*` environment)
//! - **[`poller`]**: the device poller picked from the settings
//! - **[`export`]**: atomic JSON export of graphs and rates
//!
//! ## Usage
//!
//! ```bash
//! # Poll continuously and refresh graph.json every minute
//! automap run
//!
//! # One discovery pass, then print the graph
//! automap discover && automap graph
//!
//! # Bandwidth history of two devices
//! automap rates sw1 sw2
//! ```

use std::sync::Arc;

use automap_engine::{EngineError, MemoryStore, TopologyService};

pub mod export;
pub mod poller;
pub mod settings;

pub use settings::Settings;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` selects what is shown, `info` when unset.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Build the serving surface over `store` as configured.
pub fn topology_service(
    settings: &Settings,
    store: Arc<MemoryStore>,
) -> Result<TopologyService<MemoryStore>, EngineError> {
    TopologyService::builder(store)
        .cache_ttl_secs(settings.cache.ttl_secs)
        .stale_after_secs(settings.cache.stale_after_secs)
        .placement(settings.placement.clone())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_uses_cache_settings() {
        let mut settings = Settings::default();
        settings.cache.ttl_secs = 42;
        let service = topology_service(&settings, Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(service.cache().ttl_secs(), 42);
    }

    #[test]
    fn invalid_placement_pattern_is_rejected() {
        let mut settings = Settings::default();
        settings.placement.device_pattern = "([a-z".to_string();
        assert!(topology_service(&settings, Arc::new(MemoryStore::new())).is_err());
    }
}
