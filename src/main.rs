use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use automap::export::{export_graph, write_json};
use automap::poller::DevicePoller;
use automap::{init_tracing, topology_service, Settings};
use automap_engine::{MemoryStore, Store, SyntheticFabric, TopologyService};
use automap_pollers::{PollKind, PollOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "automap")]
#[command(about = "Network topology discovery and bandwidth mapping")]
struct Args {
    /// Settings file (default: automap.toml in the working directory, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one neighbor discovery pass
    Discover,

    /// Run one interface counter pass
    Collect,

    /// Poll continuously and export the graph periodically, until Ctrl-C
    Run,

    /// Print the topology graph
    Graph {
        /// Only devices whose name contains one of these
        #[arg(short, long)]
        pattern: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the bandwidth history of devices
    Rates {
        #[arg(required = true)]
        devices: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the neighbors of a device
    Neighbors { device: String },

    /// Print everything stored about a device
    Node { device: String },

    /// Add, delete or stop polling devices
    Nodes {
        #[command(subcommand)]
        action: NodesAction,
    },

    /// Manage static topology described in a fabric file
    Fabric {
        #[command(subcommand)]
        action: FabricAction,
    },

    /// Generate a synthetic fabric for demos and labs
    Seed {
        /// Total number of devices
        #[arg(long, default_value = "6")]
        nodes: usize,

        /// Fabric stages, must be odd
        #[arg(long, default_value = "5")]
        stages: usize,

        /// Use a deterministic traffic ramp instead of random bytes
        #[arg(long)]
        ramp: bool,

        /// Only add one more round of samples to an existing fabric
        #[arg(long)]
        stats_only: bool,
    },
}

#[derive(Subcommand, Debug)]
enum NodesAction {
    Add { names: Vec<String> },
    Delete { names: Vec<String> },
    Disable { names: Vec<String> },
}

#[derive(Subcommand, Debug)]
enum FabricAction {
    /// Add the nodes and links of a fabric file
    Apply { file: PathBuf },
    /// Delete the nodes of a fabric file
    Remove { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let store = Arc::new(
        MemoryStore::open(&settings.store_path)
            .with_context(|| format!("Failed to open store {}", settings.store_path.display()))?,
    );

    match args.command {
        Command::Discover => poll_once(&settings, store, PollKind::Discovery).await,
        Command::Collect => poll_once(&settings, store, PollKind::Counters).await,
        Command::Run => run(&settings, store).await,
        command => {
            let service = topology_service(&settings, Arc::clone(&store))?;
            serve(&service, command)?;
            store.flush()?;
            Ok(())
        }
    }
}

fn orchestrator(
    settings: &Settings,
    poller: DevicePoller,
    store: Arc<MemoryStore>,
) -> PollOrchestrator<DevicePoller, MemoryStore> {
    PollOrchestrator::builder(Arc::new(poller), store)
        .credentials(settings.credentials.resolve())
        .settings(settings.poll.clone())
        .build()
}

async fn poll_once(settings: &Settings, store: Arc<MemoryStore>, kind: PollKind) -> Result<()> {
    let poller = DevicePoller::from_settings(settings).await?;
    let report = orchestrator(settings, poller, store).run_pass(kind).await?;
    println!(
        "{kind}: {} devices, {} ok, {} failed",
        report.devices, report.succeeded, report.failed
    );
    Ok(())
}

async fn run(settings: &Settings, store: Arc<MemoryStore>) -> Result<()> {
    let poller = DevicePoller::from_settings(settings).await?;
    let orchestrator = Arc::new(orchestrator(settings, poller, Arc::clone(&store)));
    let service = topology_service(settings, Arc::clone(&store))?;

    let discovery = orchestrator.start(PollKind::Discovery);
    let counters = orchestrator.start(PollKind::Counters);

    let mut ticker =
        tokio::time::interval(Duration::from_secs(settings.export.interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                export_once(&service, &settings.export.graph_path);
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    discovery.stop().await;
    counters.stop().await;
    store.flush()?;
    Ok(())
}

fn export_once(service: &TopologyService<MemoryStore>, path: &Path) {
    let graph = match service.build_graph(None) {
        Ok(graph) => graph,
        Err(e) => {
            warn!(error = %e, "Graph build failed");
            return;
        }
    };
    match export_graph(&graph, path) {
        Ok(summary) => info!(
            path = %path.display(),
            nodes = summary.nodes,
            edges = summary.edges,
            "Graph exported"
        ),
        Err(e) => warn!(error = %e, "Graph export failed"),
    }
}

fn emit<T: Serialize + ?Sized>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => write_json(path, value),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}

fn serve(service: &TopologyService<MemoryStore>, command: Command) -> Result<()> {
    match command {
        Command::Graph { pattern, output } => {
            let patterns = (!pattern.is_empty()).then_some(pattern.as_slice());
            emit(&service.build_graph(patterns)?, output.as_deref())
        }
        Command::Rates { devices, output } => {
            let rates = service.get_rates(&devices)?;
            emit(rates.as_ref(), output.as_deref())
        }
        Command::Neighbors { device } => emit(&service.get_neighbors(&device)?, None),
        Command::Node { device } => match service.node_details(&device)? {
            Some(details) => emit(&details, None),
            None => anyhow::bail!("Unknown device {device}"),
        },
        Command::Nodes { action } => {
            let summary = match action {
                NodesAction::Add { names } => service.add_nodes(&names)?,
                NodesAction::Delete { names } => service.delete_nodes(&names)?,
                NodesAction::Disable { names } => service.disable_polling(&names)?,
            };
            println!("{} nodes", summary.nodes);
            Ok(())
        }
        Command::Fabric { action } => {
            let (file, apply) = match action {
                FabricAction::Apply { file } => (file, true),
                FabricAction::Remove { file } => (file, false),
            };
            let yaml = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let summary = if apply {
                service.apply_fabric(&yaml)?
            } else {
                service.remove_fabric(&yaml)?
            };
            println!("{} nodes, {} links", summary.nodes, summary.links);
            Ok(())
        }
        Command::Seed {
            nodes,
            stages,
            ramp,
            stats_only,
        } => {
            let summary = service.seed_synthetic_fabric(SyntheticFabric {
                nodes,
                stages,
                random_bytes: !ramp,
                stats_only,
            })?;
            println!(
                "{} nodes, {} links, {} samples",
                summary.nodes, summary.links, summary.samples
            );
            Ok(())
        }
        Command::Discover | Command::Collect | Command::Run => {
            anyhow::bail!("polling commands are not served from the store")
        }
    }
}
