//! Batched polling passes over the known devices.
//!
//! A pass selects its targets from the store, polls them in batches of
//! `batch_width` (each device under its own timeout), writes the results and
//! then waits before the next pass. One device failing never stops its batch
//! or the pass.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use automap_engine::{Clock, Store, SystemClock};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::counters::{apply_counters, interface_count, translate_counters, COUNTER_COLUMNS, IF_NUMBER};
use crate::discovery::{apply_discovery, translate_neighbors, DISCOVERY_COLUMNS};
use crate::poller::{Credentials, Poller, Target, DEFAULT_PORT};
use crate::PollError;

/// What a pass collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollKind {
    /// Neighbor tables, producing nodes and links.
    Discovery,
    /// Interface counters, producing samples and utilization snapshots.
    Counters,
}

impl fmt::Display for PollKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollKind::Discovery => f.write_str("discovery"),
            PollKind::Counters => f.write_str("counters"),
        }
    }
}

/// Wait between passes: `base + per_batch × (devices / batch_width)`,
/// saturating at `Duration::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassDelay {
    pub base_secs: u64,
    pub per_batch_secs: u64,
}

impl PassDelay {
    pub fn for_pass(&self, devices: usize, batch_width: usize) -> Duration {
        let batches = devices as f64 / batch_width.max(1) as f64;
        let per_batch = Duration::try_from_secs_f64(self.per_batch_secs as f64 * batches)
            .unwrap_or(Duration::MAX);
        Duration::from_secs(self.base_secs).saturating_add(per_batch)
    }
}

/// Polling behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Devices polled at once.
    pub batch_width: usize,
    /// Per-device deadline for one poll and its store writes.
    pub device_timeout_secs: u64,
    pub discovery_delay: PassDelay,
    pub counters_delay: PassDelay,
    /// Devices whose name contains this are never polled live.
    pub skip_marker: String,
    /// Restrict polling to nodes whose name contains one of these.
    pub node_patterns: Vec<String>,
    /// Discovery starting points used while no node is known.
    pub seeds: Vec<Target>,
    /// Names or addresses never polled.
    pub exclusions: Vec<String>,
    pub port: u16,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            batch_width: 10,
            device_timeout_secs: 30,
            discovery_delay: PassDelay {
                base_secs: 30,
                per_batch_secs: 60,
            },
            counters_delay: PassDelay {
                base_secs: 60,
                per_batch_secs: 1,
            },
            skip_marker: "fake".to_string(),
            node_patterns: Vec::new(),
            seeds: Vec::new(),
            exclusions: Vec::new(),
            port: DEFAULT_PORT,
        }
    }
}

impl PollSettings {
    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_secs)
    }

    pub fn delay(&self, kind: PollKind) -> PassDelay {
        match kind {
            PollKind::Discovery => self.discovery_delay,
            PollKind::Counters => self.counters_delay,
        }
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub kind: PollKind,
    pub devices: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batches: usize,
}

impl PassReport {
    fn new(kind: PollKind, devices: usize) -> Self {
        Self {
            kind,
            devices,
            succeeded: 0,
            failed: 0,
            batches: 0,
        }
    }
}

/// Runs discovery and counter passes against a poller and a store.
pub struct PollOrchestrator<P, S> {
    poller: Arc<P>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    credentials: Credentials,
    settings: PollSettings,
}

impl<P, S> fmt::Debug for PollOrchestrator<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollOrchestrator")
            .field("credentials", &self.credentials)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<P: Poller, S: Store> PollOrchestrator<P, S> {
    /// Create a new builder.
    pub fn builder(poller: Arc<P>, store: Arc<S>) -> PollOrchestratorBuilder<P, S> {
        PollOrchestratorBuilder {
            poller,
            store,
            clock: None,
            credentials: None,
            settings: None,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Devices the next pass of `kind` would poll.
    pub fn select_targets(&self, kind: PollKind) -> Result<Vec<Target>, PollError> {
        let nodes = if self.settings.node_patterns.is_empty() {
            self.store.nodes()?
        } else {
            self.store.nodes_matching(&self.settings.node_patterns)?
        };

        let marker = self.settings.skip_marker.as_str();
        let marked = |name: &str| !marker.is_empty() && name.contains(marker);
        let mut targets: Vec<Target> = nodes
            .into_iter()
            .filter(|node| !marked(&node.device_name))
            .filter(|node| kind == PollKind::Counters || node.to_poll)
            .map(|node| {
                let target = Target::new(&node.device_name).with_port(self.settings.port);
                match node.device_ip {
                    Some(ip) if !ip.is_empty() => target.with_address(ip),
                    _ => target,
                }
            })
            .collect();

        if targets.is_empty() && kind == PollKind::Discovery {
            debug!("No known devices, starting from seeds");
            targets = self.settings.seeds.clone();
        }

        let excluded = |t: &Target| {
            marked(&t.name)
                || self.settings.exclusions.iter().any(|e| {
                    let e = e.to_lowercase();
                    t.name == e || t.address.as_deref() == Some(e.as_str())
                })
        };
        targets.retain(|t| !excluded(t));
        Ok(targets)
    }

    /// Poll one device and store what it returned.
    pub async fn poll_device(&self, kind: PollKind, target: &Target) -> Result<usize, PollError> {
        match kind {
            PollKind::Discovery => {
                let rows = self
                    .poller
                    .poll_table(target, &self.credentials, &DISCOVERY_COLUMNS, None)
                    .await?;
                let discovery = translate_neighbors(&target.name, &rows, &self.settings.node_patterns);
                apply_discovery(self.store.as_ref(), &discovery, self.clock.now())
            }
            PollKind::Counters => {
                let scalar = self
                    .poller
                    .poll_scalar(target, &self.credentials, &[IF_NUMBER])
                    .await?;
                let rows = self
                    .poller
                    .poll_table(target, &self.credentials, &COUNTER_COLUMNS, interface_count(&scalar))
                    .await?;
                let samples = translate_counters(&target.name, &rows, self.clock.now());
                apply_counters(self.store.as_ref(), samples)
            }
        }
    }

    /// Poll `targets` batch by batch. Batch N+1 starts once batch N is done.
    pub async fn poll_targets(&self, kind: PollKind, targets: &[Target]) -> PassReport {
        let mut report = PassReport::new(kind, targets.len());
        let deadline = self.settings.device_timeout();

        for batch in targets.chunks(self.settings.batch_width.max(1)) {
            let polls = batch.iter().map(|target| async move {
                let outcome = tokio::time::timeout(deadline, self.poll_device(kind, target)).await;
                (target, outcome)
            });

            for (target, outcome) in join_all(polls).await {
                match outcome {
                    Ok(Ok(written)) => {
                        debug!(device = %target.name, %kind, written, "Device polled");
                        report.succeeded += 1;
                    }
                    Ok(Err(e)) => {
                        warn!(device = %target.name, %kind, error = %e, "Device poll failed");
                        report.failed += 1;
                    }
                    Err(_) => {
                        warn!(device = %target.name, %kind, timeout = ?deadline, "Device poll timed out");
                        report.failed += 1;
                    }
                }
            }
            report.batches += 1;
        }
        report
    }

    /// Run one full pass and persist the store.
    pub async fn run_pass(&self, kind: PollKind) -> Result<PassReport, PollError> {
        let targets = self.select_targets(kind)?;
        let report = self.poll_targets(kind, &targets).await;
        self.store.flush()?;
        info!(
            %kind,
            devices = report.devices,
            succeeded = report.succeeded,
            failed = report.failed,
            batches = report.batches,
            "Poll pass complete"
        );
        Ok(report)
    }

    /// Wait before the pass following one that covered `devices` devices.
    pub fn pass_delay(&self, kind: PollKind, devices: usize) -> Duration {
        self.settings
            .delay(kind)
            .for_pass(devices, self.settings.batch_width)
    }

    /// Loop passes until `shutdown` turns true or its sender goes away.
    pub async fn run(&self, kind: PollKind, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let devices = match self.run_pass(kind).await {
                Ok(report) => report.devices,
                Err(e) => {
                    error!(%kind, error = %e, "Poll pass failed");
                    0
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(self.pass_delay(kind, devices)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(%kind, "Polling stopped");
    }
}

impl<P, S> PollOrchestrator<P, S>
where
    P: Poller + 'static,
    S: Store + 'static,
{
    /// Spawn the pass loop of `kind` in the background.
    pub fn start(self: &Arc<Self>, kind: PollKind) -> PollHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let orchestrator = Arc::clone(self);
        let task = tokio::spawn(async move { orchestrator.run(kind, stop_rx).await });
        PollHandle { stop_tx, task }
    }
}

/// Handle for a background pass loop.
///
/// Dropping the handle also stops the loop, at its next wait.
#[derive(Debug)]
pub struct PollHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Polling task ended abnormally");
        }
    }
}

/// Builder for [`PollOrchestrator`].
pub struct PollOrchestratorBuilder<P, S> {
    poller: Arc<P>,
    store: Arc<S>,
    clock: Option<Arc<dyn Clock>>,
    credentials: Option<Credentials>,
    settings: Option<PollSettings>,
}

impl<P: Poller, S: Store> PollOrchestratorBuilder<P, S> {
    /// Time source for `last_poll` and sample timestamps (default: system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn settings(mut self, settings: PollSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> PollOrchestrator<P, S> {
        PollOrchestrator {
            poller: self.poller,
            store: self.store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            credentials: self.credentials.unwrap_or_default(),
            settings: self.settings.unwrap_or_default(),
        }
    }
}
