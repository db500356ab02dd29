//! A poller that answers from recorded device data.
//!
//! Useful for tests and for running the collection loops against a lab
//! capture without live devices.
//!
//! ## Fixture format
//!
//! ```json
//! {
//!   "devices": {
//!     "sw1": {
//!       "scalar": { "1.3.6.1.2.1.2.1.0": 2 },
//!       "rows": [ { "1.3.6.1.2.1.2.2.1.2.1": "Ethernet1/1" } ]
//!     }
//!   },
//!   "unreachable": ["sw9"],
//!   "latency_ms": 0
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::poller::{Credentials, Poller, Row, Target};
use crate::PollError;

/// Recorded answers of one device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceFixture {
    #[serde(default)]
    pub scalar: Row,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Default, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    devices: BTreeMap<String, DeviceFixture>,
    #[serde(default)]
    unreachable: Vec<String>,
    #[serde(default)]
    latency_ms: u64,
}

/// Poller backed by in-memory device answers.
#[derive(Debug, Clone, Default)]
pub struct FixturePoller {
    devices: BTreeMap<String, DeviceFixture>,
    unreachable: BTreeSet<String>,
    latency: Duration,
}

impl FixturePoller {
    pub fn builder() -> FixturePollerBuilder {
        FixturePollerBuilder::default()
    }

    /// Load a fixture from a JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PollError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PollError::Fixture {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, PollError> {
        let file: FixtureFile =
            serde_json::from_str(raw).map_err(|e| PollError::Parse(e.to_string()))?;
        let mut builder = Self::builder().latency(Duration::from_millis(file.latency_ms));
        for (name, device) in file.devices {
            builder = builder.device(name, device);
        }
        for name in file.unreachable {
            builder = builder.unreachable(name);
        }
        Ok(builder.build())
    }

    /// Names of the devices that answer.
    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    async fn lookup(&self, target: &Target) -> Result<&DeviceFixture, PollError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unreachable.contains(&target.name) {
            return Err(PollError::Unreachable(target.host().to_string()));
        }
        self.devices
            .get(&target.name)
            .ok_or_else(|| PollError::Unreachable(target.host().to_string()))
    }
}

fn under_any(id: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| {
        id == *p || (id.starts_with(p) && id.as_bytes().get(p.len()) == Some(&b'.'))
    })
}

fn select(row: &Row, prefixes: &[&str]) -> Row {
    row.iter()
        .filter(|(id, _)| under_any(id, prefixes))
        .map(|(id, v)| (id.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl Poller for FixturePoller {
    async fn poll_scalar(
        &self,
        target: &Target,
        _credentials: &Credentials,
        metric_ids: &[&str],
    ) -> Result<Row, PollError> {
        let device = self.lookup(target).await?;
        Ok(select(&device.scalar, metric_ids))
    }

    async fn poll_table(
        &self,
        target: &Target,
        _credentials: &Credentials,
        metric_ids: &[&str],
        row_hint: Option<u32>,
    ) -> Result<Vec<Row>, PollError> {
        let device = self.lookup(target).await?;
        let limit = row_hint.map_or(usize::MAX, |n| n as usize);
        Ok(device
            .rows
            .iter()
            .map(|row| select(row, metric_ids))
            .filter(|row| !row.is_empty())
            .take(limit)
            .collect())
    }
}

/// Builder for [`FixturePoller`].
#[derive(Debug, Default)]
pub struct FixturePollerBuilder {
    devices: BTreeMap<String, DeviceFixture>,
    unreachable: BTreeSet<String>,
    latency: Option<Duration>,
}

impl FixturePollerBuilder {
    /// Add a device. The name is lowercased.
    pub fn device(mut self, name: impl AsRef<str>, fixture: DeviceFixture) -> Self {
        self.devices.insert(name.as_ref().to_lowercase(), fixture);
        self
    }

    /// Mark a device as not answering.
    pub fn unreachable(mut self, name: impl AsRef<str>) -> Self {
        self.unreachable.insert(name.as_ref().to_lowercase());
        self
    }

    /// Delay every answer (default: none).
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn build(self) -> FixturePoller {
        FixturePoller {
            devices: self.devices,
            unreachable: self.unreachable,
            latency: self.latency.unwrap_or(Duration::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::MetricValue;

    fn row(entries: &[(&str, MetricValue)]) -> Row {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn sample_device() -> DeviceFixture {
        DeviceFixture {
            scalar: row(&[
                ("1.3.6.1.2.1.2.1.0", MetricValue::Counter(3)),
                ("1.3.6.1.2.1.1.5.0", "sw1".into()),
            ]),
            rows: vec![
                row(&[
                    ("1.3.6.1.2.1.2.2.1.2.1", "eth1".into()),
                    ("1.3.6.1.2.1.31.1.1.1.6.1", MetricValue::Counter(10)),
                ]),
                row(&[("1.3.6.1.2.1.2.2.1.2.2", "eth2".into())]),
                row(&[("1.3.6.1.2.1.2.2.1.2.3", "eth3".into())]),
            ],
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    #[tokio::test]
    async fn scalar_filters_by_requested_ids() {
        let poller = FixturePoller::builder().device("SW1", sample_device()).build();
        let result = poller
            .poll_scalar(&Target::new("sw1"), &Credentials::default(), &["1.3.6.1.2.1.2.1.0"])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result["1.3.6.1.2.1.2.1.0"].as_u64(), Some(3));
    }

    #[tokio::test]
    async fn table_respects_row_hint_and_columns() {
        let poller = FixturePoller::builder().device("sw1", sample_device()).build();
        let target = Target::new("sw1");
        let creds = Credentials::default();

        let all = poller
            .poll_table(&target, &creds, &["1.3.6.1.2.1.2.2.1.2"], None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].len(), 1);

        let bounded = poller
            .poll_table(&target, &creds, &["1.3.6.1.2.1.2.2.1.2"], Some(2))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 2);

        let none = poller
            .poll_table(&target, &creds, &["1.0.8802.1.1.2.1.4.1.1.9"], None)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn unknown_and_unreachable_devices_fail() {
        let poller = FixturePoller::builder()
            .device("sw1", sample_device())
            .unreachable("sw1")
            .build();
        let creds = Credentials::default();

        let err = poller
            .poll_scalar(&Target::new("sw1"), &creds, &["1.3.6.1.2.1.2.1.0"])
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Unreachable(_)));

        let err = poller
            .poll_scalar(&Target::new("ghost").with_address("10.9.9.9"), &creds, &[])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Device unreachable: 10.9.9.9");
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_answers() {
        let poller = FixturePoller::builder()
            .device("sw1", sample_device())
            .latency(Duration::from_secs(5))
            .build();
        let started = tokio::time::Instant::now();
        poller
            .poll_scalar(&Target::new("sw1"), &Credentials::default(), &[])
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    // ========================================================================
    // Loading
    // ========================================================================

    #[test]
    fn from_json_reads_devices() {
        let poller = FixturePoller::from_json(
            r#"{
                "devices": { "SW1": { "scalar": { "1.3.6.1.2.1.2.1.0": 1 } } },
                "unreachable": ["sw2"],
                "latency_ms": 20
            }"#,
        )
        .unwrap();
        assert_eq!(poller.device_names().collect::<Vec<_>>(), vec!["sw1"]);
        assert!(poller.unreachable.contains("sw2"));
        assert_eq!(poller.latency, Duration::from_millis(20));
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = FixturePoller::from_json("not json").unwrap_err();
        assert!(matches!(err, PollError::Parse(_)));
    }

    #[tokio::test]
    async fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = FixturePoller::from_file(dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Fixture { .. }));
    }
}
