//! Interface counter collection: IF-MIB rows turned into counter samples
//! and utilization snapshots.

use std::fmt::Write as _;

use automap_engine::rates::advance_snapshot;
use automap_engine::Store;
use automap_types::CounterSample;
use tracing::{debug, warn};

use crate::discovery::normalize_interface;
use crate::poller::{find_by_prefix, MetricValue, Row};
use crate::PollError;

/// ifNumber, the row count of the interface table.
pub const IF_NUMBER: &str = "1.3.6.1.2.1.2.1.0";

pub const IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
pub const IF_MTU: &str = "1.3.6.1.2.1.2.2.1.4";
pub const IF_PHYS_ADDRESS: &str = "1.3.6.1.2.1.2.2.1.6";
pub const IF_IN_DISCARDS: &str = "1.3.6.1.2.1.2.2.1.13";
pub const IF_IN_ERRORS: &str = "1.3.6.1.2.1.2.2.1.14";
pub const IF_OUT_DISCARDS: &str = "1.3.6.1.2.1.2.2.1.19";
pub const IF_OUT_ERRORS: &str = "1.3.6.1.2.1.2.2.1.20";

// 64-bit counters from ifXTable.
pub const IF_HC_IN_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.6";
pub const IF_HC_IN_UCAST: &str = "1.3.6.1.2.1.31.1.1.1.7";
pub const IF_HC_IN_MCAST: &str = "1.3.6.1.2.1.31.1.1.1.8";
pub const IF_HC_IN_BCAST: &str = "1.3.6.1.2.1.31.1.1.1.9";
pub const IF_HC_OUT_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.10";
pub const IF_HC_OUT_UCAST: &str = "1.3.6.1.2.1.31.1.1.1.11";
pub const IF_HC_OUT_MCAST: &str = "1.3.6.1.2.1.31.1.1.1.12";
pub const IF_HC_OUT_BCAST: &str = "1.3.6.1.2.1.31.1.1.1.13";
/// ifHighSpeed, in Mbps.
pub const IF_HIGH_SPEED: &str = "1.3.6.1.2.1.31.1.1.1.15";
pub const IF_ALIAS: &str = "1.3.6.1.2.1.31.1.1.1.18";

/// Columns requested from each device during counter collection.
pub const COUNTER_COLUMNS: [&str; 17] = [
    IF_DESCR,
    IF_MTU,
    IF_PHYS_ADDRESS,
    IF_IN_DISCARDS,
    IF_IN_ERRORS,
    IF_OUT_DISCARDS,
    IF_OUT_ERRORS,
    IF_HC_IN_OCTETS,
    IF_HC_IN_UCAST,
    IF_HC_IN_MCAST,
    IF_HC_IN_BCAST,
    IF_HC_OUT_OCTETS,
    IF_HC_OUT_UCAST,
    IF_HC_OUT_MCAST,
    IF_HC_OUT_BCAST,
    IF_HIGH_SPEED,
    IF_ALIAS,
];

const IGNORED_PREFIXES: [&str; 6] = ["se", "nu", "lo", "mgm", "ma", "po"];

/// Serial, null, loopback, management and port-channel interfaces, plus the
/// default VLAN, carry nothing worth drawing.
pub fn is_ignored_interface(name: &str) -> bool {
    let name = name.to_lowercase();
    name == "vlan1" || IGNORED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Hex rendering of a hardware address value.
///
/// Text values are rendered byte by byte, numbers through their decimal text.
pub fn mac_hex(value: &MetricValue) -> String {
    let raw = value.as_text();
    raw.bytes().fold(String::with_capacity(raw.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Row count announced by the device, used as a table size hint.
pub fn interface_count(scalar: &Row) -> Option<u32> {
    find_by_prefix(scalar, IF_NUMBER)
        .and_then(|(_, v)| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
}

fn counter(row: &Row, column: &str) -> u64 {
    find_by_prefix(row, column)
        .and_then(|(_, v)| v.as_u64())
        .unwrap_or(0)
}

/// Translate a device's interface table into counter samples stamped `now`.
///
/// Rows without a name, ignored interfaces and names without any digits are
/// skipped.
pub fn translate_counters(device: &str, rows: &[Row], now: u64) -> Vec<CounterSample> {
    let mut samples = Vec::with_capacity(rows.len());

    for row in rows {
        let Some((_, descr)) = find_by_prefix(row, IF_DESCR) else {
            debug!(device, "Interface row without a name");
            continue;
        };
        let descr = descr.as_text().to_lowercase();
        if is_ignored_interface(&descr) {
            continue;
        }
        let iface = normalize_interface(&descr);
        if iface.is_empty() {
            warn!(device, interface = %descr, "Interface name has no port number, skipping");
            continue;
        }

        let mtu = u32::try_from(counter(row, IF_MTU)).unwrap_or(u32::MAX);
        let mac = find_by_prefix(row, IF_PHYS_ADDRESS)
            .map(|(_, v)| mac_hex(v))
            .unwrap_or_default();
        let ifalias = find_by_prefix(row, IF_ALIAS)
            .map(|(_, v)| v.as_text())
            .unwrap_or_default();

        let sample = CounterSample::builder(device, iface)
            .timestamp(now)
            .in_bytes(counter(row, IF_HC_IN_OCTETS))
            .out_bytes(counter(row, IF_HC_OUT_OCTETS))
            .discards(counter(row, IF_IN_DISCARDS), counter(row, IF_OUT_DISCARDS))
            .errors(counter(row, IF_IN_ERRORS), counter(row, IF_OUT_ERRORS))
            .in_packets(
                counter(row, IF_HC_IN_UCAST),
                counter(row, IF_HC_IN_MCAST),
                counter(row, IF_HC_IN_BCAST),
            )
            .out_packets(
                counter(row, IF_HC_OUT_UCAST),
                counter(row, IF_HC_OUT_MCAST),
                counter(row, IF_HC_OUT_BCAST),
            )
            .speed(counter(row, IF_HIGH_SPEED))
            .mtu(mtu)
            .mac(mac)
            .ifalias(ifalias)
            .build();
        samples.push(sample);
    }

    samples
}

/// Store samples and advance each interface's utilization snapshot.
pub fn apply_counters<S: Store + ?Sized>(
    store: &S,
    samples: Vec<CounterSample>,
) -> Result<usize, PollError> {
    let count = samples.len();
    for sample in samples {
        let existing = store.utilization(&sample.interface())?;
        let snapshot = advance_snapshot(existing.as_ref(), &sample);
        store.upsert_utilization(snapshot)?;
        store.insert_sample(sample)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use automap_engine::MemoryStore;
    use automap_types::InterfaceKey;

    fn if_row(index: u32, descr: &str, in_octets: u64, out_octets: u64) -> Row {
        let mut row = Row::new();
        row.insert(format!("{IF_DESCR}.{index}"), MetricValue::from(descr));
        row.insert(format!("{IF_MTU}.{index}"), MetricValue::Integer(9214));
        row.insert(format!("{IF_PHYS_ADDRESS}.{index}"), MetricValue::from("AB"));
        row.insert(format!("{IF_HC_IN_OCTETS}.{index}"), MetricValue::Counter(in_octets));
        row.insert(format!("{IF_HC_OUT_OCTETS}.{index}"), MetricValue::Counter(out_octets));
        row.insert(format!("{IF_HC_IN_UCAST}.{index}"), MetricValue::Counter(7));
        row.insert(format!("{IF_IN_ERRORS}.{index}"), MetricValue::Counter(2));
        row.insert(format!("{IF_HIGH_SPEED}.{index}"), MetricValue::Counter(10_000));
        row.insert(format!("{IF_ALIAS}.{index}"), MetricValue::from("to spine1"));
        row
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    #[test]
    fn ignored_interfaces() {
        for name in ["Serial0", "Null0", "Loopback0", "mgmt0", "Management1", "Port-Channel10", "Vlan1"] {
            assert!(is_ignored_interface(name), "{name} should be ignored");
        }
        for name in ["Ethernet1/1", "Vlan10", "xe-0/0/1"] {
            assert!(!is_ignored_interface(name), "{name} should be kept");
        }
    }

    #[test]
    fn mac_rendering() {
        assert_eq!(mac_hex(&MetricValue::from("AB")), "4142");
        assert_eq!(mac_hex(&MetricValue::from("")), "");
    }

    #[test]
    fn interface_count_from_scalar() {
        let mut scalar = Row::new();
        scalar.insert(IF_NUMBER.to_string(), MetricValue::Integer(48));
        assert_eq!(interface_count(&scalar), Some(48));
        assert_eq!(interface_count(&Row::new()), None);
    }

    // ========================================================================
    // Translation
    // ========================================================================

    #[test]
    fn rows_become_samples() {
        let rows = vec![if_row(1, "Ethernet1/1", 1000, 4000)];
        let samples = translate_counters("SW1", &rows, 500);

        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert_eq!(sample.device_name, "sw1");
        assert_eq!(sample.iface_name, "1/1");
        assert_eq!(sample.timestamp, 500);
        assert_eq!(sample.in_bytes, 1000);
        assert_eq!(sample.out_bytes, 4000);
        assert_eq!(sample.in_ucast_pkts, 7);
        assert_eq!(sample.in_errors, 2);
        assert_eq!(sample.out_errors, 0);
        assert_eq!(sample.speed, 10_000);
        assert_eq!(sample.mtu, 9214);
        assert_eq!(sample.mac, "4142");
        assert_eq!(sample.ifalias, "to spine1");
    }

    #[test]
    fn ignored_and_unnumbered_rows_are_skipped() {
        let mut nameless = if_row(4, "x", 0, 0);
        nameless.remove(&format!("{IF_DESCR}.4"));
        let rows = vec![
            if_row(1, "Loopback0", 1, 1),
            if_row(2, "Vlan1", 1, 1),
            if_row(3, "Tunnel", 1, 1),
            nameless,
            if_row(5, "Ethernet2", 1, 1),
        ];
        let samples = translate_counters("sw1", &rows, 1);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].iface_name, "2");
    }

    // ========================================================================
    // Store writes
    // ========================================================================

    #[test]
    fn apply_stores_samples_and_advances_snapshot() {
        let store = MemoryStore::new();
        let key = InterfaceKey::new("sw1", "1/1");

        let first = translate_counters("sw1", &[if_row(1, "Ethernet1/1", 100, 50)], 1000);
        assert_eq!(apply_counters(&store, first).unwrap(), 1);
        let snap = store.utilization(&key).unwrap().unwrap();
        assert_eq!(snap.prev_timestamp, 0);
        assert_eq!(snap.last_utilization, 800);

        let second = translate_counters("sw1", &[if_row(1, "Ethernet1/1", 300, 50)], 1060);
        apply_counters(&store, second).unwrap();
        let snap = store.utilization(&key).unwrap().unwrap();
        assert_eq!(snap.prev_utilization, 800);
        assert_eq!(snap.prev_timestamp, 1000);
        assert_eq!(snap.last_utilization, 2400);
        assert_eq!(snap.timestamp, 1060);

        assert_eq!(store.samples_for(&["sw1".to_string()]).unwrap().len(), 2);
    }
}
