//! Counter-delta rate engine.
//!
//! Turns cumulative interface counters into bandwidth figures. Two paths
//! exist: interval speeds over a sample series (history charts), and the
//! persisted [`UtilizationSnapshot`] from which the current rate of an
//! interface is derived at read time (graph edges).

use automap_types::{CounterSample, RateSample, UtilizationSnapshot};
use chrono::DateTime;
use tracing::warn;

/// Snapshots older than this many seconds report a rate of 0.
pub const STALE_AFTER_SECS: u64 = 1300;

/// Bits per second in one Mbps of reported interface speed.
pub const BITS_PER_MBPS: u64 = 1_000_000;

/// Capacity assumed for interfaces with unknown speed, in bits/s.
pub const DEFAULT_CAPACITY_BITS: u64 = BITS_PER_MBPS;

/// Format unix seconds as `yy-mm-dd HH:MM:SS` in UTC.
pub fn format_time(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Interval speeds of one interface.
///
/// `series` must hold samples of a single interface ordered by timestamp. The
/// first point always reports 0, as does any point whose interval to the
/// previous sample is not positive. Counter resets produce the magnitude of
/// the delta rather than a negative speed.
pub fn interval_speeds(series: &[CounterSample]) -> Vec<RateSample> {
    let mut out = Vec::with_capacity(series.len());
    let mut prev: Option<&CounterSample> = None;

    for sample in series {
        let (in_speed, out_speed) = match prev {
            Some(p) if sample.timestamp > p.timestamp => {
                let interval = sample.timestamp - p.timestamp;
                (
                    sample.in_bits().abs_diff(p.in_bits()) / interval,
                    sample.out_bits().abs_diff(p.out_bits()) / interval,
                )
            }
            _ => (0, 0),
        };
        out.push(RateSample {
            in_speed,
            out_speed,
            timestamp: sample.timestamp,
            time: format_time(sample.timestamp),
        });
        prev = Some(sample);
    }
    out
}

/// Fold a new sample into the interface's utilization snapshot.
///
/// The previous "last" values shift into the "prev" slots. A sample older than
/// the stored snapshot leaves it unchanged, and one with the same timestamp
/// only refreshes the "last" value.
pub fn advance_snapshot(
    existing: Option<&UtilizationSnapshot>,
    sample: &CounterSample,
) -> UtilizationSnapshot {
    match existing {
        Some(old) if sample.timestamp < old.timestamp => old.clone(),
        Some(old) if sample.timestamp == old.timestamp => UtilizationSnapshot {
            last_utilization: sample.highest_bits(),
            ..old.clone()
        },
        Some(old) => UtilizationSnapshot {
            device_name: sample.device_name.clone(),
            iface_name: sample.iface_name.clone(),
            prev_utilization: old.last_utilization,
            prev_timestamp: old.timestamp,
            last_utilization: sample.highest_bits(),
            timestamp: sample.timestamp,
        },
        None => UtilizationSnapshot {
            device_name: sample.device_name.clone(),
            iface_name: sample.iface_name.clone(),
            prev_utilization: 0,
            prev_timestamp: 0,
            last_utilization: sample.highest_bits(),
            timestamp: sample.timestamp,
        },
    }
}

/// Current rate of an interface in bits/s.
///
/// Returns 0 when the snapshot has no previous point or has not been
/// refreshed within `stale_after` seconds of `now`.
pub fn derived_rate(snapshot: &UtilizationSnapshot, now: u64, stale_after: u64) -> u64 {
    if snapshot.prev_timestamp == 0 {
        return 0;
    }
    if now.saturating_sub(snapshot.timestamp) > stale_after {
        return 0;
    }
    let interval = snapshot.timestamp.saturating_sub(snapshot.prev_timestamp).max(1);
    snapshot
        .last_utilization
        .saturating_sub(snapshot.prev_utilization)
        / interval
}

/// Capacity in bits/s of a reported speed in Mbps. `None` when unknown.
pub fn capacity_bits(speed_mbps: u64) -> Option<u64> {
    (speed_mbps > 0).then(|| speed_mbps.saturating_mul(BITS_PER_MBPS))
}

/// Share of `capacity_bits` used by `rate_bits`, as a percentage.
///
/// Zero capacity yields 0. Anything above 100 (or not finite) is reported as
/// 0 and logged, so the result is always within `[0, 100]`.
pub fn percent_of_capacity(rate_bits: u64, capacity_bits: u64) -> f64 {
    if capacity_bits == 0 {
        return 0.0;
    }
    let percent = rate_bits as f64 / capacity_bits as f64 * 100.0;
    if !percent.is_finite() || percent > 100.0 {
        warn!(rate_bits, capacity_bits, percent, "utilization above capacity, reporting 0");
        return 0.0;
    }
    percent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64, in_bytes: u64, out_bytes: u64) -> CounterSample {
        CounterSample::builder("x", "0/1")
            .timestamp(ts)
            .in_bytes(in_bytes)
            .out_bytes(out_bytes)
            .build()
    }

    fn snapshot(prev: u64, prev_ts: u64, last: u64, ts: u64) -> UtilizationSnapshot {
        UtilizationSnapshot {
            device_name: "x".to_string(),
            iface_name: "0/1".to_string(),
            prev_utilization: prev,
            prev_timestamp: prev_ts,
            last_utilization: last,
            timestamp: ts,
        }
    }

    // ========================================================================
    // Interval Speed Tests
    // ========================================================================

    #[test]
    fn first_sample_reports_zero() {
        let speeds = interval_speeds(&[sample(100, 5000, 5000)]);
        assert_eq!(speeds.len(), 1);
        assert_eq!(speeds[0].in_speed, 0);
        assert_eq!(speeds[0].out_speed, 0);
    }

    #[test]
    fn interval_speed_in_bits_per_second() {
        // 250 bytes = 2000 bits over 10 s.
        let speeds = interval_speeds(&[sample(100, 1000, 0), sample(110, 1250, 500)]);
        assert_eq!(speeds[1].in_speed, 200);
        assert_eq!(speeds[1].out_speed, 400);
        assert_eq!(speeds[1].timestamp, 110);
    }

    #[test]
    fn counter_reset_reports_magnitude() {
        let speeds = interval_speeds(&[sample(100, 1250, 0), sample(110, 1000, 0)]);
        assert_eq!(speeds[1].in_speed, 200);
    }

    #[test]
    fn non_positive_interval_reports_zero() {
        let speeds = interval_speeds(&[sample(100, 0, 0), sample(100, 9999, 9999)]);
        assert_eq!(speeds[1].in_speed, 0);
        assert_eq!(speeds[1].out_speed, 0);
    }

    #[test]
    fn empty_series() {
        assert!(interval_speeds(&[]).is_empty());
    }

    #[test]
    fn time_is_formatted_utc() {
        assert_eq!(format_time(0), "70-01-01 00:00:00");
        assert_eq!(format_time(1_609_459_199), "20-12-31 23:59:59");
    }

    // ========================================================================
    // Snapshot Tests
    // ========================================================================

    #[test]
    fn first_snapshot_has_no_previous_point() {
        let snap = advance_snapshot(None, &sample(100, 10, 20));
        assert_eq!(snap.prev_timestamp, 0);
        assert_eq!(snap.prev_utilization, 0);
        assert_eq!(snap.last_utilization, 160);
        assert_eq!(snap.timestamp, 100);
    }

    #[test]
    fn advance_shifts_last_into_prev() {
        let first = advance_snapshot(None, &sample(100, 10, 20));
        let second = advance_snapshot(Some(&first), &sample(160, 50, 5));
        assert_eq!(second.prev_utilization, 160);
        assert_eq!(second.prev_timestamp, 100);
        assert_eq!(second.last_utilization, 400);
        assert_eq!(second.timestamp, 160);
    }

    #[test]
    fn older_sample_keeps_snapshot() {
        let current = snapshot(100, 50, 200, 100);
        let after = advance_snapshot(Some(&current), &sample(80, 999, 999));
        assert_eq!(after, current);
        assert!(after.timestamp >= after.prev_timestamp);
    }

    #[test]
    fn replayed_sample_keeps_previous_point() {
        // 1250 bytes = 10000 bits over 10 s.
        let first = advance_snapshot(None, &sample(1000, 0, 0));
        let second = advance_snapshot(Some(&first), &sample(1010, 1250, 0));
        assert_eq!(derived_rate(&second, 1010, STALE_AFTER_SECS), 1000);

        let replayed = advance_snapshot(Some(&second), &sample(1010, 1250, 0));
        assert_eq!(replayed, second);
        assert_eq!(derived_rate(&replayed, 1010, STALE_AFTER_SECS), 1000);
    }

    #[test]
    fn same_second_sample_refreshes_last_value() {
        let current = snapshot(0, 1000, 10_000, 1010);
        let after = advance_snapshot(Some(&current), &sample(1010, 2500, 0));
        assert_eq!(after.prev_utilization, 0);
        assert_eq!(after.prev_timestamp, 1000);
        assert_eq!(after.last_utilization, 20_000);
        assert_eq!(after.timestamp, 1010);
    }

    // ========================================================================
    // Derived Rate Tests
    // ========================================================================

    #[test]
    fn rate_from_snapshot() {
        let snap = snapshot(1000, 100, 3000, 110);
        assert_eq!(derived_rate(&snap, 120, STALE_AFTER_SECS), 200);
    }

    #[test]
    fn rate_zero_without_previous_point() {
        let snap = snapshot(0, 0, 3000, 110);
        assert_eq!(derived_rate(&snap, 120, STALE_AFTER_SECS), 0);
    }

    #[test]
    fn rate_zero_when_stale() {
        let snap = snapshot(1000, 100, 3000, 110);
        assert_eq!(derived_rate(&snap, 110 + 2000, STALE_AFTER_SECS), 0);
        assert_eq!(derived_rate(&snap, 110 + STALE_AFTER_SECS, STALE_AFTER_SECS), 200);
    }

    #[test]
    fn rate_zero_on_counter_reset() {
        let snap = snapshot(5000, 100, 10, 110);
        assert_eq!(derived_rate(&snap, 110, STALE_AFTER_SECS), 0);
    }

    #[test]
    fn rate_interval_at_least_one_second() {
        let snap = snapshot(1000, 110, 3000, 110);
        assert_eq!(derived_rate(&snap, 110, STALE_AFTER_SECS), 2000);
    }

    // ========================================================================
    // Capacity Tests
    // ========================================================================

    #[test]
    fn capacity_from_mbps() {
        assert_eq!(capacity_bits(1000), Some(1_000_000_000));
        assert_eq!(capacity_bits(0), None);
    }

    #[test]
    fn percent_within_capacity() {
        let p = percent_of_capacity(250_000_000, 1_000_000_000);
        assert!((p - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percent_above_capacity_clamps_to_zero() {
        assert_eq!(percent_of_capacity(2_000, 1_000), 0.0);
    }

    #[test]
    fn percent_zero_capacity() {
        assert_eq!(percent_of_capacity(2_000, 0), 0.0);
    }

    #[test]
    fn percent_always_in_range() {
        for rate in [0, 1, 999, 1_000, 1_001, u64::MAX] {
            for cap in [0, 1, 1_000, u64::MAX] {
                let p = percent_of_capacity(rate, cap);
                assert!((0.0..=100.0).contains(&p), "rate={rate} cap={cap} p={p}");
            }
        }
    }
}
