use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// NVMe "data unit" = 1000 x 512 bytes.
const NVME_UNIT_BYTES: i64 = 512_000;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const TIB: f64 = GIB * 1024.0;

/// Computed workload metrics for a single device over a duration window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadInsight {
    pub device_wwn: String,
    pub device_protocol: String,

    /// "heavy", "medium", "light", "idle" or "unknown".
    pub intensity: String,

    /// reads / writes per day (0 when no writes).
    pub read_write_ratio: f64,

    pub time_span_hours: f64,
    pub data_points: i64,

    pub daily_write_bytes: i64,
    pub daily_read_bytes: i64,
    pub total_write_bytes: i64,
    pub total_read_bytes: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endurance: Option<EnduranceEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spike: Option<ActivitySpike>,
}

impl WorkloadInsight {
    pub fn unknown(wwn: &str, protocol: &str) -> WorkloadInsight {
        WorkloadInsight {
            device_wwn: wwn.to_string(),
            device_protocol: protocol.to_string(),
            intensity: "unknown".to_string(),
            read_write_ratio: 0.0,
            time_span_hours: 0.0,
            data_points: 0,
            daily_write_bytes: 0,
            daily_read_bytes: 0,
            total_write_bytes: 0,
            total_read_bytes: 0,
            endurance: None,
            spike: None,
        }
    }
}

/// Projected SSD remaining lifespan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnduranceEstimate {
    pub available: bool,
    pub percentage_used: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_lifespan_days: Option<i64>,
    pub tbw_so_far: f64,
}

/// Unusual write activity compared to the window baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySpike {
    pub detected: bool,
    pub spike_factor: f64,
    pub recent_daily_write_bytes: i64,
    pub baseline_daily_write_bytes: i64,
    pub description: String,
}

/// Field values extracted from a single stored SMART point. Options record
/// which counters the drive actually exposes.
#[derive(Debug, Clone, Default)]
pub struct WorkloadSnapshot {
    pub time: i64,
    pub power_on_hours: i64,
    pub logical_block_size: i64,

    // ATA
    pub attr_241_raw: Option<i64>,
    pub attr_242_raw: Option<i64>,
    pub devstat_1_24: Option<i64>,
    pub devstat_1_40: Option<i64>,
    pub devstat_7_8: Option<i64>,
    pub attr_177: Option<i64>,
    pub attr_231: Option<i64>,
    pub attr_232: Option<i64>,
    pub attr_233: Option<i64>,

    // NVMe
    pub data_units_written: Option<i64>,
    pub data_units_read: Option<i64>,
    pub percentage_used: Option<i64>,
}

impl WorkloadSnapshot {
    pub fn from_point(ts: i64, fields: &Map<String, Value>) -> WorkloadSnapshot {
        let get = |key: &str| fields.get(key).and_then(Value::as_i64);

        let mut snapshot = WorkloadSnapshot {
            time: ts,
            power_on_hours: get("power_on_hours").unwrap_or(0),
            logical_block_size: get("logical_block_size").unwrap_or(0),
            attr_241_raw: get("attr.241.raw_value"),
            attr_242_raw: get("attr.242.raw_value"),
            devstat_1_24: get("attr.devstat_1_24.value"),
            devstat_1_40: get("attr.devstat_1_40.value"),
            devstat_7_8: get("attr.devstat_7_8.value"),
            attr_177: get("attr.177.value"),
            attr_231: get("attr.231.value"),
            attr_232: get("attr.232.value"),
            attr_233: get("attr.233.value"),
            data_units_written: get("attr.data_units_written.value"),
            data_units_read: get("attr.data_units_read.value"),
            percentage_used: get("attr.percentage_used.value"),
        };
        if snapshot.logical_block_size == 0 {
            snapshot.logical_block_size = 512;
        }
        snapshot
    }
}

/// Intensity by daily read+write gigabytes: <1 idle, <20 light, <100 medium,
/// else heavy. Monotone non-decreasing in the input.
pub fn classify_intensity(daily_total_bytes: i64) -> &'static str {
    let daily_gb = daily_total_bytes as f64 / GIB;
    if daily_gb < 1.0 {
        "idle"
    } else if daily_gb < 20.0 {
        "light"
    } else if daily_gb < 100.0 {
        "medium"
    } else {
        "heavy"
    }
}

/// Fill an insight from the first/last snapshots of the window. Windows
/// shorter than an hour and protocols without cumulative byte counters
/// (SCSI) stay "unknown"; endurance is still computed where possible.
pub fn compute_insight(
    insight: &mut WorkloadInsight,
    first: &WorkloadSnapshot,
    last: &WorkloadSnapshot,
    protocol: &str,
) {
    let time_span_hours = (last.time - first.time) as f64 / 3600.0;
    insight.time_span_hours = time_span_hours;
    insight.data_points = 2;

    if time_span_hours < 1.0 {
        insight.intensity = "unknown".to_string();
        compute_endurance(insight, last, protocol, 0);
        return;
    }

    let time_span_days = time_span_hours / 24.0;

    let (mut total_written, mut total_read) = match protocol {
        "ATA" => compute_ata_workload(first, last),
        "NVMe" => compute_nvme_workload(first, last),
        _ => {
            // SCSI exposes no cumulative byte counters
            insight.intensity = "unknown".to_string();
            compute_endurance(insight, last, protocol, 0);
            return;
        }
    };

    // counter wraparound or reset shows up as a negative delta
    if total_written < 0 {
        total_written = 0;
    }
    if total_read < 0 {
        total_read = 0;
    }

    insight.total_write_bytes = total_written;
    insight.total_read_bytes = total_read;
    insight.daily_write_bytes = (total_written as f64 / time_span_days) as i64;
    insight.daily_read_bytes = (total_read as f64 / time_span_days) as i64;

    if insight.daily_write_bytes > 0 {
        let ratio = insight.daily_read_bytes as f64 / insight.daily_write_bytes as f64;
        insight.read_write_ratio = (ratio * 100.0).round() / 100.0;
    }

    insight.intensity =
        classify_intensity(insight.daily_write_bytes + insight.daily_read_bytes).to_string();

    let cumulative_write_bytes = cumulative_write_bytes(last, protocol);
    compute_endurance(insight, last, protocol, cumulative_write_bytes);
}

fn compute_ata_workload(first: &WorkloadSnapshot, last: &WorkloadSnapshot) -> (i64, i64) {
    let block_size = last.logical_block_size;
    let mut written = 0;
    let mut read = 0;

    // prefer attributes 241/242 (Total LBAs Written/Read), fall back to the
    // device-statistics sector counters
    if let (Some(last_241), Some(first_241)) = (last.attr_241_raw, first.attr_241_raw) {
        written = (last_241 - first_241) * block_size;
    } else if let (Some(last_ds), Some(first_ds)) = (last.devstat_1_24, first.devstat_1_24) {
        written = (last_ds - first_ds) * block_size;
    }

    if let (Some(last_242), Some(first_242)) = (last.attr_242_raw, first.attr_242_raw) {
        read = (last_242 - first_242) * block_size;
    } else if let (Some(last_ds), Some(first_ds)) = (last.devstat_1_40, first.devstat_1_40) {
        read = (last_ds - first_ds) * block_size;
    }

    (written, read)
}

fn compute_nvme_workload(first: &WorkloadSnapshot, last: &WorkloadSnapshot) -> (i64, i64) {
    let mut written = 0;
    let mut read = 0;

    if let (Some(last_w), Some(first_w)) = (last.data_units_written, first.data_units_written) {
        written = (last_w - first_w) * NVME_UNIT_BYTES;
    }
    if let (Some(last_r), Some(first_r)) = (last.data_units_read, first.data_units_read) {
        read = (last_r - first_r) * NVME_UNIT_BYTES;
    }

    (written, read)
}

fn cumulative_write_bytes(snapshot: &WorkloadSnapshot, protocol: &str) -> i64 {
    match protocol {
        "ATA" => {
            if let Some(attr_241) = snapshot.attr_241_raw {
                return attr_241 * snapshot.logical_block_size;
            }
            if let Some(devstat) = snapshot.devstat_1_24 {
                return devstat * snapshot.logical_block_size;
            }
            0
        }
        "NVMe" => snapshot
            .data_units_written
            .map(|units| units * NVME_UNIT_BYTES)
            .unwrap_or(0),
        _ => 0,
    }
}

fn compute_endurance(
    insight: &mut WorkloadInsight,
    snapshot: &WorkloadSnapshot,
    protocol: &str,
    cumulative_write_bytes: i64,
) {
    let percentage_used = match protocol {
        "NVMe" => snapshot.percentage_used,
        "ATA" => snapshot.devstat_7_8.or_else(|| {
            // wearout attributes count down from 100 (higher = healthier);
            // invert the first one the drive exposes
            [snapshot.attr_177, snapshot.attr_233, snapshot.attr_231, snapshot.attr_232]
                .into_iter()
                .flatten()
                .find(|value| *value > 0)
                .map(|value| (100 - value).max(0))
        }),
        _ => None,
    };

    let Some(percentage_used) = percentage_used else {
        return;
    };

    let mut estimate = EnduranceEstimate {
        available: true,
        percentage_used,
        estimated_lifespan_days: None,
        tbw_so_far: 0.0,
    };

    if cumulative_write_bytes > 0 {
        let tbw = cumulative_write_bytes as f64 / TIB;
        estimate.tbw_so_far = (tbw * 100.0).round() / 100.0;
    }

    if percentage_used > 0 && snapshot.power_on_hours > 0 {
        let total_lifespan_hours =
            snapshot.power_on_hours as f64 / (percentage_used as f64 / 100.0);
        let remaining_hours = total_lifespan_hours - snapshot.power_on_hours as f64;
        if remaining_hours > 0.0 {
            estimate.estimated_lifespan_days = Some((remaining_hours / 24.0) as i64);
        }
    }

    insight.endurance = Some(estimate);
}

/// Compare the two most recent raw points; when they are at least half an
/// hour apart and the recent daily write rate exceeds 3x the window
/// baseline, report a spike. `recent` is ordered newest first.
pub fn detect_spike(
    recent: &[WorkloadSnapshot],
    baseline_daily_write_bytes: i64,
    protocol: &str,
) -> Option<ActivitySpike> {
    if recent.len() < 2 || baseline_daily_write_bytes <= 0 {
        return None;
    }

    let newest = &recent[0];
    let previous = &recent[1];

    let elapsed_hours = (newest.time - previous.time) as f64 / 3600.0;
    if elapsed_hours < 0.5 {
        return None;
    }

    let recent_written_bytes = match protocol {
        "ATA" => {
            if let (Some(n), Some(p)) = (newest.attr_241_raw, previous.attr_241_raw) {
                (n - p) * newest.logical_block_size
            } else if let (Some(n), Some(p)) = (newest.devstat_1_24, previous.devstat_1_24) {
                (n - p) * newest.logical_block_size
            } else {
                0
            }
        }
        "NVMe" => {
            if let (Some(n), Some(p)) = (newest.data_units_written, previous.data_units_written) {
                (n - p) * NVME_UNIT_BYTES
            } else {
                0
            }
        }
        _ => return None,
    };

    if recent_written_bytes <= 0 {
        return None;
    }

    let recent_daily_write_bytes = (recent_written_bytes as f64 / (elapsed_hours / 24.0)) as i64;
    let spike_factor = recent_daily_write_bytes as f64 / baseline_daily_write_bytes as f64;

    if spike_factor > 3.0 {
        return Some(ActivitySpike {
            detected: true,
            spike_factor: (spike_factor * 10.0).round() / 10.0,
            recent_daily_write_bytes,
            baseline_daily_write_bytes,
            description: format!("Write rate is {spike_factor:.1}x above baseline"),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ata_snapshot(time: i64, lbas_written: i64, lbas_read: i64) -> WorkloadSnapshot {
        WorkloadSnapshot {
            time,
            logical_block_size: 512,
            attr_241_raw: Some(lbas_written),
            attr_242_raw: Some(lbas_read),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_intensity_boundaries() {
        let gib = 1024_i64 * 1024 * 1024;
        assert_eq!(classify_intensity(0), "idle");
        assert_eq!(classify_intensity(gib - 1), "idle");
        assert_eq!(classify_intensity(gib), "light");
        assert_eq!(classify_intensity(20 * gib - 1), "light");
        assert_eq!(classify_intensity(20 * gib), "medium");
        assert_eq!(classify_intensity(100 * gib - 1), "medium");
        assert_eq!(classify_intensity(100 * gib), "heavy");
    }

    #[test]
    fn test_classify_intensity_monotone() {
        let ranks = |label: &str| match label {
            "idle" => 0,
            "light" => 1,
            "medium" => 2,
            _ => 3,
        };
        let gib = 1024_i64 * 1024 * 1024;
        let mut previous_rank = 0;
        for bytes in [0, gib / 2, gib, 5 * gib, 20 * gib, 50 * gib, 100 * gib, 500 * gib] {
            let rank = ranks(classify_intensity(bytes));
            assert!(rank >= previous_rank, "intensity must not decrease");
            previous_rank = rank;
        }
    }

    #[test]
    fn test_compute_insight_ata_daily_rates() {
        // 24h window, 2 GiB written, 4 GiB read
        let written_lbas = 2 * 1024 * 1024 * 1024 / 512;
        let read_lbas = 4 * 1024 * 1024 * 1024 / 512;
        let first = ata_snapshot(0, 1000, 2000);
        let last = ata_snapshot(86400, 1000 + written_lbas, 2000 + read_lbas);

        let mut insight = WorkloadInsight::unknown("w", "ATA");
        compute_insight(&mut insight, &first, &last, "ATA");

        assert_eq!(insight.total_write_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(insight.total_read_bytes, 4 * 1024 * 1024 * 1024);
        assert_eq!(insight.daily_write_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(insight.intensity, "light");
        assert!((insight.read_write_ratio - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_compute_insight_negative_delta_clamped() {
        // counter reset between the two snapshots
        let first = ata_snapshot(0, 1_000_000, 2_000_000);
        let last = ata_snapshot(86400, 500, 900);

        let mut insight = WorkloadInsight::unknown("w", "ATA");
        compute_insight(&mut insight, &first, &last, "ATA");

        assert_eq!(insight.total_write_bytes, 0);
        assert_eq!(insight.total_read_bytes, 0);
        assert_eq!(insight.intensity, "idle");
    }

    #[test]
    fn test_compute_insight_short_window_unknown() {
        let first = ata_snapshot(0, 0, 0);
        let last = ata_snapshot(1800, 1_000_000, 1_000_000);

        let mut insight = WorkloadInsight::unknown("w", "ATA");
        compute_insight(&mut insight, &first, &last, "ATA");
        assert_eq!(insight.intensity, "unknown");
    }

    #[test]
    fn test_compute_insight_scsi_unknown() {
        let first = WorkloadSnapshot {
            time: 0,
            ..Default::default()
        };
        let last = WorkloadSnapshot {
            time: 86400,
            ..Default::default()
        };
        let mut insight = WorkloadInsight::unknown("w", "SCSI");
        compute_insight(&mut insight, &first, &last, "SCSI");
        assert_eq!(insight.intensity, "unknown");
    }

    #[test]
    fn test_compute_insight_nvme_data_units() {
        // NVMe data unit = 512,000 bytes
        let first = WorkloadSnapshot {
            time: 0,
            data_units_written: Some(1000),
            data_units_read: Some(1000),
            ..Default::default()
        };
        let last = WorkloadSnapshot {
            time: 86400,
            data_units_written: Some(1000 + 10_000),
            data_units_read: Some(1000 + 5_000),
            ..Default::default()
        };

        let mut insight = WorkloadInsight::unknown("w", "NVMe");
        compute_insight(&mut insight, &first, &last, "NVMe");
        assert_eq!(insight.total_write_bytes, 10_000 * 512_000);
        assert_eq!(insight.total_read_bytes, 5_000 * 512_000);
    }

    #[test]
    fn test_endurance_from_nvme_percentage_used() {
        let first = WorkloadSnapshot {
            time: 0,
            data_units_written: Some(0),
            ..Default::default()
        };
        let last = WorkloadSnapshot {
            time: 86400,
            power_on_hours: 10_000,
            data_units_written: Some(100),
            percentage_used: Some(20),
            ..Default::default()
        };

        let mut insight = WorkloadInsight::unknown("w", "NVMe");
        compute_insight(&mut insight, &first, &last, "NVMe");

        let endurance = insight.endurance.unwrap();
        assert_eq!(endurance.percentage_used, 20);
        // total lifespan 50,000h, 40,000h remaining => 1666 days
        assert_eq!(endurance.estimated_lifespan_days, Some(1666));
    }

    #[test]
    fn test_endurance_inverts_ata_wearout() {
        let first = ata_snapshot(0, 0, 0);
        let mut last = ata_snapshot(86400, 100, 100);
        last.power_on_hours = 8760;
        last.attr_177 = Some(88); // 12% used

        let mut insight = WorkloadInsight::unknown("w", "ATA");
        compute_insight(&mut insight, &first, &last, "ATA");

        let endurance = insight.endurance.unwrap();
        assert_eq!(endurance.percentage_used, 12);
    }

    #[test]
    fn test_spike_detected_above_three_x() {
        let baseline_daily = 1024 * 1024 * 1024; // 1 GiB/day
        // 1h apart, 1 GiB written in that hour => 24 GiB/day, 24x baseline
        let lbas_per_gib = 1024 * 1024 * 1024 / 512;
        let newest = ata_snapshot(7200, 2 * lbas_per_gib, 0);
        let previous = ata_snapshot(3600, lbas_per_gib, 0);

        let spike = detect_spike(&[newest, previous], baseline_daily, "ATA").unwrap();
        assert!(spike.detected);
        assert_eq!(spike.spike_factor, 24.0);
        assert_eq!(spike.description, "Write rate is 24.0x above baseline");
    }

    #[test]
    fn test_spike_not_detected_below_three_x() {
        let baseline_daily = 24 * 1024 * 1024 * 1024_i64;
        let lbas_per_gib = 1024 * 1024 * 1024 / 512;
        let newest = ata_snapshot(7200, 2 * lbas_per_gib, 0);
        let previous = ata_snapshot(3600, lbas_per_gib, 0);

        assert!(detect_spike(&[newest, previous], baseline_daily, "ATA").is_none());
    }

    #[test]
    fn test_spike_requires_half_hour_gap() {
        let baseline_daily = 1024;
        let newest = ata_snapshot(1000, 1_000_000, 0);
        let previous = ata_snapshot(0, 0, 0);

        assert!(detect_spike(&[newest, previous], baseline_daily, "ATA").is_none());
    }

    #[test]
    fn test_spike_requires_baseline() {
        let lbas_per_gib = 1024 * 1024 * 1024 / 512;
        let newest = ata_snapshot(7200, 2 * lbas_per_gib, 0);
        let previous = ata_snapshot(3600, lbas_per_gib, 0);

        assert!(detect_spike(&[newest, previous], 0, "ATA").is_none());
    }
}
