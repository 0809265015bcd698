use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Time-series block-device benchmark metrics posted by the performance
/// collector. Latencies are nanoseconds, bandwidth is bytes/sec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Performance {
    pub date: DateTime<Utc>,
    pub device_wwn: String,
    pub device_protocol: String,
    /// "quick" or "comprehensive"
    pub profile: String,

    pub seq_read_bw_bytes: f64,
    pub seq_write_bw_bytes: f64,

    pub rand_read_iops: f64,
    pub rand_write_iops: f64,

    pub rand_read_lat_ns_avg: f64,
    pub rand_read_lat_ns_p50: f64,
    pub rand_read_lat_ns_p95: f64,
    pub rand_read_lat_ns_p99: f64,

    pub rand_write_lat_ns_avg: f64,
    pub rand_write_lat_ns_p50: f64,
    pub rand_write_lat_ns_p95: f64,
    pub rand_write_lat_ns_p99: f64,

    /// Mixed random read/write IOPS (comprehensive profile only).
    pub mixed_rw_iops: f64,

    pub fio_version: String,
    pub test_duration_sec: f64,
}

impl Performance {
    pub fn flatten(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("seq_read_bw_bytes".to_string(), Value::from(self.seq_read_bw_bytes));
        fields.insert("seq_write_bw_bytes".to_string(), Value::from(self.seq_write_bw_bytes));
        fields.insert("rand_read_iops".to_string(), Value::from(self.rand_read_iops));
        fields.insert("rand_write_iops".to_string(), Value::from(self.rand_write_iops));
        fields.insert("rand_read_lat_ns_avg".to_string(), Value::from(self.rand_read_lat_ns_avg));
        fields.insert("rand_read_lat_ns_p50".to_string(), Value::from(self.rand_read_lat_ns_p50));
        fields.insert("rand_read_lat_ns_p95".to_string(), Value::from(self.rand_read_lat_ns_p95));
        fields.insert("rand_read_lat_ns_p99".to_string(), Value::from(self.rand_read_lat_ns_p99));
        fields.insert("rand_write_lat_ns_avg".to_string(), Value::from(self.rand_write_lat_ns_avg));
        fields.insert("rand_write_lat_ns_p50".to_string(), Value::from(self.rand_write_lat_ns_p50));
        fields.insert("rand_write_lat_ns_p95".to_string(), Value::from(self.rand_write_lat_ns_p95));
        fields.insert("rand_write_lat_ns_p99".to_string(), Value::from(self.rand_write_lat_ns_p99));
        fields.insert("mixed_rw_iops".to_string(), Value::from(self.mixed_rw_iops));
        fields.insert("fio_version".to_string(), Value::from(self.fio_version.clone()));
        fields.insert("test_duration_sec".to_string(), Value::from(self.test_duration_sec));
        fields
    }

    pub fn from_fields(
        wwn: &str,
        protocol: &str,
        profile: &str,
        date: DateTime<Utc>,
        fields: &Map<String, Value>,
    ) -> Performance {
        let f = |key: &str| fields.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        Performance {
            date,
            device_wwn: wwn.to_string(),
            device_protocol: protocol.to_string(),
            profile: profile.to_string(),
            seq_read_bw_bytes: f("seq_read_bw_bytes"),
            seq_write_bw_bytes: f("seq_write_bw_bytes"),
            rand_read_iops: f("rand_read_iops"),
            rand_write_iops: f("rand_write_iops"),
            rand_read_lat_ns_avg: f("rand_read_lat_ns_avg"),
            rand_read_lat_ns_p50: f("rand_read_lat_ns_p50"),
            rand_read_lat_ns_p95: f("rand_read_lat_ns_p95"),
            rand_read_lat_ns_p99: f("rand_read_lat_ns_p99"),
            rand_write_lat_ns_avg: f("rand_write_lat_ns_avg"),
            rand_write_lat_ns_p50: f("rand_write_lat_ns_p50"),
            rand_write_lat_ns_p95: f("rand_write_lat_ns_p95"),
            rand_write_lat_ns_p99: f("rand_write_lat_ns_p99"),
            mixed_rw_iops: f("mixed_rw_iops"),
            fio_version: fields
                .get("fio_version")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            test_duration_sec: f("test_duration_sec"),
        }
    }
}

/// Averaged performance metrics over recent runs, used as a comparison
/// baseline for degradation detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    pub seq_read_bw_bytes: f64,
    pub seq_write_bw_bytes: f64,
    pub rand_read_iops: f64,
    pub rand_write_iops: f64,
    pub rand_read_lat_ns_avg: f64,
    pub rand_write_lat_ns_avg: f64,
    pub sample_count: usize,
}

impl PerformanceBaseline {
    pub fn from_history(history: &[Performance]) -> Option<PerformanceBaseline> {
        if history.is_empty() {
            return None;
        }
        let n = history.len() as f64;
        let mut baseline = PerformanceBaseline {
            sample_count: history.len(),
            ..Default::default()
        };
        for p in history {
            baseline.seq_read_bw_bytes += p.seq_read_bw_bytes;
            baseline.seq_write_bw_bytes += p.seq_write_bw_bytes;
            baseline.rand_read_iops += p.rand_read_iops;
            baseline.rand_write_iops += p.rand_write_iops;
            baseline.rand_read_lat_ns_avg += p.rand_read_lat_ns_avg;
            baseline.rand_write_lat_ns_avg += p.rand_write_lat_ns_avg;
        }
        baseline.seq_read_bw_bytes /= n;
        baseline.seq_write_bw_bytes /= n;
        baseline.rand_read_iops /= n;
        baseline.rand_write_iops /= n;
        baseline.rand_read_lat_ns_avg /= n;
        baseline.rand_write_lat_ns_avg /= n;
        Some(baseline)
    }
}
