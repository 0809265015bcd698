use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use log::info;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};

use crate::error::DrivePulseError;
use crate::measurements::{Performance, Smart, SmartTemperature, ZfsPoolMetrics};
use crate::status::{DeviceProtocol, DeviceStatus};

use super::schema::METRICS_SCHEMA_SQL;

pub const MEASUREMENT_SMART: &str = "smart";
pub const MEASUREMENT_TEMPERATURE: &str = "temperature";
pub const MEASUREMENT_PERFORMANCE: &str = "performance";
pub const MEASUREMENT_ZFS_POOL_METRICS: &str = "zfs_pool_metrics";

const METRICS_DB_FILENAME: &str = "metrics.db";

/// Duration-keyed query window. The storage plane maps each key to a
/// (bucket, time-range) pair; monitors rely on this mapping for last-seen
/// correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationKey {
    Day,
    Week,
    Month,
    Year,
    Forever,
}

impl DurationKey {
    pub fn parse(s: &str) -> Option<DurationKey> {
        match s {
            "day" => Some(DurationKey::Day),
            "week" => Some(DurationKey::Week),
            "month" => Some(DurationKey::Month),
            "year" => Some(DurationKey::Year),
            "forever" => Some(DurationKey::Forever),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DurationKey::Day => "day",
            DurationKey::Week => "week",
            DurationKey::Month => "month",
            DurationKey::Year => "year",
            DurationKey::Forever => "forever",
        }
    }

    /// Retention buckets consulted for this window. Day and week read the
    /// raw bucket; month reads the weekly downsample; year reads the
    /// monthly downsample; forever unions all four.
    pub fn buckets(&self) -> &'static [Bucket] {
        match self {
            DurationKey::Day | DurationKey::Week => &[Bucket::Raw],
            DurationKey::Month => &[Bucket::Weekly],
            DurationKey::Year => &[Bucket::Monthly],
            DurationKey::Forever => {
                &[Bucket::Raw, Bucket::Weekly, Bucket::Monthly, Bucket::Yearly]
            }
        }
    }

    pub fn range_start(&self, now: DateTime<Utc>) -> i64 {
        match self {
            DurationKey::Day => (now - Duration::days(1)).timestamp(),
            DurationKey::Week => (now - Duration::weeks(1)).timestamp(),
            DurationKey::Month => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now)
                .timestamp(),
            DurationKey::Year => now
                .checked_sub_months(Months::new(12))
                .unwrap_or(now)
                .timestamp(),
            DurationKey::Forever => 0,
        }
    }
}

/// A retention bucket: its own table with its own downsampling and expiry.
/// Aggregation jobs populate the coarser buckets; the ingest path only
/// writes raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Raw,
    Weekly,
    Monthly,
    Yearly,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Bucket::Raw, Bucket::Weekly, Bucket::Monthly, Bucket::Yearly];

    pub fn table(&self) -> &'static str {
        match self {
            Bucket::Raw => "metrics_raw",
            Bucket::Weekly => "metrics_weekly",
            Bucket::Monthly => "metrics_monthly",
            Bucket::Yearly => "metrics_yearly",
        }
    }
}

/// One stored point, as read back from a bucket.
#[derive(Debug, Clone)]
pub struct MetricPoint {
    pub tag_id: String,
    pub protocol: String,
    pub profile: String,
    pub ts: i64,
    pub status: i64,
    pub fields: Map<String, Value>,
}

/// The time-series store. Measurements are flattened to field maps and
/// partitioned into four retention buckets; writes are idempotent by
/// (measurement, tag, timestamp, profile).
#[derive(Debug)]
pub struct MetricsStore {
    conn: Mutex<Connection>,
    path: String,
}

impl MetricsStore {
    pub fn new(db_path: Option<PathBuf>) -> Result<Self, DrivePulseError> {
        let db_path = match db_path {
            Some(path) => path,
            None => super::default_data_dir()?.join(METRICS_DB_FILENAME),
        };

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening metrics store: {}", db_path.display());
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(METRICS_SCHEMA_SQL)?;

        Ok(MetricsStore {
            conn: Mutex::new(conn),
            path: db_path.to_string_lossy().into_owned(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("metrics mutex poisoned")
    }

    /// Write a point into one bucket. `INSERT OR REPLACE` keyed by
    /// (measurement, tag, ts, profile) makes retried collector submissions
    /// idempotent.
    pub fn write(
        &self,
        bucket: Bucket,
        measurement: &str,
        tag_id: &str,
        protocol: &str,
        profile: &str,
        ts: i64,
        status: i64,
        fields: &Map<String, Value>,
    ) -> Result<(), DrivePulseError> {
        let fields_json = serde_json::to_string(fields)?;
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (measurement, tag_id, protocol, profile, ts, status, fields)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                bucket.table()
            ),
            params![measurement, tag_id, protocol, profile, ts, status, fields_json],
        )?;
        Ok(())
    }

    pub fn save_smart(&self, smart: &Smart) -> Result<(), DrivePulseError> {
        let (tags, fields) = smart.flatten();
        self.write(
            Bucket::Raw,
            MEASUREMENT_SMART,
            &tags["device_wwn"],
            &tags["device_protocol"],
            "",
            smart.date.timestamp(),
            smart.status.0,
            &fields,
        )
    }

    /// Temperature is persisted separately with a distinct retention
    /// schedule.
    pub fn save_temperature(
        &self,
        wwn: &str,
        protocol: &str,
        temperature: &SmartTemperature,
    ) -> Result<(), DrivePulseError> {
        self.write(
            Bucket::Raw,
            MEASUREMENT_TEMPERATURE,
            wwn,
            protocol,
            "",
            temperature.date.timestamp(),
            0,
            &temperature.flatten(),
        )
    }

    pub fn save_performance(&self, perf: &Performance) -> Result<(), DrivePulseError> {
        self.write(
            Bucket::Raw,
            MEASUREMENT_PERFORMANCE,
            &perf.device_wwn,
            &perf.device_protocol,
            &perf.profile,
            perf.date.timestamp(),
            0,
            &perf.flatten(),
        )
    }

    pub fn save_zfs_pool_metrics(&self, metrics: &ZfsPoolMetrics) -> Result<(), DrivePulseError> {
        self.write(
            Bucket::Raw,
            MEASUREMENT_ZFS_POOL_METRICS,
            &metrics.pool_guid,
            "",
            "",
            metrics.date.timestamp(),
            0,
            &metrics.flatten(),
        )
    }

    fn query_points(
        &self,
        buckets: &[Bucket],
        measurement: &str,
        tag_id: Option<&str>,
        start_ts: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MetricPoint>, DrivePulseError> {
        let mut selects = Vec::new();
        for bucket in buckets {
            selects.push(format!(
                "SELECT tag_id, protocol, profile, ts, status, fields FROM {}
                 WHERE measurement = ?1 AND ts >= ?2{}",
                bucket.table(),
                if tag_id.is_some() { " AND tag_id = ?3" } else { "" }
            ));
        }
        let mut sql = selects.join(" UNION ALL ");
        sql.push_str(" ORDER BY ts DESC");
        if limit >= 0 {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String, String, i64, i64, String)> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        };

        let rows: Vec<(String, String, String, i64, i64, String)> = match tag_id {
            Some(tag) => stmt
                .query_map(params![measurement, start_ts, tag], map_row)?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map(params![measurement, start_ts], map_row)?
                .collect::<Result<_, _>>()?,
        };

        let mut points = Vec::with_capacity(rows.len());
        for (tag_id, protocol, profile, ts, status, fields_json) in rows {
            let fields: Map<String, Value> = serde_json::from_str(&fields_json)?;
            points.push(MetricPoint {
                tag_id,
                protocol,
                profile,
                ts,
                status,
                fields,
            });
        }
        Ok(points)
    }

    fn point_to_smart(point: &MetricPoint) -> Option<Smart> {
        let protocol: DeviceProtocol = point.protocol.parse().ok()?;
        let date = Utc.timestamp_opt(point.ts, 0).single()?;
        Some(Smart::from_fields(
            &point.tag_id,
            protocol,
            date,
            DeviceStatus(point.status),
            &point.fields,
        ))
    }

    /// Newest raw SMART point for a device.
    pub fn get_latest_smart(&self, wwn: &str) -> Result<Option<Smart>, DrivePulseError> {
        let points = self.query_points(&[Bucket::Raw], MEASUREMENT_SMART, Some(wwn), 0, 1, 0)?;
        Ok(points.first().and_then(Self::point_to_smart))
    }

    /// Second-newest raw SMART point, used for delta evaluation and repeat
    /// notification detection.
    pub fn get_previous_smart(&self, wwn: &str) -> Result<Option<Smart>, DrivePulseError> {
        let points = self.query_points(&[Bucket::Raw], MEASUREMENT_SMART, Some(wwn), 0, 1, 1)?;
        Ok(points.first().and_then(Self::point_to_smart))
    }

    /// Ordered SMART points over a duration-keyed window. When `attributes`
    /// is given, each point is trimmed to those attribute ids.
    pub fn get_smart_history(
        &self,
        wwn: &str,
        duration_key: DurationKey,
        limit: i64,
        offset: i64,
        attributes: Option<&[String]>,
    ) -> Result<Vec<Smart>, DrivePulseError> {
        let start_ts = duration_key.range_start(Utc::now());
        let points = self.query_points(
            duration_key.buckets(),
            MEASUREMENT_SMART,
            Some(wwn),
            start_ts,
            limit,
            offset,
        )?;

        let mut history: Vec<Smart> = points.iter().filter_map(Self::point_to_smart).collect();
        if let Some(wanted) = attributes {
            for smart in &mut history {
                smart.attributes.retain(|id, _| wanted.iter().any(|w| w == id));
            }
        }
        Ok(history)
    }

    /// Map of device WWN to its newest SMART timestamp, unioned across all
    /// four retention buckets. The missed-ping monitor depends on the union:
    /// a device whose raw points have aged out must still count as seen.
    pub fn get_last_seen_all(&self) -> Result<HashMap<String, DateTime<Utc>>, DrivePulseError> {
        let selects: Vec<String> = Bucket::ALL
            .iter()
            .map(|bucket| {
                format!(
                    "SELECT tag_id, ts FROM {} WHERE measurement = ?1",
                    bucket.table()
                )
            })
            .collect();
        let sql = format!(
            "SELECT tag_id, MAX(ts) FROM ({}) GROUP BY tag_id",
            selects.join(" UNION ALL ")
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([MEASUREMENT_SMART], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut last_seen = HashMap::new();
        for row in rows {
            let (wwn, ts) = row?;
            if let Some(date) = Utc.timestamp_opt(ts, 0).single() {
                last_seen.insert(wwn, date);
            }
        }
        Ok(last_seen)
    }

    /// Temperature series over a window, grouped by device.
    pub fn get_temperature_history(
        &self,
        duration_key: DurationKey,
    ) -> Result<HashMap<String, Vec<SmartTemperature>>, DrivePulseError> {
        let start_ts = duration_key.range_start(Utc::now());
        let points = self.query_points(
            duration_key.buckets(),
            MEASUREMENT_TEMPERATURE,
            None,
            start_ts,
            -1,
            0,
        )?;

        let mut grouped: HashMap<String, Vec<SmartTemperature>> = HashMap::new();
        for point in points {
            let Some(date) = Utc.timestamp_opt(point.ts, 0).single() else {
                continue;
            };
            grouped
                .entry(point.tag_id.clone())
                .or_default()
                .push(SmartTemperature::from_fields(date, &point.fields));
        }
        for series in grouped.values_mut() {
            series.sort_by_key(|t| t.date);
        }
        Ok(grouped)
    }

    pub fn get_performance_history(
        &self,
        wwn: &str,
        duration_key: DurationKey,
    ) -> Result<Vec<Performance>, DrivePulseError> {
        let start_ts = duration_key.range_start(Utc::now());
        let points = self.query_points(
            duration_key.buckets(),
            MEASUREMENT_PERFORMANCE,
            Some(wwn),
            start_ts,
            -1,
            0,
        )?;

        Ok(points
            .iter()
            .filter_map(|point| {
                let date = Utc.timestamp_opt(point.ts, 0).single()?;
                Some(Performance::from_fields(
                    &point.tag_id,
                    &point.protocol,
                    &point.profile,
                    date,
                    &point.fields,
                ))
            })
            .collect())
    }

    pub fn get_zfs_pool_metrics_history(
        &self,
        guid: &str,
        duration_key: DurationKey,
    ) -> Result<Vec<ZfsPoolMetrics>, DrivePulseError> {
        let start_ts = duration_key.range_start(Utc::now());
        let points = self.query_points(
            duration_key.buckets(),
            MEASUREMENT_ZFS_POOL_METRICS,
            Some(guid),
            start_ts,
            -1,
            0,
        )?;

        Ok(points
            .iter()
            .filter_map(|point| {
                let date = Utc.timestamp_opt(point.ts, 0).single()?;
                Some(ZfsPoolMetrics::from_fields(&point.tag_id, date, &point.fields))
            })
            .collect())
    }

    /// Oldest and newest SMART point per device inside the window; the
    /// workload engine derives byte rates from the pair.
    pub fn get_smart_first_last(
        &self,
        duration_key: DurationKey,
    ) -> Result<HashMap<String, (MetricPoint, MetricPoint)>, DrivePulseError> {
        let start_ts = duration_key.range_start(Utc::now());
        let points = self.query_points(
            duration_key.buckets(),
            MEASUREMENT_SMART,
            None,
            start_ts,
            -1,
            0,
        )?;

        // points are ordered newest first
        let mut first_last: HashMap<String, (MetricPoint, MetricPoint)> = HashMap::new();
        for point in points {
            match first_last.entry(point.tag_id.clone()) {
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert((point.clone(), point));
                }
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    // older point becomes the new "first"
                    entry.get_mut().0 = point;
                }
            }
        }
        Ok(first_last)
    }

    /// Up to `per_device` most recent raw SMART points per device, newest
    /// first. Feeds write-spike detection.
    pub fn get_recent_smart_points(
        &self,
        per_device: usize,
    ) -> Result<HashMap<String, Vec<MetricPoint>>, DrivePulseError> {
        let start_ts = (Utc::now() - Duration::weeks(1)).timestamp();
        let points =
            self.query_points(&[Bucket::Raw], MEASUREMENT_SMART, None, start_ts, -1, 0)?;

        let mut grouped: HashMap<String, Vec<MetricPoint>> = HashMap::new();
        for point in points {
            let series = grouped.entry(point.tag_id.clone()).or_default();
            if series.len() < per_device {
                series.push(point);
            }
        }
        Ok(grouped)
    }

    /// Delete every measurement for a device. Fans out across all four
    /// retention buckets.
    pub fn delete_device_measurements(&self, tag_id: &str) -> Result<(), DrivePulseError> {
        let conn = self.conn();
        for bucket in Bucket::ALL {
            info!("Deleting measurements for {} in bucket: {}", tag_id, bucket.table());
            conn.execute(
                &format!("DELETE FROM {} WHERE tag_id = ?1", bucket.table()),
                [tag_id],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::collector::{AtaSmartAttributeRaw, AtaSmartAttributesTableItem, SmartInfo};
    use tempfile::TempDir;

    fn test_store(temp_dir: &TempDir) -> MetricsStore {
        MetricsStore::new(Some(temp_dir.path().join("metrics.db"))).expect("store should open")
    }

    fn sample_smart(wwn: &str, ts_offset_secs: i64, raw_199: i64) -> Smart {
        let mut info = SmartInfo::default();
        info.device.protocol = "ATA".to_string();
        info.smart_status.passed = true;
        info.local_time.time_t = Utc::now().timestamp() - ts_offset_secs;
        info.power_on_time.hours = 1730;
        info.ata_smart_attributes.table.push(AtaSmartAttributesTableItem {
            id: 199,
            name: "UDMA_CRC_Error_Count".to_string(),
            value: 200,
            worst: 200,
            raw: AtaSmartAttributeRaw {
                value: raw_199,
                string: raw_199.to_string(),
            },
            ..Default::default()
        });
        Smart::from_collector_info(&Config::default(), wwn, &info, &[]).unwrap()
    }

    #[test]
    fn test_smart_write_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let smart = sample_smart("0x5000cca264eb01d7", 0, 5);
        store.save_smart(&smart).unwrap();

        let latest = store.get_latest_smart("0x5000cca264eb01d7").unwrap().unwrap();
        assert_eq!(latest.device_wwn, smart.device_wwn);
        assert_eq!(latest.attributes.len(), smart.attributes.len());
        for (id, attr) in &smart.attributes {
            let restored = &latest.attributes[id];
            assert_eq!(restored.status(), attr.status());
            assert_eq!(restored.transformed_value(), attr.transformed_value());
            assert_eq!(restored.status_reason(), attr.status_reason());
        }
    }

    #[test]
    fn test_write_is_idempotent_by_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let smart = sample_smart("0x5000cca264eb01d7", 0, 5);
        store.save_smart(&smart).unwrap();
        store.save_smart(&smart).unwrap();

        let history = store
            .get_smart_history("0x5000cca264eb01d7", DurationKey::Week, -1, 0, None)
            .unwrap();
        assert_eq!(history.len(), 1, "replayed write must not duplicate the point");
    }

    #[test]
    fn test_latest_and_previous_ordering() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        store.save_smart(&sample_smart("0x5000cca264eb01d7", 3600, 5)).unwrap();
        store.save_smart(&sample_smart("0x5000cca264eb01d7", 0, 9)).unwrap();

        let latest = store.get_latest_smart("0x5000cca264eb01d7").unwrap().unwrap();
        let previous = store.get_previous_smart("0x5000cca264eb01d7").unwrap().unwrap();
        assert_eq!(latest.ata_raw_values()["199"], 9);
        assert_eq!(previous.ata_raw_values()["199"], 5);
    }

    #[test]
    fn test_month_window_reads_weekly_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let smart = sample_smart("0x5000cca264eb01d7", 0, 0);
        // raw point exists, but the weekly downsample is empty
        store.save_smart(&smart).unwrap();

        let month = store
            .get_smart_history("0x5000cca264eb01d7", DurationKey::Month, -1, 0, None)
            .unwrap();
        assert!(month.is_empty(), "month window must read only the weekly bucket");

        // once the aggregation job populates the weekly bucket, it appears
        let (_, fields) = smart.flatten();
        store
            .write(
                Bucket::Weekly,
                MEASUREMENT_SMART,
                "0x5000cca264eb01d7",
                "ATA",
                "",
                smart.date.timestamp(),
                smart.status.0,
                &fields,
            )
            .unwrap();
        let month = store
            .get_smart_history("0x5000cca264eb01d7", DurationKey::Month, -1, 0, None)
            .unwrap();
        assert_eq!(month.len(), 1);
    }

    #[test]
    fn test_last_seen_unions_all_buckets() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let smart = sample_smart("0x5000cca264eb01d7", 0, 0);
        let (_, fields) = smart.flatten();
        // only the yearly bucket still holds this device's data
        store
            .write(
                Bucket::Yearly,
                MEASUREMENT_SMART,
                "0x5000cca264eb01d7",
                "ATA",
                "",
                smart.date.timestamp(),
                0,
                &fields,
            )
            .unwrap();

        let last_seen = store.get_last_seen_all().unwrap();
        assert!(last_seen.contains_key("0x5000cca264eb01d7"));
    }

    #[test]
    fn test_delete_fans_out_to_every_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let smart = sample_smart("0x5000cca264eb01d7", 0, 0);
        let (_, fields) = smart.flatten();
        for bucket in Bucket::ALL {
            store
                .write(
                    bucket,
                    MEASUREMENT_SMART,
                    "0x5000cca264eb01d7",
                    "ATA",
                    "",
                    smart.date.timestamp(),
                    0,
                    &fields,
                )
                .unwrap();
        }

        store.delete_device_measurements("0x5000cca264eb01d7").unwrap();
        assert!(store.get_last_seen_all().unwrap().is_empty());
    }

    #[test]
    fn test_temperature_history_grouped_by_device() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let now = Utc::now();
        for (wwn, temp) in [("0xaaaa00000000000a", 35), ("0xbbbb00000000000b", 41)] {
            store
                .save_temperature(
                    wwn,
                    "ATA",
                    &SmartTemperature { date: now, temp },
                )
                .unwrap();
        }

        let history = store.get_temperature_history(DurationKey::Week).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history["0xaaaa00000000000a"][0].temp, 35);
        assert_eq!(history["0xbbbb00000000000b"][0].temp, 41);
    }

    #[test]
    fn test_performance_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let perf = Performance {
            date: Utc::now(),
            device_wwn: "0x5000cca264eb01d7".to_string(),
            device_protocol: "ATA".to_string(),
            profile: "quick".to_string(),
            seq_read_bw_bytes: 210_000_000.0,
            rand_read_iops: 420.0,
            ..Default::default()
        };
        store.save_performance(&perf).unwrap();

        let history = store
            .get_performance_history("0x5000cca264eb01d7", DurationKey::Week)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].profile, "quick");
        assert_eq!(history[0].seq_read_bw_bytes, 210_000_000.0);
    }

    #[test]
    fn test_smart_history_attribute_filter() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let smart = sample_smart("0x5000cca264eb01d7", 0, 5);
        store.save_smart(&smart).unwrap();

        let filtered = store
            .get_smart_history(
                "0x5000cca264eb01d7",
                DurationKey::Week,
                -1,
                0,
                Some(&["199".to_string()]),
            )
            .unwrap();
        assert_eq!(filtered[0].attributes.len(), 1);
        assert!(filtered[0].attributes.contains_key("199"));
    }
}
