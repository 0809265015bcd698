use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::info;
use rusqlite::{params, OptionalExtension, Row};

use crate::collector::SmartInfo;
use crate::config::Config;
use crate::database::{settings, Database, DurationKey, MetricsStore};
use crate::error::DrivePulseError;
use crate::measurements::{Performance, Smart, SmartTemperature, ZfsPoolMetrics};
use crate::models::{
    convert_override_rows, AttributeOverrideRow, Device, DeviceSummary, Settings, SmartSummary,
};
use crate::overrides::{self, AttributeOverride};
use crate::status::{AttributeStatus, DeviceProtocol, DeviceStatus};
use crate::validate;
use crate::workload::{self, WorkloadInsight, WorkloadSnapshot};
use crate::zfs::{ZfsPool, ZfsScrubState};

/// The storage plane: the relational store for metadata and the time-series
/// store for measurements, behind one handle. Web handlers share a single
/// `Arc<Repository>`; each background monitor owns its own instance so a
/// failed handle can be recreated without touching the request path.
#[derive(Debug)]
pub struct Repository {
    db: Database,
    metrics: MetricsStore,
    config: Arc<Config>,
}

impl Repository {
    pub fn connect(config: Arc<Config>) -> Result<Repository, DrivePulseError> {
        let db = Database::new(config.database.path.clone())?;
        let metrics = MetricsStore::new(config.database.metrics_path.clone())?;
        Ok(Repository {
            db,
            metrics,
            config,
        })
    }

    pub fn metrics(&self) -> &MetricsStore {
        &self.metrics
    }

    ////////////////////////////////////////////////////////////////////////
    // Devices
    ////////////////////////////////////////////////////////////////////////

    /// Insert a device, or refresh the collector-owned columns when the WWN
    /// is already registered.
    pub fn register_device(&self, device: &Device) -> Result<(), DrivePulseError> {
        let now = Utc::now().timestamp();
        self.db.conn().execute(
            "INSERT INTO devices
                 (wwn, host_id, device_name, manufacturer, model_name, serial_number,
                  firmware, device_protocol, device_type, capacity, label,
                  smart_display_mode, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
             ON CONFLICT(wwn) DO UPDATE SET
                 host_id = excluded.host_id,
                 device_name = excluded.device_name,
                 manufacturer = excluded.manufacturer,
                 model_name = excluded.model_name,
                 serial_number = excluded.serial_number,
                 firmware = excluded.firmware,
                 device_protocol = excluded.device_protocol,
                 device_type = excluded.device_type,
                 capacity = excluded.capacity,
                 label = excluded.label,
                 updated_at = excluded.updated_at",
            params![
                device.wwn,
                device.host_id,
                device.device_name,
                device.manufacturer,
                device.model_name,
                device.serial_number,
                device.firmware,
                device.device_protocol,
                device.device_type,
                device.capacity,
                device.label,
                device.smart_display_mode,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_devices(&self) -> Result<Vec<Device>, DrivePulseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!("SELECT {DEVICE_COLUMNS} FROM devices"))?;
        let devices = stmt
            .query_map([], row_to_device)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(devices)
    }

    pub fn get_device_details(&self, wwn: &str) -> Result<Device, DrivePulseError> {
        let conn = self.db.conn();
        conn.query_row(
            &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE wwn = ?1"),
            [wwn],
            row_to_device,
        )
        .optional()?
        .ok_or_else(|| DrivePulseError::Error(format!("device not found: {wwn}")))
    }

    /// Refresh device metadata from a collector SMART payload.
    pub fn update_device(&self, wwn: &str, info: &SmartInfo) -> Result<Device, DrivePulseError> {
        let mut device = self.get_device_details(wwn)?;
        device.update_from_collector_info(info)?;
        self.db.conn().execute(
            "UPDATE devices SET model_name = ?2, firmware = ?3, device_protocol = ?4,
                                serial_number = ?5, capacity = ?6, updated_at = ?7
             WHERE wwn = ?1",
            params![
                wwn,
                device.model_name,
                device.firmware,
                device.device_protocol,
                device.serial_number,
                device.capacity,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(device)
    }

    /// OR the given failure bits into the stored device status.
    pub fn update_device_status(
        &self,
        wwn: &str,
        status: DeviceStatus,
    ) -> Result<Device, DrivePulseError> {
        let mut device = self.get_device_details(wwn)?;
        device.device_status = device.device_status.with(status);
        self.db.conn().execute(
            "UPDATE devices SET device_status = ?2, updated_at = ?3 WHERE wwn = ?1",
            params![wwn, device.device_status.0, Utc::now().timestamp()],
        )?;
        Ok(device)
    }

    /// Clear all failure bits once a submission shows every attribute
    /// passing again.
    pub fn reset_device_status(&self, wwn: &str) -> Result<Device, DrivePulseError> {
        let mut device = self.get_device_details(wwn)?;
        device.device_status = DeviceStatus::PASSED;
        self.db.conn().execute(
            "UPDATE devices SET device_status = 0, updated_at = ?2 WHERE wwn = ?1",
            params![wwn, Utc::now().timestamp()],
        )?;
        Ok(device)
    }

    pub fn update_device_archived(&self, wwn: &str, archived: bool) -> Result<(), DrivePulseError> {
        self.update_device_flag(wwn, "archived", archived)
    }

    pub fn update_device_muted(&self, wwn: &str, muted: bool) -> Result<(), DrivePulseError> {
        self.update_device_flag(wwn, "muted", muted)
    }

    fn update_device_flag(
        &self,
        wwn: &str,
        column: &str,
        value: bool,
    ) -> Result<(), DrivePulseError> {
        let updated = self.db.conn().execute(
            &format!("UPDATE devices SET {column} = ?2, updated_at = ?3 WHERE wwn = ?1"),
            params![wwn, value, Utc::now().timestamp()],
        )?;
        if updated == 0 {
            return Err(DrivePulseError::Error(format!("device not found: {wwn}")));
        }
        Ok(())
    }

    pub fn update_device_label(&self, wwn: &str, label: &str) -> Result<(), DrivePulseError> {
        let updated = self.db.conn().execute(
            "UPDATE devices SET label = ?2, updated_at = ?3 WHERE wwn = ?1",
            params![wwn, label, Utc::now().timestamp()],
        )?;
        if updated == 0 {
            return Err(DrivePulseError::Error(format!("device not found: {wwn}")));
        }
        Ok(())
    }

    pub fn update_device_smart_display_mode(
        &self,
        wwn: &str,
        mode: &str,
    ) -> Result<(), DrivePulseError> {
        if !crate::models::valid_smart_display_mode(mode) {
            return Err(DrivePulseError::ValidationError(format!(
                "invalid smart_display_mode: {mode} (must be 'scrutiny', 'raw', or 'normalized')"
            )));
        }
        let updated = self.db.conn().execute(
            "UPDATE devices SET smart_display_mode = ?2, updated_at = ?3 WHERE wwn = ?1",
            params![wwn, mode, Utc::now().timestamp()],
        )?;
        if updated == 0 {
            return Err(DrivePulseError::Error(format!("device not found: {wwn}")));
        }
        Ok(())
    }

    pub fn update_device_has_forced_failure(
        &self,
        wwn: &str,
        has_forced_failure: bool,
    ) -> Result<(), DrivePulseError> {
        self.db.conn().execute(
            "UPDATE devices SET has_forced_failure = ?2, updated_at = ?3 WHERE wwn = ?1",
            params![wwn, has_forced_failure, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Delete a device and every measurement it ever produced. The WWN is
    /// re-validated before use in the delete predicates.
    pub fn delete_device(&self, wwn: &str) -> Result<(), DrivePulseError> {
        validate::validate_wwn(wwn)?;
        self.db
            .conn()
            .execute("DELETE FROM devices WHERE wwn = ?1", [wwn])?;
        self.metrics.delete_device_measurements(wwn)?;
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // SMART ingest
    ////////////////////////////////////////////////////////////////////////

    /// Evaluate a collector submission and persist it into the raw bucket.
    /// Delta evaluation runs against the previous stored raw point before
    /// the write, so the suppressed statuses are what gets persisted.
    pub fn save_smart_attributes(
        &self,
        wwn: &str,
        info: &SmartInfo,
    ) -> Result<Smart, DrivePulseError> {
        let merged_overrides = self.get_merged_overrides();
        let mut smart = Smart::from_collector_info(&self.config, wwn, info, &merged_overrides)?;

        if smart.device_protocol == DeviceProtocol::Ata {
            if let Some(previous) = self.metrics.get_latest_smart(wwn)? {
                smart.apply_delta_evaluation(&previous.ata_raw_values());
            }
        }

        self.metrics.save_smart(&smart)?;
        Ok(smart)
    }

    /// Persist the temperature sample carried by a submission (distinct
    /// retention from the full SMART point).
    pub fn save_smart_temperature(
        &self,
        wwn: &str,
        smart: &Smart,
    ) -> Result<(), DrivePulseError> {
        self.metrics.save_temperature(
            wwn,
            smart.device_protocol.as_str(),
            &SmartTemperature {
                date: smart.date,
                temp: smart.temp,
            },
        )
    }

    pub fn get_latest_smart_submission(&self, wwn: &str) -> Result<Option<Smart>, DrivePulseError> {
        self.metrics.get_latest_smart(wwn)
    }

    pub fn get_previous_smart_submission(
        &self,
        wwn: &str,
    ) -> Result<Option<Smart>, DrivePulseError> {
        self.metrics.get_previous_smart(wwn)
    }

    pub fn get_smart_history(
        &self,
        wwn: &str,
        duration_key: DurationKey,
        limit: i64,
        offset: i64,
        attributes: Option<&[String]>,
    ) -> Result<Vec<Smart>, DrivePulseError> {
        self.metrics
            .get_smart_history(wwn, duration_key, limit, offset, attributes)
    }

    ////////////////////////////////////////////////////////////////////////
    // Attribute overrides
    ////////////////////////////////////////////////////////////////////////

    pub fn get_attribute_overrides(&self) -> Result<Vec<AttributeOverrideRow>, DrivePulseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {OVERRIDE_COLUMNS} FROM attribute_overrides WHERE deleted_at IS NULL ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], row_to_override)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_attribute_override_by_id(
        &self,
        id: i64,
    ) -> Result<Option<AttributeOverrideRow>, DrivePulseError> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {OVERRIDE_COLUMNS} FROM attribute_overrides
                     WHERE id = ?1 AND deleted_at IS NULL"
                ),
                [id],
                row_to_override,
            )
            .optional()?;
        Ok(row)
    }

    /// Create or update a UI override. Rows saved through the API always
    /// carry source="ui"; config-file entries never hit this table.
    pub fn save_attribute_override(
        &self,
        row: &mut AttributeOverrideRow,
    ) -> Result<(), DrivePulseError> {
        row.validate()?;
        row.source = "ui".to_string();
        let now = Utc::now().timestamp();

        if row.id == 0 {
            self.db.conn().execute(
                "INSERT INTO attribute_overrides
                     (created_at, updated_at, protocol, attribute_id, wwn, action, status,
                      warn_above, fail_above, source)
                 VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    now,
                    row.protocol,
                    row.attribute_id,
                    row.wwn,
                    row.action,
                    row.status,
                    row.warn_above,
                    row.fail_above,
                    row.source,
                ],
            )?;
            row.id = self.db.conn().last_insert_rowid();
            row.created_at = now;
        } else {
            let updated = self.db.conn().execute(
                "UPDATE attribute_overrides
                 SET updated_at = ?2, protocol = ?3, attribute_id = ?4, wwn = ?5,
                     action = ?6, status = ?7, warn_above = ?8, fail_above = ?9, source = ?10
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![
                    row.id,
                    now,
                    row.protocol,
                    row.attribute_id,
                    row.wwn,
                    row.action,
                    row.status,
                    row.warn_above,
                    row.fail_above,
                    row.source,
                ],
            )?;
            if updated == 0 {
                return Err(DrivePulseError::Error(format!(
                    "override not found: {}",
                    row.id
                )));
            }
        }
        row.updated_at = now;
        Ok(())
    }

    /// Soft-delete an override row.
    pub fn delete_attribute_override(&self, id: i64) -> Result<(), DrivePulseError> {
        let updated = self.db.conn().execute(
            "UPDATE attribute_overrides SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, Utc::now().timestamp()],
        )?;
        if updated == 0 {
            return Err(DrivePulseError::Error(format!("override not found: {id}")));
        }
        Ok(())
    }

    /// Config-file overrides merged with database overrides; database
    /// entries win for identical (protocol, attribute_id, wwn) tuples.
    /// A database failure degrades to config-only rather than erroring:
    /// ingest must keep working.
    pub fn get_merged_overrides(&self) -> Vec<AttributeOverride> {
        let config_overrides = overrides::parse_config(&self.config);
        match self.get_attribute_overrides() {
            Ok(rows) => {
                overrides::merge_overrides(config_overrides, convert_override_rows(&rows))
            }
            Err(_) => config_overrides,
        }
    }

    /// Devices an override mutation can affect: every device matching the
    /// override's protocol (and WWN, when pinned).
    pub fn affected_device_wwns(&self, row: &AttributeOverrideRow) -> Result<Vec<String>, DrivePulseError> {
        let devices = self.get_devices()?;
        Ok(devices
            .into_iter()
            .filter(|d| d.device_protocol == row.protocol)
            .filter(|d| row.wwn.is_empty() || row.wwn == d.wwn)
            .map(|d| d.wwn)
            .collect())
    }

    /// Re-evaluate a device's stored status with the current overrides
    /// applied, after an override add/modify/delete. Delta evaluation is
    /// already baked into the stored statuses and is not re-run here.
    pub fn recalculate_device_status_from_history(
        &self,
        wwn: &str,
    ) -> Result<(), DrivePulseError> {
        let device = self.get_device_details(wwn)?;

        let Some(latest) = self.metrics.get_latest_smart(wwn)? else {
            return Ok(());
        };

        let merged_overrides = self.get_merged_overrides();

        let mut new_status = DeviceStatus::PASSED;
        let mut has_forced_failure = false;

        for (attr_id, attr) in &latest.attributes {
            let mut attr_status = attr.status();

            if let Some(result) = overrides::apply_with_overrides(
                &merged_overrides,
                &device.device_protocol,
                attr_id,
                wwn,
            ) {
                if result.should_ignore {
                    continue;
                }
                if let Some(forced) = result.status {
                    attr_status = forced;
                    if forced.has(AttributeStatus::FAILED_SCRUTINY) {
                        has_forced_failure = true;
                    }
                }
            }

            if attr_status.has(AttributeStatus::FAILED_SCRUTINY) {
                new_status = new_status.with(DeviceStatus::FAILED_SCRUTINY);
            }
        }

        if new_status.is_passed() && !device.device_status.is_passed() {
            self.reset_device_status(wwn)?;
            info!("Device {wwn} status recalculated to passed after override change");
        } else if !new_status.is_passed() && device.device_status.is_passed() {
            self.update_device_status(wwn, new_status)?;
            info!("Device {wwn} status recalculated to failed after override change");
        }

        if has_forced_failure != device.has_forced_failure {
            self.update_device_has_forced_failure(wwn, has_forced_failure)?;
            info!("Device {wwn} has_forced_failure updated to {has_forced_failure} after override change");
        }

        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // Settings
    ////////////////////////////////////////////////////////////////////////

    pub fn load_settings(&self) -> Result<Settings, DrivePulseError> {
        settings::load_settings(&self.db)
    }

    pub fn save_settings(&self, settings_value: &Settings) -> Result<(), DrivePulseError> {
        settings::save_settings(&self.db, settings_value)
    }

    pub fn get_setting_value(&self, key: &str) -> Result<String, DrivePulseError> {
        settings::get_setting_value(&self.db, key)
    }

    pub fn set_setting_value(&self, key: &str, value: &str) -> Result<(), DrivePulseError> {
        settings::set_setting_value(&self.db, key, value)
    }

    ////////////////////////////////////////////////////////////////////////
    // Summary
    ////////////////////////////////////////////////////////////////////////

    /// Device metadata joined with the latest SMART results, keyed by WWN.
    pub fn get_summary(&self) -> Result<HashMap<String, DeviceSummary>, DrivePulseError> {
        let devices = self.get_devices()?;
        let mut summary = HashMap::with_capacity(devices.len());

        for device in devices {
            let smart = self.metrics.get_latest_smart(&device.wwn)?;
            let smart_summary = smart.map(|s| SmartSummary {
                collector_date: s.date,
                temp: s.temp,
                power_on_hours: s.power_on_hours,
                power_cycle_count: s.power_cycle_count,
                percentage_used: s.percentage_used(),
                wearout_value: s.wearout_value(),
            });
            summary.insert(
                device.wwn.clone(),
                DeviceSummary {
                    device,
                    smart: smart_summary,
                    temp_history: Vec::new(),
                },
            );
        }
        Ok(summary)
    }

    pub fn get_temperature_history(
        &self,
        duration_key: DurationKey,
    ) -> Result<HashMap<String, Vec<SmartTemperature>>, DrivePulseError> {
        self.metrics.get_temperature_history(duration_key)
    }

    pub fn get_last_seen_all(
        &self,
    ) -> Result<HashMap<String, chrono::DateTime<Utc>>, DrivePulseError> {
        self.metrics.get_last_seen_all()
    }

    ////////////////////////////////////////////////////////////////////////
    // ZFS pools
    ////////////////////////////////////////////////////////////////////////

    pub fn register_zfs_pool(&self, pool: &ZfsPool) -> Result<(), DrivePulseError> {
        let now = Utc::now().timestamp();
        self.db.conn().execute(
            "INSERT INTO zfs_pools
                 (guid, name, health, capacity_percent, total_read_errors, total_write_errors,
                  total_checksum_errors, scrub_state, scrub_start_time, scrub_end_time,
                  scrub_percent_complete, scrub_issued_bytes, scrub_errors_count,
                  scrub_duration_seconds, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
             ON CONFLICT(guid) DO UPDATE SET
                 name = excluded.name,
                 health = excluded.health,
                 capacity_percent = excluded.capacity_percent,
                 total_read_errors = excluded.total_read_errors,
                 total_write_errors = excluded.total_write_errors,
                 total_checksum_errors = excluded.total_checksum_errors,
                 scrub_state = excluded.scrub_state,
                 scrub_start_time = excluded.scrub_start_time,
                 scrub_end_time = excluded.scrub_end_time,
                 scrub_percent_complete = excluded.scrub_percent_complete,
                 scrub_issued_bytes = excluded.scrub_issued_bytes,
                 scrub_errors_count = excluded.scrub_errors_count,
                 scrub_duration_seconds = excluded.scrub_duration_seconds,
                 updated_at = excluded.updated_at",
            params![
                pool.guid,
                pool.name,
                pool.health,
                pool.capacity_percent,
                pool.total_read_errors,
                pool.total_write_errors,
                pool.total_checksum_errors,
                pool.scrub_state.as_str(),
                pool.scrub_start_time.map(|t| t.timestamp()),
                pool.scrub_end_time.map(|t| t.timestamp()),
                pool.scrub_percent_complete,
                pool.scrub_issued_bytes,
                pool.scrub_errors_count,
                pool.scrub_duration_seconds,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_zfs_pools(&self) -> Result<Vec<ZfsPool>, DrivePulseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!("SELECT {POOL_COLUMNS} FROM zfs_pools"))?;
        let pools = stmt
            .query_map([], row_to_pool)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pools)
    }

    pub fn get_zfs_pool_details(&self, guid: &str) -> Result<ZfsPool, DrivePulseError> {
        let conn = self.db.conn();
        conn.query_row(
            &format!("SELECT {POOL_COLUMNS} FROM zfs_pools WHERE guid = ?1"),
            [guid],
            row_to_pool,
        )
        .optional()?
        .ok_or_else(|| DrivePulseError::Error(format!("zfs pool not found: {guid}")))
    }

    pub fn get_zfs_pools_summary(&self) -> Result<HashMap<String, ZfsPool>, DrivePulseError> {
        Ok(self
            .get_zfs_pools()?
            .into_iter()
            .filter(|p| !p.archived)
            .map(|p| (p.guid.clone(), p))
            .collect())
    }

    pub fn update_zfs_pool_archived(
        &self,
        guid: &str,
        archived: bool,
    ) -> Result<(), DrivePulseError> {
        self.update_pool_flag(guid, "archived", archived)
    }

    pub fn update_zfs_pool_muted(&self, guid: &str, muted: bool) -> Result<(), DrivePulseError> {
        self.update_pool_flag(guid, "muted", muted)
    }

    fn update_pool_flag(
        &self,
        guid: &str,
        column: &str,
        value: bool,
    ) -> Result<(), DrivePulseError> {
        let updated = self.db.conn().execute(
            &format!("UPDATE zfs_pools SET {column} = ?2, updated_at = ?3 WHERE guid = ?1"),
            params![guid, value, Utc::now().timestamp()],
        )?;
        if updated == 0 {
            return Err(DrivePulseError::Error(format!("zfs pool not found: {guid}")));
        }
        Ok(())
    }

    pub fn update_zfs_pool_label(&self, guid: &str, label: &str) -> Result<(), DrivePulseError> {
        let updated = self.db.conn().execute(
            "UPDATE zfs_pools SET label = ?2, updated_at = ?3 WHERE guid = ?1",
            params![guid, label, Utc::now().timestamp()],
        )?;
        if updated == 0 {
            return Err(DrivePulseError::Error(format!("zfs pool not found: {guid}")));
        }
        Ok(())
    }

    pub fn delete_zfs_pool(&self, guid: &str) -> Result<(), DrivePulseError> {
        validate::validate_guid(guid)?;
        self.db
            .conn()
            .execute("DELETE FROM zfs_pools WHERE guid = ?1", [guid])?;
        self.metrics.delete_device_measurements(guid)?;
        Ok(())
    }

    pub fn save_zfs_pool_metrics(&self, metrics: &ZfsPoolMetrics) -> Result<(), DrivePulseError> {
        self.metrics.save_zfs_pool_metrics(metrics)
    }

    pub fn get_zfs_pool_metrics_history(
        &self,
        guid: &str,
        duration_key: DurationKey,
    ) -> Result<Vec<ZfsPoolMetrics>, DrivePulseError> {
        self.metrics.get_zfs_pool_metrics_history(guid, duration_key)
    }

    ////////////////////////////////////////////////////////////////////////
    // Performance
    ////////////////////////////////////////////////////////////////////////

    pub fn save_performance_results(&self, perf: &Performance) -> Result<(), DrivePulseError> {
        self.metrics.save_performance(perf)
    }

    pub fn get_performance_history(
        &self,
        wwn: &str,
        duration_key: DurationKey,
    ) -> Result<Vec<Performance>, DrivePulseError> {
        self.metrics.get_performance_history(wwn, duration_key)
    }

    pub fn get_performance_baseline(
        &self,
        wwn: &str,
        count: usize,
    ) -> Result<Option<crate::measurements::PerformanceBaseline>, DrivePulseError> {
        let mut history = self
            .metrics
            .get_performance_history(wwn, DurationKey::Forever)?;
        history.truncate(count);
        Ok(crate::measurements::PerformanceBaseline::from_history(&history))
    }

    ////////////////////////////////////////////////////////////////////////
    // Workload insights
    ////////////////////////////////////////////////////////////////////////

    /// Compute per-device workload insights over a duration window.
    /// Missing history degrades to "unknown", never to an error.
    pub fn get_workload_insights(
        &self,
        duration_key: DurationKey,
    ) -> Result<HashMap<String, WorkloadInsight>, DrivePulseError> {
        let devices = self.get_devices()?;

        let mut insights: HashMap<String, WorkloadInsight> = HashMap::new();
        let mut protocols: HashMap<String, String> = HashMap::new();
        for device in &devices {
            if device.archived {
                continue;
            }
            insights.insert(
                device.wwn.clone(),
                WorkloadInsight::unknown(&device.wwn, &device.device_protocol),
            );
            protocols.insert(device.wwn.clone(), device.device_protocol.clone());
        }

        if insights.is_empty() {
            return Ok(insights);
        }

        let first_last = match self.metrics.get_smart_first_last(duration_key) {
            Ok(points) => points,
            Err(err) => {
                log::error!("Error querying workload first/last points: {err}");
                return Ok(insights);
            }
        };

        let recent = self.metrics.get_recent_smart_points(3).unwrap_or_else(|err| {
            log::error!("Error querying workload recent points: {err}");
            HashMap::new()
        });

        for (wwn, insight) in insights.iter_mut() {
            let Some((first_point, last_point)) = first_last.get(wwn) else {
                continue;
            };
            let protocol = protocols.get(wwn).map(String::as_str).unwrap_or("");

            let first = WorkloadSnapshot::from_point(first_point.ts, &first_point.fields);
            let last = WorkloadSnapshot::from_point(last_point.ts, &last_point.fields);
            workload::compute_insight(insight, &first, &last, protocol);

            if let Some(points) = recent.get(wwn) {
                if points.len() >= 2 {
                    let snapshots: Vec<WorkloadSnapshot> = points
                        .iter()
                        .map(|p| WorkloadSnapshot::from_point(p.ts, &p.fields))
                        .collect();
                    insight.spike =
                        workload::detect_spike(&snapshots, insight.daily_write_bytes, protocol);
                }
            }
        }

        Ok(insights)
    }
}

const DEVICE_COLUMNS: &str = "wwn, host_id, device_name, manufacturer, model_name, serial_number, \
     firmware, device_protocol, device_type, capacity, label, archived, muted, \
     smart_display_mode, device_status, has_forced_failure";

fn row_to_device(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        wwn: row.get(0)?,
        host_id: row.get(1)?,
        device_name: row.get(2)?,
        manufacturer: row.get(3)?,
        model_name: row.get(4)?,
        serial_number: row.get(5)?,
        firmware: row.get(6)?,
        device_protocol: row.get(7)?,
        device_type: row.get(8)?,
        capacity: row.get(9)?,
        label: row.get(10)?,
        archived: row.get(11)?,
        muted: row.get(12)?,
        smart_display_mode: row.get(13)?,
        device_status: DeviceStatus(row.get(14)?),
        has_forced_failure: row.get(15)?,
    })
}

const OVERRIDE_COLUMNS: &str =
    "id, created_at, updated_at, deleted_at, protocol, attribute_id, wwn, action, status, \
     warn_above, fail_above, source";

fn row_to_override(row: &Row<'_>) -> rusqlite::Result<AttributeOverrideRow> {
    Ok(AttributeOverrideRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        deleted_at: row.get(3)?,
        protocol: row.get(4)?,
        attribute_id: row.get(5)?,
        wwn: row.get(6)?,
        action: row.get(7)?,
        status: row.get(8)?,
        warn_above: row.get(9)?,
        fail_above: row.get(10)?,
        source: row.get(11)?,
    })
}

const POOL_COLUMNS: &str =
    "guid, name, health, capacity_percent, total_read_errors, total_write_errors, \
     total_checksum_errors, label, archived, muted, scrub_state, scrub_start_time, \
     scrub_end_time, scrub_percent_complete, scrub_issued_bytes, scrub_errors_count, \
     scrub_duration_seconds";

fn row_to_pool(row: &Row<'_>) -> rusqlite::Result<ZfsPool> {
    use chrono::TimeZone;
    let start: Option<i64> = row.get(11)?;
    let end: Option<i64> = row.get(12)?;
    Ok(ZfsPool {
        guid: row.get(0)?,
        name: row.get(1)?,
        health: row.get(2)?,
        capacity_percent: row.get(3)?,
        total_read_errors: row.get(4)?,
        total_write_errors: row.get(5)?,
        total_checksum_errors: row.get(6)?,
        label: row.get(7)?,
        archived: row.get(8)?,
        muted: row.get(9)?,
        scrub_state: ZfsScrubState::parse(&row.get::<_, String>(10)?),
        scrub_start_time: start.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        scrub_end_time: end.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        scrub_percent_complete: row.get(13)?,
        scrub_issued_bytes: row.get(14)?,
        scrub_errors_count: row.get(15)?,
        scrub_duration_seconds: row.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{AtaSmartAttributeRaw, AtaSmartAttributesTableItem};
    use crate::overrides::OverrideAction;
    use tempfile::TempDir;

    fn test_repo(temp_dir: &TempDir) -> Repository {
        let mut config = Config::default();
        config.database.path = Some(temp_dir.path().join("drivepulse.db"));
        config.database.metrics_path = Some(temp_dir.path().join("metrics.db"));
        Repository::connect(Arc::new(config)).expect("repository should connect")
    }

    fn sample_device(wwn: &str) -> Device {
        Device {
            wwn: wwn.to_string(),
            host_id: "host-1".to_string(),
            device_name: "/dev/sda".to_string(),
            model_name: "WDC WD140EDFZ-11A0VA0".to_string(),
            serial_number: "FAKEWDDJ324KSO".to_string(),
            device_protocol: "ATA".to_string(),
            ..Default::default()
        }
    }

    fn smart_payload(raw_199: i64, passed: bool) -> SmartInfo {
        let mut info = SmartInfo::default();
        info.device.protocol = "ATA".to_string();
        info.smart_status.passed = passed;
        info.power_on_time.hours = 1730;
        info.local_time.time_t = Utc::now().timestamp();
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
        info
    }

    #[test]
    fn test_register_device_upserts_by_wwn() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);

        let mut device = sample_device("0x5000cca264eb01d7");
        repo.register_device(&device).unwrap();

        device.host_id = "host-2".to_string();
        device.label = "parity-1".to_string();
        repo.register_device(&device).unwrap();

        let devices = repo.get_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].host_id, "host-2");
        assert_eq!(devices[0].label, "parity-1");
    }

    #[test]
    fn test_device_status_update_and_reset() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);
        repo.register_device(&sample_device("0x5000cca264eb01d7")).unwrap();

        let device = repo
            .update_device_status("0x5000cca264eb01d7", DeviceStatus::FAILED_SCRUTINY)
            .unwrap();
        assert!(device.device_status.has(DeviceStatus::FAILED_SCRUTINY));

        let device = repo.reset_device_status("0x5000cca264eb01d7").unwrap();
        assert!(device.device_status.is_passed());
    }

    #[test]
    fn test_delete_device_removes_measurements() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);
        repo.register_device(&sample_device("0x5000cca264eb01d7")).unwrap();

        repo.save_smart_attributes("0x5000cca264eb01d7", &smart_payload(0, true))
            .unwrap();
        assert!(repo
            .get_latest_smart_submission("0x5000cca264eb01d7")
            .unwrap()
            .is_some());

        repo.delete_device("0x5000cca264eb01d7").unwrap();
        assert!(repo.get_devices().unwrap().is_empty());
        assert!(repo
            .get_latest_smart_submission("0x5000cca264eb01d7")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_delete_device_rejects_invalid_wwn() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);
        assert!(repo.delete_device("0x5000cca264eb01d7\" or 1=1").is_err());
    }

    #[test]
    fn test_save_smart_attributes_applies_delta_against_stored_point() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);
        repo.register_device(&sample_device("0x5000cca264eb01d7")).unwrap();

        // first submission: raw=5 lands as a warning (no history to diff)
        let mut first = smart_payload(5, true);
        first.local_time.time_t = Utc::now().timestamp() - 3600;
        let smart = repo.save_smart_attributes("0x5000cca264eb01d7", &first).unwrap();
        assert!(smart.attributes["199"]
            .status()
            .has(AttributeStatus::WARNING_SCRUTINY));

        // second submission with the same counter: suppressed to passed
        let second = smart_payload(5, true);
        let smart = repo.save_smart_attributes("0x5000cca264eb01d7", &second).unwrap();
        assert_eq!(smart.attributes["199"].status(), AttributeStatus::PASSED);
        assert_eq!(
            smart.attributes["199"].status_reason(),
            "Cumulative counter unchanged since last measurement"
        );
        assert!(smart.status.is_passed());

        // the suppressed status is what got persisted
        let stored = repo
            .get_latest_smart_submission("0x5000cca264eb01d7")
            .unwrap()
            .unwrap();
        assert_eq!(stored.attributes["199"].status(), AttributeStatus::PASSED);
    }

    #[test]
    fn test_override_crud_and_merged_list() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);

        let mut row = AttributeOverrideRow {
            protocol: "ATA".to_string(),
            attribute_id: "199".to_string(),
            action: "ignore".to_string(),
            ..Default::default()
        };
        repo.save_attribute_override(&mut row).unwrap();
        assert!(row.id > 0);
        assert_eq!(row.source, "ui");

        let merged = repo.get_merged_overrides();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].action, OverrideAction::Ignore);

        row.action = "force_status".to_string();
        row.status = "warn".to_string();
        repo.save_attribute_override(&mut row).unwrap();
        let fetched = repo.get_attribute_override_by_id(row.id).unwrap().unwrap();
        assert_eq!(fetched.action, "force_status");

        repo.delete_attribute_override(row.id).unwrap();
        assert!(repo.get_attribute_override_by_id(row.id).unwrap().is_none());
        assert!(repo.get_merged_overrides().is_empty());
    }

    #[test]
    fn test_recalculate_after_override_change() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);
        repo.register_device(&sample_device("0x5000cca264eb01d7")).unwrap();

        // device is failing because of attribute 199 (raw=50 -> >20% AFR)
        let smart = repo
            .save_smart_attributes("0x5000cca264eb01d7", &smart_payload(50, true))
            .unwrap();
        assert!(smart.status.has(DeviceStatus::FAILED_SCRUTINY));
        repo.update_device_status("0x5000cca264eb01d7", smart.status).unwrap();

        // user ignores the attribute; recalculation clears the device
        let mut row = AttributeOverrideRow {
            protocol: "ATA".to_string(),
            attribute_id: "199".to_string(),
            action: "ignore".to_string(),
            ..Default::default()
        };
        repo.save_attribute_override(&mut row).unwrap();
        repo.recalculate_device_status_from_history("0x5000cca264eb01d7")
            .unwrap();

        let device = repo.get_device_details("0x5000cca264eb01d7").unwrap();
        assert!(device.device_status.is_passed());

        // deleting the override brings the failure back
        repo.delete_attribute_override(row.id).unwrap();
        repo.recalculate_device_status_from_history("0x5000cca264eb01d7")
            .unwrap();
        let device = repo.get_device_details("0x5000cca264eb01d7").unwrap();
        assert!(device.device_status.has(DeviceStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_forced_failure_recalculation() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);
        repo.register_device(&sample_device("0x5000cca264eb01d7")).unwrap();
        repo.save_smart_attributes("0x5000cca264eb01d7", &smart_payload(0, true))
            .unwrap();

        let mut row = AttributeOverrideRow {
            protocol: "ATA".to_string(),
            attribute_id: "199".to_string(),
            action: "force_status".to_string(),
            status: "failed".to_string(),
            ..Default::default()
        };
        repo.save_attribute_override(&mut row).unwrap();
        repo.recalculate_device_status_from_history("0x5000cca264eb01d7")
            .unwrap();

        let device = repo.get_device_details("0x5000cca264eb01d7").unwrap();
        assert!(device.has_forced_failure);
        assert!(device.device_status.has(DeviceStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_zfs_pool_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);

        let mut pool = ZfsPool {
            guid: "12345678901234567890".to_string(),
            name: "tank".to_string(),
            health: "ONLINE".to_string(),
            capacity_percent: 61.5,
            ..Default::default()
        };
        pool.parse_scrub_status(
            "  scan: scrub repaired 0B in 00:10:30 with 0 errors on Sun Jan  5 00:34:31 2026\n",
        );
        repo.register_zfs_pool(&pool).unwrap();

        let fetched = repo.get_zfs_pool_details("12345678901234567890").unwrap();
        assert_eq!(fetched.name, "tank");
        assert_eq!(fetched.scrub_state, ZfsScrubState::Finished);
        assert!(fetched.scrub_end_time.is_some());

        repo.update_zfs_pool_archived("12345678901234567890", true).unwrap();
        assert!(repo.get_zfs_pools_summary().unwrap().is_empty());

        repo.delete_zfs_pool("12345678901234567890").unwrap();
        assert!(repo.get_zfs_pools().unwrap().is_empty());
    }

    #[test]
    fn test_get_summary_includes_latest_smart() {
        let temp_dir = TempDir::new().unwrap();
        let repo = test_repo(&temp_dir);
        repo.register_device(&sample_device("0x5000cca264eb01d7")).unwrap();
        repo.save_smart_attributes("0x5000cca264eb01d7", &smart_payload(0, true))
            .unwrap();

        let summary = repo.get_summary().unwrap();
        let entry = &summary["0x5000cca264eb01d7"];
        assert_eq!(entry.device.model_name, "WDC WD140EDFZ-11A0VA0");
        let smart = entry.smart.as_ref().unwrap();
        assert_eq!(smart.power_on_hours, 1730);
    }
}
