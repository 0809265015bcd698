use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collector::SmartInfo;
use crate::config::Config;
use crate::error::DrivePulseError;
use crate::measurements::{
    AtaAttribute, AtaDevstatAttribute, NvmeAttribute, ScsiAttribute, SmartAttribute,
};
use crate::overrides::{self, AttributeOverride, OverrideResult};
use crate::status::{AttributeStatus, DeviceProtocol, DeviceStatus};
use crate::thresholds;

pub const DELTA_SUPPRESSED_REASON: &str = "Cumulative counter unchanged since last measurement";

/// One evaluated SMART submission: the measurement written to the raw
/// retention bucket and the source of the device's aggregated status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smart {
    pub date: DateTime<Utc>,
    pub device_wwn: String,
    pub device_protocol: DeviceProtocol,

    pub temp: i64,
    pub power_on_hours: i64,
    pub power_cycle_count: i64,
    pub logical_block_size: i64,

    pub attributes: BTreeMap<String, SmartAttribute>,

    pub status: DeviceStatus,
    /// True when an override with action=force_status, status=failed applied.
    pub has_forced_failure: bool,
}

impl Smart {
    /// Evaluate a collector submission against the attribute metadata and the
    /// pre-merged override list (config entries first, database entries
    /// appended so they win the dedup merge).
    pub fn from_collector_info(
        config: &Config,
        wwn: &str,
        info: &SmartInfo,
        merged_overrides: &[AttributeOverride],
    ) -> Result<Smart, DrivePulseError> {
        let protocol: DeviceProtocol = info.device.protocol.parse()?;

        let date = if info.local_time.time_t > 0 {
            Utc.timestamp_opt(info.local_time.time_t, 0)
                .single()
                .unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        let mut smart = Smart {
            date,
            device_wwn: wwn.to_string(),
            device_protocol: protocol,
            temp: info.corrected_temperature(),
            power_on_hours: info.power_on_time.hours,
            power_cycle_count: info.power_cycle_count,
            logical_block_size: if info.logical_block_size > 0 {
                info.logical_block_size
            } else {
                512
            },
            attributes: BTreeMap::new(),
            status: DeviceStatus::PASSED,
            has_forced_failure: false,
        };

        if !info.smart_status.passed {
            smart.status = smart.status.with(DeviceStatus::FAILED_SMART);
        }

        match protocol {
            DeviceProtocol::Ata => {
                smart.process_ata_smart_info(config, info, merged_overrides);
                if !info.ata_device_statistics.pages.is_empty() {
                    smart.process_ata_device_statistics(config, info, merged_overrides);
                }
            }
            DeviceProtocol::Nvme => smart.process_nvme_smart_info(info, merged_overrides),
            DeviceProtocol::Scsi => smart.process_scsi_smart_info(info, merged_overrides),
        }

        Ok(smart)
    }

    fn process_ata_smart_info(
        &mut self,
        config: &Config,
        info: &SmartInfo,
        merged_overrides: &[AttributeOverride],
    ) {
        for item in &info.ata_smart_attributes.table {
            let mut attr = AtaAttribute::from_collector(item);
            attr.populate_status();

            let attr_id = item.id.to_string();
            let overlay_value = attr.raw_value;
            let mut ignored = false;

            if let Some(result) = overrides::apply_with_overrides(
                merged_overrides,
                self.device_protocol.as_str(),
                &attr_id,
                &self.device_wwn,
            ) {
                ignored = self.overlay_override(
                    &result,
                    overlay_value,
                    &mut attr.status,
                    &mut attr.status_reason,
                );
            }

            let status = attr.status;
            self.attributes.insert(attr_id, SmartAttribute::Ata(attr));

            let transient = config.transient_ata_attribute(item.id);
            if status.has(AttributeStatus::FAILED_SCRUTINY) && !transient && !ignored {
                self.status = self.status.with(DeviceStatus::FAILED_SCRUTINY);
            }
        }
    }

    fn process_ata_device_statistics(
        &mut self,
        config: &Config,
        info: &SmartInfo,
        merged_overrides: &[AttributeOverride],
    ) {
        for page in &info.ata_device_statistics.pages {
            for stat in &page.table {
                if !stat.flags.valid {
                    continue;
                }

                let attr_id = format!("devstat_{}_{}", page.number, stat.offset);
                let mut attr = AtaDevstatAttribute::new(attr_id.clone(), stat.value);
                attr.populate_status();

                let overlay_value = attr.value;
                let mut ignored = false;

                if let Some(result) = overrides::apply_with_overrides(
                    merged_overrides,
                    self.device_protocol.as_str(),
                    &attr_id,
                    &self.device_wwn,
                ) {
                    ignored = self.overlay_override(
                        &result,
                        overlay_value,
                        &mut attr.status,
                        &mut attr.status_reason,
                    );
                }

                let status = attr.status;
                let devstat_ignored = config.ignored_devstat_attribute(&attr_id);
                self.attributes
                    .insert(attr_id, SmartAttribute::AtaDevstat(attr));

                if status.has(AttributeStatus::FAILED_SCRUTINY) && !devstat_ignored && !ignored {
                    self.status = self.status.with(DeviceStatus::FAILED_SCRUTINY);
                }
            }
        }
    }

    fn process_nvme_smart_info(&mut self, info: &SmartInfo, merged_overrides: &[AttributeOverride]) {
        let health = &info.nvme_smart_health_information_log;
        let entries = [
            NvmeAttribute::new("critical_warning", health.critical_warning, 0),
            NvmeAttribute::new("temperature", health.temperature, -1),
            NvmeAttribute::new(
                "available_spare",
                health.available_spare,
                health.available_spare_threshold,
            ),
            NvmeAttribute::new("percentage_used", health.percentage_used, 100),
            NvmeAttribute::new("data_units_read", health.data_units_read, -1),
            NvmeAttribute::new("data_units_written", health.data_units_written, -1),
            NvmeAttribute::new("host_reads", health.host_reads, -1),
            NvmeAttribute::new("host_writes", health.host_writes, -1),
            NvmeAttribute::new("controller_busy_time", health.controller_busy_time, -1),
            NvmeAttribute::new("power_cycles", health.power_cycles, -1),
            NvmeAttribute::new("power_on_hours", health.power_on_hours, -1),
            NvmeAttribute::new("unsafe_shutdowns", health.unsafe_shutdowns, -1),
            NvmeAttribute::new("media_errors", health.media_errors, 0),
            NvmeAttribute::new("num_err_log_entries", health.num_err_log_entries, -1),
            NvmeAttribute::new("warning_temp_time", health.warning_temp_time, -1),
            NvmeAttribute::new("critical_comp_time", health.critical_comp_time, -1),
        ];

        for mut attr in entries {
            attr.populate_status();

            let attr_id = attr.attribute_id.clone();
            let overlay_value = attr.value;
            let mut ignored = false;

            if let Some(result) = overrides::apply_with_overrides(
                merged_overrides,
                self.device_protocol.as_str(),
                &attr_id,
                &self.device_wwn,
            ) {
                ignored = self.overlay_override(
                    &result,
                    overlay_value,
                    &mut attr.status,
                    &mut attr.status_reason,
                );
            }

            let status = attr.status;
            self.attributes.insert(attr_id, SmartAttribute::Nvme(attr));

            if status.has(AttributeStatus::FAILED_SCRUTINY) && !ignored {
                self.status = self.status.with(DeviceStatus::FAILED_SCRUTINY);
            }
        }
    }

    fn process_scsi_smart_info(&mut self, info: &SmartInfo, merged_overrides: &[AttributeOverride]) {
        let log = &info.scsi_error_counter_log;
        let scsi_temp = info
            .scsi_environmental_reports
            .get("temperature_1")
            .map(|t| t.current)
            .unwrap_or(0);

        let entries = [
            ScsiAttribute::new("temperature", scsi_temp, -1),
            ScsiAttribute::new("scsi_grown_defect_list", info.scsi_grown_defect_list, 0),
            ScsiAttribute::new(
                "read_errors_corrected_by_eccfast",
                log.read.errors_corrected_by_eccfast,
                -1,
            ),
            ScsiAttribute::new(
                "read_errors_corrected_by_eccdelayed",
                log.read.errors_corrected_by_eccdelayed,
                -1,
            ),
            ScsiAttribute::new(
                "read_errors_corrected_by_rereads_rewrites",
                log.read.errors_corrected_by_rereads_rewrites,
                0,
            ),
            ScsiAttribute::new(
                "read_total_errors_corrected",
                log.read.total_errors_corrected,
                -1,
            ),
            ScsiAttribute::new(
                "read_correction_algorithm_invocations",
                log.read.correction_algorithm_invocations,
                -1,
            ),
            ScsiAttribute::new(
                "read_total_uncorrected_errors",
                log.read.total_uncorrected_errors,
                0,
            ),
            ScsiAttribute::new(
                "write_errors_corrected_by_eccfast",
                log.write.errors_corrected_by_eccfast,
                -1,
            ),
            ScsiAttribute::new(
                "write_errors_corrected_by_eccdelayed",
                log.write.errors_corrected_by_eccdelayed,
                -1,
            ),
            ScsiAttribute::new(
                "write_errors_corrected_by_rereads_rewrites",
                log.write.errors_corrected_by_rereads_rewrites,
                0,
            ),
            ScsiAttribute::new(
                "write_total_errors_corrected",
                log.write.total_errors_corrected,
                -1,
            ),
            ScsiAttribute::new(
                "write_correction_algorithm_invocations",
                log.write.correction_algorithm_invocations,
                -1,
            ),
            ScsiAttribute::new(
                "write_total_uncorrected_errors",
                log.write.total_uncorrected_errors,
                0,
            ),
        ];

        for mut attr in entries {
            attr.populate_status();

            let attr_id = attr.attribute_id.clone();
            let overlay_value = attr.value;
            let mut ignored = false;

            if let Some(result) = overrides::apply_with_overrides(
                merged_overrides,
                self.device_protocol.as_str(),
                &attr_id,
                &self.device_wwn,
            ) {
                ignored = self.overlay_override(
                    &result,
                    overlay_value,
                    &mut attr.status,
                    &mut attr.status_reason,
                );
            }

            let status = attr.status;
            self.attributes.insert(attr_id, SmartAttribute::Scsi(attr));

            if status.has(AttributeStatus::FAILED_SCRUTINY) && !ignored {
                self.status = self.status.with(DeviceStatus::FAILED_SCRUTINY);
            }
        }
    }

    /// Apply a matched override to an attribute's status in place. Returns
    /// true when the attribute is ignored. A manufacturer SMART failure bit
    /// survives every override action.
    fn overlay_override(
        &mut self,
        result: &OverrideResult,
        value: i64,
        status: &mut AttributeStatus,
        status_reason: &mut String,
    ) -> bool {
        let smart_bit = AttributeStatus(status.0 & AttributeStatus::FAILED_SMART.0);

        if result.should_ignore {
            *status = AttributeStatus::PASSED.with(smart_bit);
            *status_reason = result.status_reason.clone();
            return true;
        }

        if let Some(forced) = result.status {
            *status = forced.with(smart_bit);
            *status_reason = result.status_reason.clone();
            if forced.has(AttributeStatus::FAILED_SCRUTINY) {
                self.has_forced_failure = true;
            }
            return false;
        }

        if result.warn_above.is_some() || result.fail_above.is_some() {
            if let Some(threshold_status) = overrides::apply_thresholds(result, value) {
                *status = threshold_status.with(smart_bit);
                *status_reason = overrides::REASON_CUSTOM_THRESHOLD_EXCEEDED.to_string();
            }
        }

        false
    }

    /// Suppress warnings/failures on cumulative-counter attributes (like
    /// UltraDMA CRC errors) when the counter has not advanced since the
    /// previous submission. Historical errors that are no longer occurring
    /// would otherwise alert forever. ATA only; manufacturer SMART failures
    /// are never suppressed.
    pub fn apply_delta_evaluation(&mut self, previous_values: &HashMap<String, i64>) {
        if self.device_protocol != DeviceProtocol::Ata || previous_values.is_empty() {
            return;
        }

        let mut delta_applied = false;

        for (attr_id, attr) in self.attributes.iter_mut() {
            let SmartAttribute::Ata(ata) = attr else {
                continue;
            };

            let Some(metadata) = thresholds::ATA_METADATA.get(&ata.attribute_id) else {
                continue;
            };
            if !metadata.use_delta_evaluation {
                continue;
            }

            if ata.status.has(AttributeStatus::FAILED_SMART) {
                continue;
            }
            if ata.status.is_passed() {
                continue;
            }

            let Some(prev_value) = previous_values.get(attr_id) else {
                continue;
            };

            if ata.raw_value == *prev_value {
                ata.status = AttributeStatus::PASSED;
                ata.status_reason = DELTA_SUPPRESSED_REASON.to_string();
                delta_applied = true;
            }
        }

        if delta_applied {
            self.recalculate_device_status();
        }
    }

    /// Re-aggregate device status from the attribute statuses, preserving
    /// the manufacturer SMART failure bit.
    pub fn recalculate_device_status(&mut self) {
        let mut new_status = DeviceStatus::PASSED;
        if self.status.has(DeviceStatus::FAILED_SMART) {
            new_status = new_status.with(DeviceStatus::FAILED_SMART);
        }

        for attr in self.attributes.values() {
            if attr.status().has(AttributeStatus::FAILED_SCRUTINY) {
                new_status = new_status.with(DeviceStatus::FAILED_SCRUTINY);
                break;
            }
        }

        self.status = new_status;
    }

    /// Raw values of the ATA attributes, used as the "previous submission"
    /// input to delta evaluation of the next measurement.
    pub fn ata_raw_values(&self) -> HashMap<String, i64> {
        self.attributes
            .iter()
            .filter_map(|(id, attr)| match attr {
                SmartAttribute::Ata(a) => Some((id.clone(), a.raw_value)),
                _ => None,
            })
            .collect()
    }

    /// Comparable signature of the evaluated attributes: the set of
    /// (attribute_id, status, transformed_value) tuples. The notification
    /// gate uses it to detect repeat alerts.
    pub fn attribute_signature(&self) -> Vec<(String, i64, i64)> {
        let mut signature: Vec<(String, i64, i64)> = self
            .attributes
            .iter()
            .map(|(id, attr)| (id.clone(), attr.status().0, attr.transformed_value()))
            .collect();
        signature.sort();
        signature
    }

    /// NVMe percentage_used, or the ATA devstat endurance indicator.
    /// 0-100, higher = more worn.
    pub fn percentage_used(&self) -> Option<i64> {
        if let Some(SmartAttribute::Nvme(attr)) = self.attributes.get("percentage_used") {
            return Some(attr.value);
        }
        if let Some(SmartAttribute::AtaDevstat(attr)) = self.attributes.get("devstat_7_8") {
            return Some(attr.value);
        }
        None
    }

    /// Normalized wearout value of ATA attributes 177/233/231/232.
    /// 0-100, higher = healthier.
    pub fn wearout_value(&self) -> Option<i64> {
        for id in ["177", "233", "231", "232"] {
            if let Some(SmartAttribute::Ata(attr)) = self.attributes.get(id) {
                if attr.value > 0 {
                    return Some(attr.value);
                }
            }
        }
        None
    }

    /// Flatten into time-series tags and fields. Attribute leaves use the
    /// `attr.<id>.<field>` key scheme.
    pub fn flatten(&self) -> (BTreeMap<String, String>, Map<String, Value>) {
        let mut tags = BTreeMap::new();
        tags.insert("device_wwn".to_string(), self.device_wwn.clone());
        tags.insert(
            "device_protocol".to_string(),
            self.device_protocol.as_str().to_string(),
        );

        let mut fields = Map::new();
        fields.insert("temp".to_string(), Value::from(self.temp));
        fields.insert("power_on_hours".to_string(), Value::from(self.power_on_hours));
        fields.insert(
            "power_cycle_count".to_string(),
            Value::from(self.power_cycle_count),
        );
        fields.insert(
            "logical_block_size".to_string(),
            Value::from(self.logical_block_size),
        );

        for attr in self.attributes.values() {
            for (key, value) in attr.flatten() {
                fields.insert(key, value);
            }
        }

        (tags, fields)
    }

    /// Rebuild a measurement from flattened fields read back from a
    /// retention bucket. Attribute leaves are grouped by id and routed to
    /// the variant the protocol dictates.
    pub fn from_fields(
        wwn: &str,
        protocol: DeviceProtocol,
        date: DateTime<Utc>,
        status: DeviceStatus,
        fields: &Map<String, Value>,
    ) -> Smart {
        let mut smart = Smart {
            date,
            device_wwn: wwn.to_string(),
            device_protocol: protocol,
            temp: 0,
            power_on_hours: 0,
            power_cycle_count: 0,
            logical_block_size: 0,
            attributes: BTreeMap::new(),
            status,
            has_forced_failure: false,
        };

        for (key, value) in fields {
            match key.as_str() {
                "temp" => smart.temp = value.as_i64().unwrap_or(0),
                "power_on_hours" => smart.power_on_hours = value.as_i64().unwrap_or(0),
                "power_cycle_count" => smart.power_cycle_count = value.as_i64().unwrap_or(0),
                "logical_block_size" => smart.logical_block_size = value.as_i64().unwrap_or(0),
                _ => {
                    let Some(rest) = key.strip_prefix("attr.") else {
                        continue;
                    };
                    let Some(dot) = rest.rfind('.') else {
                        continue;
                    };
                    let attr_id = &rest[..dot];
                    let attr = smart
                        .attributes
                        .entry(attr_id.to_string())
                        .or_insert_with(|| SmartAttribute::empty_for(protocol, attr_id));
                    attr.inflate(key, value);
                }
            }
        }

        smart
    }
}
