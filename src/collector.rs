use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Serde model of the vendor-utility JSON a collector agent POSTs to the
// server. The shape follows smartctl's `--json` output; everything is
// defaulted so partial payloads from older collector versions still parse.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartInfo {
    pub device: DeviceRef,
    pub model_name: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub model_family: String,
    pub wwn: WwnRef,
    pub user_capacity: UserCapacity,
    pub logical_block_size: i64,
    pub smart_status: SmartStatus,
    pub temperature: Temperature,
    pub power_on_time: PowerOnTime,
    pub power_cycle_count: i64,
    pub local_time: LocalTime,
    pub ata_smart_attributes: AtaSmartAttributes,
    pub ata_device_statistics: AtaDeviceStatistics,
    pub nvme_smart_health_information_log: NvmeSmartHealthInformationLog,
    pub scsi_grown_defect_list: i64,
    pub scsi_error_counter_log: ScsiErrorCounterLog,
    pub scsi_environmental_reports: HashMap<String, ScsiTemperatureData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRef {
    pub name: String,
    pub info_name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub protocol: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WwnRef {
    pub naa: i64,
    pub oui: i64,
    pub id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCapacity {
    pub blocks: i64,
    pub bytes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartStatus {
    pub passed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Temperature {
    pub current: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerOnTime {
    pub hours: i64,
    pub minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTime {
    pub time_t: i64,
    pub asctime: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtaSmartAttributes {
    pub revision: i64,
    pub table: Vec<AtaSmartAttributesTableItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtaSmartAttributesTableItem {
    pub id: i32,
    pub name: String,
    pub value: i64,
    pub worst: i64,
    pub thresh: i64,
    pub when_failed: String,
    pub flags: AtaSmartAttributeFlags,
    pub raw: AtaSmartAttributeRaw,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtaSmartAttributeFlags {
    pub value: i64,
    pub string: String,
    pub prefailure: bool,
    pub updated_online: bool,
    pub performance: bool,
    pub error_rate: bool,
    pub event_count: bool,
    pub auto_keep: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtaSmartAttributeRaw {
    pub value: i64,
    pub string: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtaDeviceStatistics {
    pub pages: Vec<AtaDeviceStatisticsPage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtaDeviceStatisticsPage {
    pub number: i32,
    pub name: String,
    pub table: Vec<AtaDeviceStatisticsTableItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtaDeviceStatisticsTableItem {
    pub offset: i32,
    pub name: String,
    pub size: i64,
    pub value: i64,
    pub flags: AtaDeviceStatisticsFlags,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtaDeviceStatisticsFlags {
    pub value: i64,
    pub string: String,
    pub valid: bool,
    pub normalized: bool,
    pub supports_dsn: bool,
    pub monitored_condition_met: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NvmeSmartHealthInformationLog {
    pub critical_warning: i64,
    pub temperature: i64,
    pub available_spare: i64,
    pub available_spare_threshold: i64,
    pub percentage_used: i64,
    pub data_units_read: i64,
    pub data_units_written: i64,
    pub host_reads: i64,
    pub host_writes: i64,
    pub controller_busy_time: i64,
    pub power_cycles: i64,
    pub power_on_hours: i64,
    pub unsafe_shutdowns: i64,
    pub media_errors: i64,
    pub num_err_log_entries: i64,
    pub warning_temp_time: i64,
    pub critical_comp_time: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScsiErrorCounterLog {
    pub read: ScsiErrorCounter,
    pub write: ScsiErrorCounter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScsiErrorCounter {
    pub errors_corrected_by_eccfast: i64,
    pub errors_corrected_by_eccdelayed: i64,
    pub errors_corrected_by_rereads_rewrites: i64,
    pub total_errors_corrected: i64,
    pub correction_algorithm_invocations: i64,
    pub gigabytes_processed: String,
    pub total_uncorrected_errors: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScsiTemperatureData {
    pub current: i64,
    pub drive_trip: i64,
}

impl SmartInfo {
    /// Extract a corrected temperature. Some drives (especially ATA SSDs
    /// behind USB bridges) report garbage in `temperature.current`:
    ///   - SCSI/SAS fall back to environmental report `temperature_1`
    ///   - ATA falls back to attribute 194's low raw byte when the primary
    ///     reading is out of range
    pub fn corrected_temperature(&self) -> i64 {
        let mut temp = self.temperature.current;

        if temp == 0 && !self.scsi_environmental_reports.is_empty() {
            if let Some(scsi_temp) = self.scsi_environmental_reports.get("temperature_1") {
                temp = scsi_temp.current;
            }
        }

        if (temp <= 0 || temp > 150) && self.device.protocol == "ATA" {
            let fallback = self.ata_attr_194_temperature();
            if fallback > 0 {
                temp = fallback;
            }
        }

        temp
    }

    // Attribute 194's low byte carries the temperature in Celsius; higher
    // bytes hold min/max values that corrupt a naive raw read.
    fn ata_attr_194_temperature(&self) -> i64 {
        for attr in &self.ata_smart_attributes.table {
            if attr.id == 194 && attr.raw.value > 0 {
                let extracted = attr.raw.value & 0xFF;
                if extracted > 0 && extracted < 100 {
                    return extracted;
                }
                return 0;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ata_payload_with_temp(primary: i64, attr_194_raw: Option<i64>) -> SmartInfo {
        let mut info = SmartInfo::default();
        info.device.protocol = "ATA".to_string();
        info.temperature.current = primary;
        if let Some(raw) = attr_194_raw {
            info.ata_smart_attributes.table.push(AtaSmartAttributesTableItem {
                id: 194,
                name: "Temperature_Celsius".to_string(),
                raw: AtaSmartAttributeRaw {
                    value: raw,
                    string: raw.to_string(),
                },
                ..Default::default()
            });
        }
        info
    }

    #[test]
    fn test_corrected_temperature_normal_reading() {
        let info = ata_payload_with_temp(38, None);
        assert_eq!(info.corrected_temperature(), 38);
    }

    #[test]
    fn test_corrected_temperature_ata_fallback_low_byte() {
        // raw value packs min/max into upper bytes; low byte is 36C
        let packed = (45 << 16) | (20 << 8) | 36;
        let info = ata_payload_with_temp(0, Some(packed));
        assert_eq!(info.corrected_temperature(), 36);
    }

    #[test]
    fn test_corrected_temperature_ata_fallback_out_of_range() {
        let info = ata_payload_with_temp(200, Some(0x100));
        // low byte of 0x100 is 0, fallback rejected, original kept
        assert_eq!(info.corrected_temperature(), 200);
    }

    #[test]
    fn test_corrected_temperature_scsi_environmental() {
        let mut info = SmartInfo::default();
        info.device.protocol = "SCSI".to_string();
        info.temperature.current = 0;
        info.scsi_environmental_reports.insert(
            "temperature_1".to_string(),
            ScsiTemperatureData {
                current: 31,
                drive_trip: 60,
            },
        );
        assert_eq!(info.corrected_temperature(), 31);
    }

    #[test]
    fn test_payload_parses_partial_json() {
        let json = r#"{
            "device": {"name": "/dev/sda", "protocol": "ATA"},
            "model_name": "WDC WD140EDFZ-11A0VA0",
            "smart_status": {"passed": true},
            "power_on_time": {"hours": 1730},
            "ata_smart_attributes": {"table": [
                {"id": 5, "name": "Reallocated_Sector_Ct", "value": 100, "worst": 100,
                 "thresh": 10, "when_failed": "", "raw": {"value": 0, "string": "0"}}
            ]}
        }"#;
        let info: SmartInfo = serde_json::from_str(json).expect("partial payload should parse");
        assert_eq!(info.model_name, "WDC WD140EDFZ-11A0VA0");
        assert_eq!(info.power_on_time.hours, 1730);
        assert_eq!(info.ata_smart_attributes.table.len(), 1);
        assert!(info.smart_status.passed);
    }
}
