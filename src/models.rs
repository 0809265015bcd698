use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector::SmartInfo;
use crate::error::DrivePulseError;
use crate::measurements::SmartTemperature;
use crate::overrides::{AttributeOverride, OverrideAction};
use crate::status::DeviceStatus;
use crate::validate;

pub const SMART_DISPLAY_MODE_SCRUTINY: &str = "scrutiny";
pub const SMART_DISPLAY_MODE_RAW: &str = "raw";
pub const SMART_DISPLAY_MODE_NORMALIZED: &str = "normalized";

/// A monitored storage device. The WWN is the canonical key; registration
/// upserts by WWN and overwrites the collector-owned column subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub wwn: String,
    pub host_id: String,
    pub device_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub serial_number: String,
    pub firmware: String,
    pub device_protocol: String,
    pub device_type: String,
    pub capacity: i64,
    pub label: String,
    pub archived: bool,
    pub muted: bool,
    pub smart_display_mode: String,
    pub device_status: DeviceStatus,
    pub has_forced_failure: bool,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            wwn: String::new(),
            host_id: String::new(),
            device_name: String::new(),
            manufacturer: String::new(),
            model_name: String::new(),
            serial_number: String::new(),
            firmware: String::new(),
            device_protocol: String::new(),
            device_type: String::new(),
            capacity: 0,
            label: String::new(),
            archived: false,
            muted: false,
            smart_display_mode: SMART_DISPLAY_MODE_SCRUTINY.to_string(),
            device_status: DeviceStatus::PASSED,
            has_forced_failure: false,
        }
    }
}

impl Device {
    /// Refresh collector-owned metadata columns from a SMART payload.
    pub fn update_from_collector_info(&mut self, info: &SmartInfo) -> Result<(), DrivePulseError> {
        if !info.model_name.is_empty() {
            self.model_name = info.model_name.clone();
        }
        if !info.firmware_version.is_empty() {
            self.firmware = info.firmware_version.clone();
        }
        if !info.device.protocol.is_empty() {
            self.device_protocol = info.device.protocol.clone();
        }
        if !info.serial_number.is_empty() {
            self.serial_number = info.serial_number.clone();
        }
        if info.user_capacity.bytes > 0 {
            self.capacity = info.user_capacity.bytes;
        }
        Ok(())
    }

    /// Archived devices are excluded from monitors and reports; muted
    /// devices stay visible but never notify.
    pub fn is_monitored(&self) -> bool {
        !self.archived && !self.muted
    }

    pub fn display_name(&self) -> String {
        if self.label.is_empty() {
            self.device_name.clone()
        } else {
            format!("{} ({})", self.label, self.device_name)
        }
    }
}

pub fn valid_smart_display_mode(mode: &str) -> bool {
    matches!(
        mode,
        SMART_DISPLAY_MODE_SCRUTINY | SMART_DISPLAY_MODE_RAW | SMART_DISPLAY_MODE_NORMALIZED
    )
}

/// A database-persisted attribute override. The same logical shape as the
/// config entry plus identity, soft-delete timestamps and provenance;
/// converted to `overrides::AttributeOverride` at the evaluation boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeOverrideRow {
    pub id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,

    pub protocol: String,
    pub attribute_id: String,
    pub wwn: String,
    pub action: String,
    pub status: String,
    pub warn_above: Option<i64>,
    pub fail_above: Option<i64>,

    /// "ui" rows are mutable through the API; "config" entries come from
    /// the config file and are immutable.
    pub source: String,
}

impl AttributeOverrideRow {
    pub fn to_override(&self) -> AttributeOverride {
        AttributeOverride {
            protocol: self.protocol.clone(),
            attribute_id: self.attribute_id.clone(),
            wwn: self.wwn.clone(),
            action: OverrideAction::parse(&self.action).unwrap_or(OverrideAction::None),
            status: self.status.clone(),
            warn_above: self.warn_above,
            fail_above: self.fail_above,
        }
    }

    /// Enum and identifier validation for override saves; violations are
    /// rejected with a 400 before any state changes.
    pub fn validate(&self) -> Result<(), DrivePulseError> {
        if !matches!(self.protocol.as_str(), "ATA" | "NVMe" | "SCSI") {
            return Err(DrivePulseError::ValidationError(format!(
                "invalid protocol: {} (must be 'ATA', 'NVMe', or 'SCSI')",
                self.protocol
            )));
        }
        if self.attribute_id.is_empty() {
            return Err(DrivePulseError::ValidationError(
                "attribute_id is required".to_string(),
            ));
        }
        if OverrideAction::parse(&self.action).is_none() {
            return Err(DrivePulseError::ValidationError(format!(
                "invalid action: {} (must be '', 'ignore', or 'force_status')",
                self.action
            )));
        }
        if !matches!(self.status.as_str(), "" | "passed" | "warn" | "failed") {
            return Err(DrivePulseError::ValidationError(format!(
                "invalid status: {} (must be 'passed', 'warn', or 'failed')",
                self.status
            )));
        }
        if self.action == "force_status" && self.status.is_empty() {
            return Err(DrivePulseError::ValidationError(
                "force_status requires a status".to_string(),
            ));
        }
        if !self.wwn.is_empty() {
            validate::validate_wwn(&self.wwn)?;
        }
        Ok(())
    }
}

pub fn convert_override_rows(rows: &[AttributeOverrideRow]) -> Vec<AttributeOverride> {
    rows.iter().map(AttributeOverrideRow::to_override).collect()
}

/// Dashboard summary entry: device metadata plus the latest SMART results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smart: Option<SmartSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub temp_history: Vec<SmartTemperature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartSummary {
    pub collector_date: DateTime<Utc>,
    pub temp: i64,
    pub power_on_hours: i64,
    pub power_cycle_count: i64,
    /// 0-100%, higher = more worn (NVMe percentage_used or ATA devstat_7_8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_used: Option<i64>,
    /// 0-100%, higher = healthier (ATA 177/233/231/232).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wearout_value: Option<i64>,
}

/// User settings persisted as typed `setting_entries` rows. Only the
/// `metrics` section drives core behavior; the rest are UI preferences the
/// frontend round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: String,
    pub dashboard_display: String,
    pub dashboard_sort: String,
    pub temperature_unit: String,
    pub file_size_si_units: bool,
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub notify_level: i64,
    pub status_filter_attributes: i64,
    pub status_threshold: i64,
    pub repeat_notifications: bool,

    pub notify_on_missed_ping: bool,
    pub missed_ping_timeout_minutes: i64,
    pub missed_ping_check_interval_mins: i64,

    pub heartbeat_enabled: bool,
    pub heartbeat_interval_hours: i64,

    pub report_enabled: bool,
    pub report_daily_enabled: bool,
    pub report_daily_time: String,
    pub report_weekly_enabled: bool,
    pub report_weekly_day: i64,
    pub report_weekly_time: String,
    pub report_monthly_enabled: bool,
    pub report_monthly_day: i64,
    pub report_monthly_time: String,
    pub report_pdf_enabled: bool,
    pub report_pdf_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            theme: "system".to_string(),
            dashboard_display: "name".to_string(),
            dashboard_sort: "status".to_string(),
            temperature_unit: "celsius".to_string(),
            file_size_si_units: false,
            metrics: MetricsSettings::default(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        MetricsSettings {
            notify_level: 2,
            status_filter_attributes: 0,
            status_threshold: 3,
            repeat_notifications: true,
            notify_on_missed_ping: false,
            missed_ping_timeout_minutes: 60,
            missed_ping_check_interval_mins: 5,
            heartbeat_enabled: false,
            heartbeat_interval_hours: 24,
            report_enabled: false,
            report_daily_enabled: false,
            report_daily_time: "08:00".to_string(),
            report_weekly_enabled: false,
            report_weekly_day: 1,
            report_weekly_time: "08:00".to_string(),
            report_monthly_enabled: false,
            report_monthly_day: 1,
            report_monthly_time: "08:00".to_string(),
            report_pdf_enabled: false,
            report_pdf_path: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_from_collector_info_populates_model_name() {
        let mut device = Device {
            wwn: "0x5000cca252c859cc".to_string(),
            device_name: "sdg".to_string(),
            ..Default::default()
        };
        let mut info = SmartInfo::default();
        info.model_name = "SEAGATE ST4000NM0043".to_string();
        info.firmware_version = "0004".to_string();
        info.device.protocol = "SCSI".to_string();
        info.smart_status.passed = true;

        device.update_from_collector_info(&info).unwrap();
        assert_eq!(device.model_name, "SEAGATE ST4000NM0043");
        assert_eq!(device.firmware, "0004");
        assert_eq!(device.device_protocol, "SCSI");
    }

    #[test]
    fn test_update_from_collector_info_ata() {
        let mut device = Device {
            wwn: "0x5000cca264eb01d7".to_string(),
            device_name: "sda".to_string(),
            ..Default::default()
        };
        let mut info = SmartInfo::default();
        info.model_name = "WDC WD140EDFZ-11A0VA0".to_string();
        info.firmware_version = "81.00A81".to_string();
        info.device.protocol = "ATA".to_string();
        info.smart_status.passed = true;

        device.update_from_collector_info(&info).unwrap();
        assert_eq!(device.model_name, "WDC WD140EDFZ-11A0VA0");
        assert_eq!(device.device_protocol, "ATA");
    }

    #[test]
    fn test_is_monitored_excludes_archived_and_muted() {
        let mut device = Device::default();
        assert!(device.is_monitored());
        device.archived = true;
        assert!(!device.is_monitored());
        device.archived = false;
        device.muted = true;
        assert!(!device.is_monitored());
    }

    #[test]
    fn test_display_name_prefers_label() {
        let mut device = Device {
            device_name: "/dev/sda".to_string(),
            ..Default::default()
        };
        assert_eq!(device.display_name(), "/dev/sda");
        device.label = "Parity Drive 1".to_string();
        assert_eq!(device.display_name(), "Parity Drive 1 (/dev/sda)");
    }

    #[test]
    fn test_override_row_validation() {
        let mut row = AttributeOverrideRow {
            protocol: "ATA".to_string(),
            attribute_id: "5".to_string(),
            action: "ignore".to_string(),
            ..Default::default()
        };
        assert!(row.validate().is_ok());

        row.protocol = "SATA".to_string();
        assert!(row.validate().is_err());

        row.protocol = "ATA".to_string();
        row.action = "destroy".to_string();
        assert!(row.validate().is_err());

        row.action = "force_status".to_string();
        row.status = String::new();
        assert!(row.validate().is_err());

        row.status = "failed".to_string();
        assert!(row.validate().is_ok());

        row.status = "exploded".to_string();
        assert!(row.validate().is_err());
    }

    #[test]
    fn test_override_row_wwn_must_be_valid_when_present() {
        let row = AttributeOverrideRow {
            protocol: "ATA".to_string(),
            attribute_id: "5".to_string(),
            wwn: "bad wwn with spaces".to_string(),
            ..Default::default()
        };
        assert!(row.validate().is_err());
    }

    #[test]
    fn test_override_row_conversion() {
        let row = AttributeOverrideRow {
            id: 7,
            protocol: "NVMe".to_string(),
            attribute_id: "media_errors".to_string(),
            action: "force_status".to_string(),
            status: "warn".to_string(),
            warn_above: Some(3),
            source: "ui".to_string(),
            ..Default::default()
        };
        let converted = row.to_override();
        assert_eq!(converted.protocol, "NVMe");
        assert_eq!(converted.action, OverrideAction::ForceStatus);
        assert_eq!(converted.status, "warn");
        assert_eq!(converted.warn_above, Some(3));
    }

    #[test]
    fn test_smart_display_mode_validation() {
        assert!(valid_smart_display_mode("scrutiny"));
        assert!(valid_smart_display_mode("raw"));
        assert!(valid_smart_display_mode("normalized"));
        assert!(!valid_smart_display_mode("fancy"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.metrics.status_threshold, 3);
        assert_eq!(settings.metrics.missed_ping_timeout_minutes, 60);
        assert_eq!(settings.metrics.missed_ping_check_interval_mins, 5);
        assert_eq!(settings.metrics.heartbeat_interval_hours, 24);
        assert_eq!(settings.metrics.report_daily_time, "08:00");
    }
}
