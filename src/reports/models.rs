use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::DurationKey;

/// Report period. Each maps to a duration-keyed storage window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ReportPeriod {
    pub fn parse(s: &str) -> Option<ReportPeriod> {
        match s {
            "daily" => Some(ReportPeriod::Daily),
            "weekly" => Some(ReportPeriod::Weekly),
            "monthly" => Some(ReportPeriod::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Daily => "daily",
            ReportPeriod::Weekly => "weekly",
            ReportPeriod::Monthly => "monthly",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportPeriod::Daily => "Daily",
            ReportPeriod::Weekly => "Weekly",
            ReportPeriod::Monthly => "Monthly",
        }
    }

    pub fn duration_key(&self) -> DurationKey {
        match self {
            ReportPeriod::Daily => DurationKey::Day,
            ReportPeriod::Weekly => DurationKey::Week,
            ReportPeriod::Monthly => DurationKey::Month,
        }
    }
}

/// The in-memory report: period bounds, per-device rows and per-pool rows.
/// Formatters render it to text, HTML, and PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub period: ReportPeriod,

    pub devices: Vec<DeviceReport>,
    pub zfs_pools: Vec<ZfsPoolReport>,

    pub total_devices: usize,
    pub passed_devices: usize,
    pub warning_devices: usize,
    pub failed_devices: usize,
    pub archived_devices: usize,
}

impl ReportData {
    pub fn new(period: ReportPeriod, start: DateTime<Utc>, end: DateTime<Utc>) -> ReportData {
        ReportData {
            generated_at: Utc::now(),
            period_start: start,
            period_end: end,
            period,
            devices: Vec::new(),
            zfs_pools: Vec::new(),
            total_devices: 0,
            passed_devices: 0,
            warning_devices: 0,
            failed_devices: 0,
            archived_devices: 0,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed_devices > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_devices > 0
    }

    pub fn overall_status(&self) -> &'static str {
        if self.failed_devices > 0 {
            "critical"
        } else if self.warning_devices > 0 {
            "warning"
        } else {
            "healthy"
        }
    }
}

/// Health data for one device over the report period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceReport {
    pub wwn: String,
    pub name: String,
    pub model: String,
    pub serial: String,
    pub protocol: String,
    pub host_id: String,
    pub label: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wearout_value: Option<i64>,

    pub active_failures: Vec<AlertEntry>,

    pub temp_current: i64,
    pub temp_min: i64,
    pub temp_max: i64,
    pub temp_avg: f64,
    pub power_on_hours: i64,
    pub power_cycle_count: i64,
    /// Bit set: 0=pass, 1=smart fail, 2=scrutiny fail, 3=both.
    pub status: i64,
}

impl DeviceReport {
    pub fn display_name(&self) -> String {
        if self.label.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.label, self.name)
        }
    }

    pub fn status_string(&self) -> &'static str {
        match self.status {
            0 => "passed",
            1 => "failed (smart)",
            2 => "failed (scrutiny)",
            3 => "failed (smart+scrutiny)",
            _ => "unknown",
        }
    }
}

/// A SMART attribute in warning or failure state at period end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertEntry {
    pub attribute_id: String,
    pub attribute_name: String,
    /// "warning" or "failed"
    pub status: String,
    /// "smart" or "scrutiny"
    pub status_reason: String,
    pub value: i64,
    pub threshold: i64,
}

/// Health data for one ZFS pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZfsPoolReport {
    pub name: String,
    pub guid: String,
    pub health: String,
    pub scrub_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scrub_date: Option<DateTime<Utc>>,
    pub capacity: f64,
    pub errors_read: i64,
    pub errors_write: i64,
    pub errors_checksum: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_status_precedence() {
        let mut report = ReportData::new(ReportPeriod::Daily, Utc::now(), Utc::now());
        assert_eq!(report.overall_status(), "healthy");
        report.warning_devices = 2;
        assert_eq!(report.overall_status(), "warning");
        report.failed_devices = 1;
        assert_eq!(report.overall_status(), "critical");
    }

    #[test]
    fn test_device_report_display_name() {
        let mut device = DeviceReport {
            name: "/dev/sda".to_string(),
            ..Default::default()
        };
        assert_eq!(device.display_name(), "/dev/sda");
        device.label = "Parity 1".to_string();
        assert_eq!(device.display_name(), "Parity 1 (/dev/sda)");
    }

    #[test]
    fn test_status_string() {
        let mut device = DeviceReport::default();
        assert_eq!(device.status_string(), "passed");
        device.status = 1;
        assert_eq!(device.status_string(), "failed (smart)");
        device.status = 2;
        assert_eq!(device.status_string(), "failed (scrutiny)");
        device.status = 3;
        assert_eq!(device.status_string(), "failed (smart+scrutiny)");
    }

    #[test]
    fn test_period_parse_and_duration_key() {
        assert_eq!(ReportPeriod::parse("daily"), Some(ReportPeriod::Daily));
        assert_eq!(ReportPeriod::parse("hourly"), None);
        assert_eq!(ReportPeriod::Monthly.duration_key(), DurationKey::Month);
    }
}
