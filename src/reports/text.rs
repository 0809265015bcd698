use crate::reports::models::{AlertEntry, DeviceReport, ReportData, ZfsPoolReport};

/// Render the plain-text report. Returns (subject, message).
pub fn format_text_report(report: &ReportData) -> (String, String) {
    let period_label = report.period.label();
    let date_str = report.generated_at.format("%Y-%m-%d");

    let subject = format_subject(report, period_label);

    let mut parts = vec![
        format!("DrivePulse {period_label} Report - {date_str}"),
        String::new(),
        format!(
            "Devices: {} total | {} passed | {} warning | {} failed",
            report.total_devices,
            report.passed_devices,
            report.warning_devices,
            report.failed_devices
        ),
    ];
    if report.archived_devices > 0 {
        parts.push(format!(
            "  ({} archived, excluded from report)",
            report.archived_devices
        ));
    }

    append_alert_section(&mut parts, report, "failed", "FAILURES:");
    append_alert_section(&mut parts, report, "warning", "WARNINGS:");
    append_temp_summary(&mut parts, &report.devices);
    append_zfs_section(&mut parts, &report.zfs_pools);

    (subject, parts.join("\n"))
}

fn format_subject(report: &ReportData, period_label: &str) -> String {
    if report.has_failures() {
        format!(
            "DrivePulse {period_label} Report - {} failed, {} warning",
            report.failed_devices, report.warning_devices
        )
    } else if report.has_warnings() {
        format!(
            "DrivePulse {period_label} Report - {} warning",
            report.warning_devices
        )
    } else {
        format!(
            "DrivePulse {period_label} Report - All {} drives healthy",
            report.total_devices
        )
    }
}

fn append_alert_section(parts: &mut Vec<String>, report: &ReportData, status: &str, header: &str) {
    let alerts = collect_alerts(report, status);
    if alerts.is_empty() {
        return;
    }
    parts.push(String::new());
    parts.push(header.to_string());
    for (device_name, line) in alerts {
        parts.push(format!("  - {device_name}: {line}"));
    }
}

fn append_temp_summary(parts: &mut Vec<String>, devices: &[DeviceReport]) {
    if devices.is_empty() {
        return;
    }
    let Some((hottest, coldest)) = temp_extremes(devices) else {
        return;
    };
    parts.push(String::new());
    parts.push("Temperature Summary:".to_string());
    parts.push(format!(
        "  Highest: {} at {}C (avg {:.0}C)",
        hottest.display_name(),
        hottest.temp_current,
        hottest.temp_avg
    ));
    if coldest.temp_current != hottest.temp_current {
        parts.push(format!(
            "  Lowest: {} at {}C (avg {:.0}C)",
            coldest.display_name(),
            coldest.temp_current,
            coldest.temp_avg
        ));
    }
}

fn append_zfs_section(parts: &mut Vec<String>, pools: &[ZfsPoolReport]) {
    if pools.is_empty() {
        return;
    }
    parts.push(String::new());
    parts.push("ZFS Pools:".to_string());
    for pool in pools {
        parts.push(format_zfs_pool_line(pool));
    }
}

fn format_zfs_pool_line(pool: &ZfsPoolReport) -> String {
    let mut details = format!("capacity: {:.1}%", pool.capacity);
    if pool.errors_read > 0 || pool.errors_write > 0 || pool.errors_checksum > 0 {
        details.push_str(&format!(
            ", errors: {} read / {} write / {} checksum",
            pool.errors_read, pool.errors_write, pool.errors_checksum
        ));
    }
    format!("  - {}: {} ({})", pool.name, pool.health, details)
}

pub(super) fn collect_alerts(report: &ReportData, status: &str) -> Vec<(String, String)> {
    let mut results = Vec::new();
    for device in &report.devices {
        for alert in &device.active_failures {
            if alert.status != status {
                continue;
            }
            results.push((device.display_name(), format_alert_line(alert)));
        }
    }
    results
}

fn format_alert_line(alert: &AlertEntry) -> String {
    let mut line = format!(
        "Attribute {} ({}) = {}",
        alert.attribute_id, alert.attribute_name, alert.value
    );
    if alert.threshold > 0 {
        line.push_str(&format!(" [threshold: {}]", alert.threshold));
    }
    line
}

fn temp_extremes(devices: &[DeviceReport]) -> Option<(&DeviceReport, &DeviceReport)> {
    let mut iter = devices.iter();
    let first = iter.next()?;
    let mut hottest = first;
    let mut coldest = first;
    for device in devices {
        if device.temp_current > hottest.temp_current {
            hottest = device;
        }
        if device.temp_current < coldest.temp_current || coldest.temp_current == 0 {
            coldest = device;
        }
    }
    Some((hottest, coldest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::models::ReportPeriod;
    use chrono::Utc;

    fn report_with_devices(devices: Vec<DeviceReport>) -> ReportData {
        let mut report = ReportData::new(ReportPeriod::Daily, Utc::now(), Utc::now());
        report.total_devices = devices.len();
        report.devices = devices;
        report
    }

    fn device(name: &str, temp: i64) -> DeviceReport {
        DeviceReport {
            name: name.to_string(),
            temp_current: temp,
            temp_avg: temp as f64,
            ..Default::default()
        }
    }

    #[test]
    fn test_subject_all_healthy() {
        let mut report = report_with_devices(vec![device("/dev/sda", 38)]);
        report.passed_devices = 1;
        let (subject, _) = format_text_report(&report);
        assert_eq!(subject, "DrivePulse Daily Report - All 1 drives healthy");
    }

    #[test]
    fn test_subject_with_failures() {
        let mut report = report_with_devices(vec![device("/dev/sda", 38)]);
        report.failed_devices = 2;
        report.warning_devices = 1;
        let (subject, _) = format_text_report(&report);
        assert_eq!(subject, "DrivePulse Daily Report - 2 failed, 1 warning");
    }

    #[test]
    fn test_subject_warnings_only() {
        let mut report = report_with_devices(vec![device("/dev/sda", 38)]);
        report.warning_devices = 3;
        let (subject, _) = format_text_report(&report);
        assert_eq!(subject, "DrivePulse Daily Report - 3 warning");
    }

    #[test]
    fn test_body_includes_device_counts() {
        let mut report = report_with_devices(vec![device("/dev/sda", 38)]);
        report.passed_devices = 1;
        report.archived_devices = 2;
        let (_, message) = format_text_report(&report);
        assert!(message.contains("Devices: 1 total | 1 passed | 0 warning | 0 failed"));
        assert!(message.contains("(2 archived, excluded from report)"));
    }

    #[test]
    fn test_body_failure_section() {
        let mut failed = device("/dev/sdb", 40);
        failed.active_failures.push(AlertEntry {
            attribute_id: "5".to_string(),
            attribute_name: "Reallocated Sectors Count".to_string(),
            status: "failed".to_string(),
            status_reason: "scrutiny".to_string(),
            value: 120,
            threshold: 0,
        });
        let mut report = report_with_devices(vec![failed]);
        report.failed_devices = 1;

        let (_, message) = format_text_report(&report);
        assert!(message.contains("FAILURES:"));
        assert!(message.contains("  - /dev/sdb: Attribute 5 (Reallocated Sectors Count) = 120"));
    }

    #[test]
    fn test_temperature_extremes() {
        let mut report = report_with_devices(vec![
            device("/dev/sda", 35),
            device("/dev/sdb", 48),
            device("/dev/sdc", 41),
        ]);
        report.passed_devices = 3;

        let (_, message) = format_text_report(&report);
        assert!(message.contains("Highest: /dev/sdb at 48C"));
        assert!(message.contains("Lowest: /dev/sda at 35C"));
    }

    #[test]
    fn test_zfs_pool_lines() {
        let mut report = report_with_devices(vec![]);
        report.zfs_pools.push(ZfsPoolReport {
            name: "tank".to_string(),
            health: "ONLINE".to_string(),
            capacity: 61.5,
            errors_checksum: 2,
            ..Default::default()
        });

        let (_, message) = format_text_report(&report);
        assert!(message.contains("ZFS Pools:"));
        assert!(message
            .contains("  - tank: ONLINE (capacity: 61.5%, errors: 0 read / 0 write / 2 checksum)"));
    }
}
