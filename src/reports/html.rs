use crate::reports::models::{DeviceReport, ReportData, ZfsPoolReport};
use crate::reports::text::collect_alerts;

/// Render the HTML report body. Shares the alert-collection helpers with the
/// text formatter so both views always agree on content.
pub fn format_html_report(report: &ReportData) -> String {
    let period_label = report.period.label();
    let date_str = report.generated_at.format("%Y-%m-%d");
    let status_color = match report.overall_status() {
        "critical" => "#c62828",
        "warning" => "#ef6c00",
        _ => "#2e7d32",
    };

    let mut html = String::new();
    html.push_str("<html><body style=\"font-family: sans-serif;\">");
    html.push_str(&format!(
        "<h2>DrivePulse {period_label} Report - {date_str}</h2>"
    ));
    html.push_str(&format!(
        "<p style=\"color: {status_color}; font-weight: bold;\">Overall status: {}</p>",
        escape(report.overall_status())
    ));
    html.push_str(&format!(
        "<p>Devices: {} total | {} passed | {} warning | {} failed</p>",
        report.total_devices, report.passed_devices, report.warning_devices, report.failed_devices
    ));
    if report.archived_devices > 0 {
        html.push_str(&format!(
            "<p><i>{} archived device(s) excluded from this report.</i></p>",
            report.archived_devices
        ));
    }

    append_alert_table(&mut html, report, "failed", "Failures");
    append_alert_table(&mut html, report, "warning", "Warnings");
    append_device_table(&mut html, &report.devices);
    append_zfs_table(&mut html, &report.zfs_pools);

    html.push_str("</body></html>");
    html
}

fn append_alert_table(html: &mut String, report: &ReportData, status: &str, header: &str) {
    let alerts = collect_alerts(report, status);
    if alerts.is_empty() {
        return;
    }
    html.push_str(&format!("<h3>{header}</h3><ul>"));
    for (device_name, line) in alerts {
        html.push_str(&format!(
            "<li><b>{}</b>: {}</li>",
            escape(&device_name),
            escape(&line)
        ));
    }
    html.push_str("</ul>");
}

fn append_device_table(html: &mut String, devices: &[DeviceReport]) {
    if devices.is_empty() {
        return;
    }
    html.push_str("<h3>Devices</h3>");
    html.push_str("<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">");
    html.push_str(
        "<tr><th>Device</th><th>Model</th><th>Status</th><th>Temp</th>\
         <th>Temp Min/Max/Avg</th><th>Power-On Hours</th><th>Wear</th></tr>",
    );
    for device in devices {
        let wear = match (device.percentage_used, device.wearout_value) {
            (Some(used), _) => format!("{used}% used"),
            (None, Some(wearout)) => format!("{wearout}% life left"),
            (None, None) => "-".to_string(),
        };
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}C</td><td>{}C / {}C / {:.0}C</td><td>{}</td><td>{}</td></tr>",
            escape(&device.display_name()),
            escape(&device.model),
            escape(device.status_string()),
            device.temp_current,
            device.temp_min,
            device.temp_max,
            device.temp_avg,
            device.power_on_hours,
            escape(&wear),
        ));
    }
    html.push_str("</table>");
}

fn append_zfs_table(html: &mut String, pools: &[ZfsPoolReport]) {
    if pools.is_empty() {
        return;
    }
    html.push_str("<h3>ZFS Pools</h3>");
    html.push_str("<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">");
    html.push_str(
        "<tr><th>Pool</th><th>Health</th><th>Capacity</th><th>Errors (R/W/C)</th><th>Last Scrub</th></tr>",
    );
    for pool in pools {
        let last_scrub = pool
            .last_scrub_date
            .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:.1}%</td><td>{} / {} / {}</td><td>{}</td></tr>",
            escape(&pool.name),
            escape(&pool.health),
            pool.capacity,
            pool.errors_read,
            pool.errors_write,
            pool.errors_checksum,
            escape(&last_scrub),
        ));
    }
    html.push_str("</table>");
}

fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::models::ReportPeriod;
    use chrono::Utc;

    #[test]
    fn test_html_report_contains_sections() {
        let mut report = ReportData::new(ReportPeriod::Weekly, Utc::now(), Utc::now());
        report.total_devices = 1;
        report.passed_devices = 1;
        report.devices.push(DeviceReport {
            name: "/dev/sda".to_string(),
            model: "WDC WD140EDFZ".to_string(),
            temp_current: 38,
            ..Default::default()
        });
        report.zfs_pools.push(ZfsPoolReport {
            name: "tank".to_string(),
            health: "ONLINE".to_string(),
            capacity: 61.5,
            ..Default::default()
        });

        let html = format_html_report(&report);
        assert!(html.contains("DrivePulse Weekly Report"));
        assert!(html.contains("<h3>Devices</h3>"));
        assert!(html.contains("/dev/sda"));
        assert!(html.contains("<h3>ZFS Pools</h3>"));
        assert!(html.contains("tank"));
    }

    #[test]
    fn test_html_escapes_markup() {
        let mut report = ReportData::new(ReportPeriod::Daily, Utc::now(), Utc::now());
        report.total_devices = 1;
        report.devices.push(DeviceReport {
            name: "<script>alert(1)</script>".to_string(),
            ..Default::default()
        });

        let html = format_html_report(&report);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
