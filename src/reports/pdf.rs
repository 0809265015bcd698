use std::path::Path;

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::error::DrivePulseError;
use crate::reports::models::{ReportData, ReportPeriod};
use crate::reports::text::collect_alerts;

const PAGE_WIDTH: i64 = 595; // A4 portrait, points
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const LINE_HEIGHT: i64 = 14;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LINE_HEIGHT) as usize;

/// Filename for a generated report document, e.g.
/// `drivepulse-report-daily-2026-02-17.pdf`.
pub fn pdf_filename(period: ReportPeriod, now: DateTime<Utc>) -> String {
    format!(
        "drivepulse-report-{}-{}.pdf",
        period.as_str(),
        now.format("%Y-%m-%d")
    )
}

/// Write the report as a fixed-layout page-oriented document.
pub fn generate_pdf(
    report: &ReportData,
    output_path: &Path,
    version: &str,
) -> Result<(), DrivePulseError> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let lines = report_lines(report, version);
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut page_ids: Vec<Object> = Vec::new();
    for chunk in lines.chunks(LINES_PER_PAGE) {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("TL", vec![LINE_HEIGHT.into()]),
            Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
        ];
        for line in chunk {
            operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content
                .encode()
                .map_err(|e| DrivePulseError::Error(format!("pdf encode failed: {e}")))?,
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        page_ids.push(page_id.into());
    }

    let page_count = page_ids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(output_path)
        .map_err(|e| DrivePulseError::Error(format!("failed to write pdf: {e}")))?;
    Ok(())
}

fn report_lines(report: &ReportData, version: &str) -> Vec<String> {
    let mut lines = vec![
        format!(
            "DrivePulse {} Report - {}",
            report.period.label(),
            report.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        format!("Generated by DrivePulse v{version}"),
        format!(
            "Period: {} to {}",
            report.period_start.format("%Y-%m-%d"),
            report.period_end.format("%Y-%m-%d")
        ),
        String::new(),
        format!("Overall status: {}", report.overall_status()),
        format!(
            "Devices: {} total | {} passed | {} warning | {} failed | {} archived",
            report.total_devices,
            report.passed_devices,
            report.warning_devices,
            report.failed_devices,
            report.archived_devices
        ),
        String::new(),
    ];

    for (status, header) in [("failed", "FAILURES"), ("warning", "WARNINGS")] {
        let alerts = collect_alerts(report, status);
        if alerts.is_empty() {
            continue;
        }
        lines.push(format!("{header}:"));
        for (device_name, line) in alerts {
            lines.push(format!("  - {device_name}: {line}"));
        }
        lines.push(String::new());
    }

    if !report.devices.is_empty() {
        lines.push("DEVICES:".to_string());
        lines.push(format!(
            "{:<28} {:<10} {:>6} {:>12} {:>10}  {}",
            "Name", "Protocol", "Temp", "Power-On", "Cycles", "Status"
        ));
        for device in &report.devices {
            lines.push(format!(
                "{:<28} {:<10} {:>5}C {:>11}h {:>10}  {}",
                truncate(&device.display_name(), 28),
                device.protocol,
                device.temp_current,
                device.power_on_hours,
                device.power_cycle_count,
                device.status_string()
            ));
        }
        lines.push(String::new());
    }

    if !report.zfs_pools.is_empty() {
        lines.push("ZFS POOLS:".to_string());
        for pool in &report.zfs_pools {
            lines.push(format!(
                "{:<20} {:<10} capacity {:>5.1}%  errors {}/{}/{}  scrub: {}",
                truncate(&pool.name, 20),
                pool.health,
                pool.capacity,
                pool.errors_read,
                pool.errors_write,
                pool.errors_checksum,
                if pool.scrub_status.is_empty() {
                    "never"
                } else {
                    &pool.scrub_status
                }
            ));
        }
    }

    lines
}

fn truncate(input: &str, max: usize) -> String {
    if input.len() <= max {
        input.to_string()
    } else {
        format!("{}...", &input[..max.saturating_sub(3)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::models::DeviceReport;
    use tempfile::TempDir;

    fn sample_report(device_count: usize) -> ReportData {
        let mut report = ReportData::new(ReportPeriod::Daily, Utc::now(), Utc::now());
        for i in 0..device_count {
            report.devices.push(DeviceReport {
                name: format!("/dev/sd{i}"),
                protocol: "ATA".to_string(),
                temp_current: 38,
                power_on_hours: 1730,
                ..Default::default()
            });
        }
        report.total_devices = device_count;
        report.passed_devices = device_count;
        report
    }

    #[test]
    fn test_pdf_filename() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 2, 17, 8, 0, 0).unwrap();
        assert_eq!(
            pdf_filename(ReportPeriod::Daily, now),
            "drivepulse-report-daily-2026-02-17.pdf"
        );
        assert_eq!(
            pdf_filename(ReportPeriod::Monthly, now),
            "drivepulse-report-monthly-2026-02-17.pdf"
        );
    }

    #[test]
    fn test_generate_pdf_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reports").join("out.pdf");

        generate_pdf(&sample_report(3), &path, "0.9.2").unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF-"), "output must be a PDF document");
        assert!(bytes.len() > 500);
    }

    #[test]
    fn test_generate_pdf_paginates_large_reports() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.pdf");

        // enough device rows to spill onto multiple pages
        generate_pdf(&sample_report(150), &path, "0.9.2").unwrap();

        let doc = Document::load(&path).unwrap();
        assert!(doc.get_pages().len() >= 2, "large report should paginate");
    }

    #[test]
    fn test_report_lines_include_summary() {
        let lines = report_lines(&sample_report(1), "0.9.2");
        assert!(lines[0].contains("DrivePulse Daily Report"));
        assert!(lines.iter().any(|l| l.contains("Devices: 1 total")));
        assert!(lines.iter().any(|l| l.contains("/dev/sd0")));
    }
}
