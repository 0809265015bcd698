use chrono::{DateTime, Utc};

use crate::database::Repository;
use crate::error::DrivePulseError;
use crate::measurements::SmartTemperature;
use crate::models::DeviceSummary;
use crate::reports::models::{AlertEntry, DeviceReport, ReportData, ReportPeriod, ZfsPoolReport};
use crate::status::{AttributeStatus, DeviceStatus};
use crate::zfs::ZfsScrubState;

/// Build a complete report for a period by reading the storage plane.
/// Archived devices are counted but excluded from the body.
pub fn generate(
    repo: &Repository,
    period: ReportPeriod,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ReportData, DrivePulseError> {
    let mut report = ReportData::new(period, start, end);

    let summaries = repo.get_summary()?;
    let duration_key = period.duration_key();
    let temp_history = repo.get_temperature_history(duration_key)?;

    let mut archived_count = 0;
    for (wwn, summary) in &summaries {
        if summary.device.archived {
            archived_count += 1;
            continue;
        }

        let mut device_report = build_device_report(summary, temp_history.get(wwn));
        populate_active_failures(repo, &mut device_report, wwn);
        report.total_devices += 1;

        let status = summary.device.device_status;
        if status.has(DeviceStatus::FAILED_SMART) || status.has(DeviceStatus::FAILED_SCRUTINY) {
            report.failed_devices += 1;
        } else {
            report.passed_devices += 1;
        }

        report.devices.push(device_report);
    }
    report.devices.sort_by(|a, b| a.name.cmp(&b.name));

    report.archived_devices = archived_count;
    report.warning_devices = report
        .total_devices
        .saturating_sub(report.passed_devices + report.failed_devices);

    populate_zfs_pools(repo, &mut report);

    Ok(report)
}

fn build_device_report(
    summary: &DeviceSummary,
    temps: Option<&Vec<SmartTemperature>>,
) -> DeviceReport {
    let device = &summary.device;
    let mut report = DeviceReport {
        wwn: device.wwn.clone(),
        name: device.device_name.clone(),
        model: device.model_name.clone(),
        serial: device.serial_number.clone(),
        protocol: device.device_protocol.clone(),
        host_id: device.host_id.clone(),
        label: device.label.clone(),
        status: device.device_status.0,
        ..Default::default()
    };

    if let Some(smart) = &summary.smart {
        report.temp_current = smart.temp;
        report.power_on_hours = smart.power_on_hours;
        report.power_cycle_count = smart.power_cycle_count;
        report.percentage_used = smart.percentage_used;
        report.wearout_value = smart.wearout_value;
    }

    match temps.filter(|series| !series.is_empty()) {
        Some(series) => {
            let (min, max, avg) = aggregate_temps(series);
            report.temp_min = min;
            report.temp_max = max;
            report.temp_avg = avg;
        }
        None => {
            report.temp_min = report.temp_current;
            report.temp_max = report.temp_current;
            report.temp_avg = report.temp_current as f64;
        }
    }

    report
}

/// Attributes still in warning or failure state on the latest stored point.
fn populate_active_failures(repo: &Repository, device_report: &mut DeviceReport, wwn: &str) {
    let latest = match repo.get_latest_smart_submission(wwn) {
        Ok(Some(smart)) => smart,
        _ => return,
    };

    for (attr_id, attr) in &latest.attributes {
        let status = attr.status();
        if status.is_passed() || status.has(AttributeStatus::INVALID_VALUE) {
            continue;
        }

        let mut entry = AlertEntry {
            attribute_id: attr_id.clone(),
            value: attr.transformed_value(),
            ..Default::default()
        };

        if status.has(AttributeStatus::FAILED_SMART) {
            entry.status = "failed".to_string();
            entry.status_reason = "smart".to_string();
        } else if status.has(AttributeStatus::FAILED_SCRUTINY) {
            entry.status = "failed".to_string();
            entry.status_reason = "scrutiny".to_string();
        } else if status.has(AttributeStatus::WARNING_SCRUTINY) {
            entry.status = "warning".to_string();
            entry.status_reason = "scrutiny".to_string();
        } else {
            continue;
        }

        device_report.active_failures.push(entry);
    }
    device_report
        .active_failures
        .sort_by(|a, b| a.attribute_id.cmp(&b.attribute_id));
}

fn populate_zfs_pools(repo: &Repository, report: &mut ReportData) {
    let pools = match repo.get_zfs_pools_summary() {
        Ok(pools) => pools,
        Err(_) => return,
    };

    for pool in pools.values() {
        let mut pool_report = ZfsPoolReport {
            name: pool.name.clone(),
            guid: pool.guid.clone(),
            health: pool.health.clone(),
            capacity: pool.capacity_percent,
            errors_read: pool.total_read_errors,
            errors_write: pool.total_write_errors,
            errors_checksum: pool.total_checksum_errors,
            ..Default::default()
        };

        if pool.scrub_state != ZfsScrubState::None {
            pool_report.scrub_status = pool.scrub_state.as_str().to_string();
        }
        pool_report.last_scrub_date = pool.scrub_end_time;

        report.zfs_pools.push(pool_report);
    }
    report.zfs_pools.sort_by(|a, b| a.name.cmp(&b.name));
}

fn aggregate_temps(temps: &[SmartTemperature]) -> (i64, i64, f64) {
    if temps.is_empty() {
        return (0, 0, 0.0);
    }

    let mut min = temps[0].temp;
    let mut max = temps[0].temp;
    let mut sum = 0_i64;

    for sample in temps {
        if sample.temp < min {
            min = sample.temp;
        }
        if sample.temp > max {
            max = sample.temp;
        }
        sum += sample.temp;
    }

    (min, max, sum as f64 / temps.len() as f64)
}
