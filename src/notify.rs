use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};

use crate::error::DrivePulseError;
use crate::measurements::Smart;
use crate::models::Device;
use crate::status::{AttributeStatus, DeviceStatus, StatusFilterAttributes, StatusThreshold};
use crate::thresholds;

pub const ERR_NO_ENDPOINTS: &str = "no notification endpoints configured";

/// Contract with the concrete notification transports: a single send of
/// subject plus text body plus optional HTML body. Dispatch failures are the
/// caller's to log; they never fail the enclosing operation.
pub trait NotificationSender: Send + Sync {
    fn send(&self, subject: &str, text: &str, html: Option<&str>) -> Result<(), DrivePulseError>;
}

/// Default sender: logs deliveries against the configured endpoint URLs.
/// The URL-dispatch transport plugs in behind the same trait.
pub struct LogNotifier {
    urls: Vec<String>,
}

impl LogNotifier {
    pub fn new(urls: Vec<String>) -> LogNotifier {
        LogNotifier { urls }
    }
}

impl NotificationSender for LogNotifier {
    fn send(&self, subject: &str, text: &str, _html: Option<&str>) -> Result<(), DrivePulseError> {
        if self.urls.is_empty() {
            return Err(DrivePulseError::NotificationError(
                ERR_NO_ENDPOINTS.to_string(),
            ));
        }
        for url in &self.urls {
            info!("Dispatching notification to {}: {}", redact_url(url), subject);
            debug!(
                "Notification body:\n{}",
                truncate_for_notification(text, 2000)
            );
        }
        Ok(())
    }
}

// Endpoint URLs embed credentials; never log them whole.
fn redact_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, _)) => format!("{scheme}://***"),
        None => "***".to_string(),
    }
}

/// Decide whether a freshly-evaluated submission should notify.
///
/// `fetch_previous` supplies the previous raw submission for repeat
/// detection; a fetch error fails open (without history we cannot know
/// whether the alert is new, so we err on the side of alerting).
pub fn should_notify<F>(
    device: &Device,
    smart: &Smart,
    status_threshold: StatusThreshold,
    status_filter: StatusFilterAttributes,
    repeat_notifications: bool,
    fetch_previous: F,
) -> bool
where
    F: FnOnce() -> Result<Option<Smart>, DrivePulseError>,
{
    if device.device_status.is_passed() {
        debug!("Device {} is passing, no notification", device.wwn);
        return false;
    }
    if device.muted {
        debug!("Device {} is muted, skipping notification", device.wwn);
        return false;
    }

    let threshold_matched = match status_threshold {
        StatusThreshold::Both => true,
        StatusThreshold::Smart => device.device_status.has(DeviceStatus::FAILED_SMART),
        StatusThreshold::Scrutiny => device.device_status.has(DeviceStatus::FAILED_SCRUTINY),
    };
    if !threshold_matched {
        return false;
    }

    if status_filter == StatusFilterAttributes::Critical {
        let mut critical_failing = false;
        for (attr_id, attr) in &smart.attributes {
            if !thresholds::is_critical_attribute(smart.device_protocol, attr_id) {
                continue;
            }
            let status = attr.status();
            let failing = match status_threshold {
                StatusThreshold::Smart => status.has(AttributeStatus::FAILED_SMART),
                StatusThreshold::Scrutiny => status.has(AttributeStatus::FAILED_SCRUTINY),
                StatusThreshold::Both => {
                    status.has(AttributeStatus::FAILED_SMART)
                        || status.has(AttributeStatus::FAILED_SCRUTINY)
                }
            };
            if failing {
                critical_failing = true;
                break;
            }
        }
        if !critical_failing {
            debug!(
                "Device {} has no failing critical attributes, skipping notification",
                device.wwn
            );
            return false;
        }
    }

    if !repeat_notifications {
        match fetch_previous() {
            Err(err) => {
                warn!(
                    "Could not fetch previous submission for {} ({err}), notifying anyway",
                    device.wwn
                );
                return true;
            }
            Ok(None) => return true,
            Ok(Some(previous)) => {
                if previous.attribute_signature() == smart.attribute_signature() {
                    debug!(
                        "Device {} attribute statuses unchanged, suppressing repeat notification",
                        device.wwn
                    );
                    return false;
                }
            }
        }
    }

    true
}

/// A rendered notification ready for the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub subject: String,
    pub message: String,
    pub html: Option<String>,
}

/// A device included in a missed-ping digest.
#[derive(Debug, Clone)]
pub struct MissedPingDigestDevice {
    pub wwn: String,
    pub device_name: String,
    pub serial_number: String,
    pub host_id: String,
    pub label: String,
    pub last_seen: DateTime<Utc>,
}

fn failure_type(status: DeviceStatus) -> &'static str {
    if status.has(DeviceStatus::FAILED_SMART) {
        "SmartFailure"
    } else {
        "ScrutinyFailure"
    }
}

/// Build the device-failure notification.
pub fn new_device_failure_payload(device: &Device, test: bool, date: DateTime<Utc>) -> Payload {
    let failure = if test {
        "EmailTest"
    } else {
        failure_type(device.device_status)
    };

    let display_name = device.display_name();

    let subject = if device.host_id.is_empty() {
        format!("DrivePulse SMART error ({failure}) detected on device: {display_name}")
    } else {
        format!(
            "DrivePulse SMART error ({failure}) detected on [host]device: [{}]{display_name}",
            device.host_id
        )
    };

    let mut lines = Vec::new();
    if test {
        lines.push("TEST NOTIFICATION:".to_string());
    }
    lines.push(format!(
        "DrivePulse SMART error notification for device: {}",
        device.device_name
    ));
    if !device.host_id.is_empty() {
        lines.push(format!("Host Id: {}", device.host_id));
    }
    lines.push(format!("Failure Type: {failure}"));
    lines.push(format!("Device Name: {}", device.device_name));
    lines.push(format!("Device Serial: {}", device.serial_number));
    lines.push(format!("Device Type: {}", device.device_protocol));
    if !device.label.is_empty() {
        lines.push(format!("Device Label: {}", device.label));
    }
    lines.push(String::new());
    lines.push(format!(
        "Date: {}",
        date.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));

    Payload {
        subject,
        message: lines.join("\n"),
        html: None,
    }
}

/// Build the missed-ping digest: one notification covering every device
/// that exceeded the timeout this tick.
pub fn new_missed_ping_digest_payload(
    devices: &[MissedPingDigestDevice],
    timeout_minutes: i64,
) -> Payload {
    let subject = if devices.len() == 1 {
        format!(
            "DrivePulse: device {} has missed its check-in",
            digest_display_name(&devices[0])
        )
    } else {
        format!(
            "DrivePulse: {} devices have missed their check-in",
            devices.len()
        )
    };

    let mut lines = vec![
        format!(
            "The following device(s) have not submitted data for more than {timeout_minutes} minutes:"
        ),
        String::new(),
    ];
    for device in devices {
        lines.push(format!(
            "  - {} (serial: {}, last seen: {})",
            digest_display_name(device),
            device.serial_number,
            device.last_seen.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }

    Payload {
        subject,
        message: lines.join("\n"),
        html: None,
    }
}

fn digest_display_name(device: &MissedPingDigestDevice) -> String {
    let name = if device.label.is_empty() {
        device.device_name.clone()
    } else {
        format!("{} ({})", device.label, device.device_name)
    };
    if device.host_id.is_empty() {
        name
    } else {
        format!("[{}]{}", device.host_id, name)
    }
}

/// Build the periodic "all clear" heartbeat.
pub fn new_heartbeat_payload(monitored_count: usize, total_count: usize) -> Payload {
    Payload {
        subject: format!("DrivePulse heartbeat: all {monitored_count} drives healthy"),
        message: format!(
            "All {monitored_count} monitored drives are reporting healthy ({total_count} total registered)."
        ),
        html: None,
    }
}

/// Truncate a notification body to `max_len` characters, ending with "..."
/// when cut. Transports with hard caps (subject fields, chat topics) call
/// this before dispatch.
pub fn truncate_for_notification(message: &str, max_len: usize) -> String {
    if message.len() <= max_len {
        return message.to_string();
    }
    if max_len <= 3 {
        return message[..max_len].to_string();
    }
    format!("{}...", &message[..max_len - 3])
}
