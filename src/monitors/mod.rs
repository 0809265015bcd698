mod heartbeat;
mod missed_ping;

pub use heartbeat::HeartbeatMonitor;
pub use missed_ping::{MissedPingMonitor, MissedPingStatusData, NotifiedDeviceInfo};

use chrono::{DateTime, Utc};

/// Diagnostics shared by every monitor: check timing and the most recent
/// error. Kept behind its own lock so status endpoints never contend with
/// the evaluation path.
#[derive(Debug, Default, Clone)]
pub struct MonitorStatus {
    pub last_check_time: Option<DateTime<Utc>>,
    pub next_check_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl MonitorStatus {
    pub fn record_check(&mut self, now: DateTime<Utc>) {
        self.last_check_time = Some(now);
    }

    pub fn record_error(&mut self, now: DateTime<Utc>, error: String) {
        self.last_error = Some(error);
        self.last_error_time = Some(now);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}
