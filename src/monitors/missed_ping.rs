use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::database::Repository;
use crate::error::DrivePulseError;
use crate::models::Device;
use crate::monitors::MonitorStatus;
use crate::notify::{
    new_missed_ping_digest_payload, MissedPingDigestDevice, NotificationSender, ERR_NO_ENDPOINTS,
};

pub const DEFAULT_MISSED_PING_TIMEOUT_MINUTES: i64 = 60;
pub const DEFAULT_MISSED_PING_CHECK_INTERVAL_MINS: i64 = 5;

/// Watches for devices whose collectors have stopped submitting and sends a
/// digest notification per tick. Per-device dedup keeps a silent device from
/// re-alerting until a full timeout has elapsed since its last inclusion.
pub struct MissedPingMonitor {
    inner: Arc<MissedPingInner>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) struct MissedPingInner {
    config: Arc<Config>,
    notifier: Arc<dyn NotificationSender>,

    // Shared storage handle; recreated after a transient failure.
    repo: Mutex<Option<Arc<Repository>>>,

    // Devices already notified about, by WWN, with the notification time.
    // Writers hold the lock only for the insert/remove itself.
    notified_devices: RwLock<HashMap<String, DateTime<Utc>>>,

    // Diagnostics, behind a separate lock from the dedup table.
    status: RwLock<MonitorStatus>,
}

/// Diagnostics snapshot exposed through the API.
#[derive(Debug, Clone, Serialize)]
pub struct MissedPingStatusData {
    pub enabled: bool,
    pub timeout_minutes: i64,
    pub check_interval_minutes: i64,
    pub total_devices: usize,
    pub monitored_devices: usize,
    pub notified_devices: Vec<NotifiedDeviceInfo>,
    pub last_check_time: Option<String>,
    pub next_check_time: Option<String>,
    pub last_error: Option<String>,
    pub last_error_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifiedDeviceInfo {
    pub wwn: String,
    pub device_name: String,
    pub notification_time: String,
    pub last_seen_time: Option<String>,
}

impl MissedPingMonitor {
    pub fn new(config: Arc<Config>, notifier: Arc<dyn NotificationSender>) -> MissedPingMonitor {
        let (stop_tx, _) = watch::channel(false);
        MissedPingMonitor {
            inner: Arc::new(MissedPingInner {
                config,
                notifier,
                repo: Mutex::new(None),
                notified_devices: RwLock::new(HashMap::new()),
                status: RwLock::new(MonitorStatus::default()),
            }),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    /// Begin the background loop. The check interval is re-read from
    /// settings on every tick; a changed interval replaces the ticker in
    /// place. A tick whose work overruns the interval causes the next tick
    /// to be dropped.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let mut stop_rx = self.stop_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = inner.check_interval();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            info!("Missed ping monitor started with check interval: {interval:?}");
            inner.set_next_check(interval);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        inner.check_missed_pings(Utc::now());

                        let new_interval = inner.check_interval();
                        if new_interval != interval {
                            ticker = tokio::time::interval(new_interval);
                            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                            ticker.tick().await;
                            interval = new_interval;
                            debug!("Missed ping check interval updated to: {interval:?}");
                        }
                        inner.set_next_check(interval);
                    }
                }
            }
        });

        *self.handle.lock().expect("monitor handle mutex poisoned") = Some(handle);
    }

    /// Stop the loop, wait for it to drain, and release the storage handle.
    pub async fn stop(&self) {
        debug!("Stopping missed ping monitor...");
        let _ = self.stop_tx.send(true);
        let handle = self
            .handle
            .lock()
            .expect("monitor handle mutex poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        *self.inner.repo.lock().expect("monitor repo mutex poisoned") = None;
        info!("Missed ping monitor stopped");
    }

    pub fn get_status(&self) -> Result<MissedPingStatusData, DrivePulseError> {
        self.inner.status_snapshot()
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &MissedPingInner {
        &self.inner
    }
}

impl MissedPingInner {
    fn get_or_create_repo(&self) -> Result<Arc<Repository>, DrivePulseError> {
        let mut guard = self.repo.lock().expect("monitor repo mutex poisoned");
        if let Some(repo) = guard.as_ref() {
            return Ok(Arc::clone(repo));
        }
        let repo = Arc::new(Repository::connect(Arc::clone(&self.config))?);
        *guard = Some(Arc::clone(&repo));
        Ok(repo)
    }

    fn reset_repo(&self) {
        *self.repo.lock().expect("monitor repo mutex poisoned") = None;
    }

    fn check_interval(&self) -> Duration {
        let minutes = self
            .get_or_create_repo()
            .and_then(|repo| repo.load_settings())
            .map(|settings| settings.metrics.missed_ping_check_interval_mins)
            .unwrap_or(DEFAULT_MISSED_PING_CHECK_INTERVAL_MINS);
        let minutes = if minutes <= 0 {
            DEFAULT_MISSED_PING_CHECK_INTERVAL_MINS
        } else {
            minutes
        };
        Duration::from_secs(minutes as u64 * 60)
    }

    fn set_next_check(&self, interval: Duration) {
        let mut status = self.status.write().expect("status lock poisoned");
        status.next_check_time =
            Some(Utc::now() + chrono::Duration::seconds(interval.as_secs() as i64));
    }

    /// One monitor tick.
    pub(crate) fn check_missed_pings(&self, now: DateTime<Utc>) {
        self.status
            .write()
            .expect("status lock poisoned")
            .record_check(now);

        let data = match self.load_check_data() {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("Missed ping notifications are disabled");
                self.status.write().expect("status lock poisoned").clear_error();
                return;
            }
            Err(err) => {
                error!("Failed to load data for missed ping check: {err}");
                self.status
                    .write()
                    .expect("status lock poisoned")
                    .record_error(now, err.to_string());
                return;
            }
        };

        self.status.write().expect("status lock poisoned").clear_error();

        let mut current_wwns: HashMap<String, bool> = HashMap::with_capacity(data.devices.len());
        let mut missed = Vec::new();

        for device in &data.devices {
            current_wwns.insert(device.wwn.clone(), true);
            if let Some(digest_device) = self.check_device(device, &data, now) {
                missed.push(digest_device);
            }
        }

        if !missed.is_empty() {
            self.send_digest(&missed, data.timeout_minutes, now);
        }

        self.cleanup_stale_notifications(&current_wwns);
    }

    fn load_check_data(&self) -> Result<Option<CheckData>, DrivePulseError> {
        let repo = self.get_or_create_repo()?;

        let settings = match repo.load_settings() {
            Ok(settings) => settings,
            Err(err) => {
                self.reset_repo();
                return Err(err);
            }
        };

        if !settings.metrics.notify_on_missed_ping {
            return Ok(None);
        }

        let mut timeout_minutes = settings.metrics.missed_ping_timeout_minutes;
        if timeout_minutes <= 0 {
            timeout_minutes = DEFAULT_MISSED_PING_TIMEOUT_MINUTES;
        }

        let devices = match repo.get_devices() {
            Ok(devices) => devices,
            Err(err) => {
                self.reset_repo();
                return Err(err);
            }
        };

        let last_seen = match repo.get_last_seen_all() {
            Ok(last_seen) => last_seen,
            Err(err) => {
                self.reset_repo();
                return Err(err);
            }
        };

        debug!(
            "Loaded missed ping check data: {} devices, timeout={}m",
            devices.len(),
            timeout_minutes
        );

        Ok(Some(CheckData {
            timeout_minutes,
            devices,
            last_seen,
        }))
    }

    /// Check one device. Returns digest data when the device has missed its
    /// check-in and has not already been notified within the timeout.
    fn check_device(
        &self,
        device: &Device,
        data: &CheckData,
        now: DateTime<Utc>,
    ) -> Option<MissedPingDigestDevice> {
        if device.archived || device.muted {
            debug!(
                "Skipping device {} - archived: {}, muted: {}",
                device.wwn, device.archived, device.muted
            );
            return None;
        }

        let Some(last_seen) = data.last_seen.get(&device.wwn) else {
            debug!("Device {} has no last seen time (newly registered?)", device.wwn);
            return None;
        };

        let timeout = chrono::Duration::minutes(data.timeout_minutes);
        if now - *last_seen <= timeout {
            self.clear_notification_state(&device.wwn);
            return None;
        }

        // device has missed pings; consult the dedup table
        {
            let notified = self.notified_devices.read().expect("dedup lock poisoned");
            if let Some(last_notified) = notified.get(&device.wwn) {
                if now - *last_notified < timeout {
                    debug!(
                        "Already notified about device {} at {last_notified}, skipping",
                        device.wwn
                    );
                    return None;
                }
            }
        }

        warn!(
            "Device {} ({}) has not sent data since {} (threshold: {} minutes)",
            device.wwn, device.device_name, last_seen, data.timeout_minutes
        );

        Some(MissedPingDigestDevice {
            wwn: device.wwn.clone(),
            device_name: device.device_name.clone(),
            serial_number: device.serial_number.clone(),
            host_id: device.host_id.clone(),
            label: device.label.clone(),
            last_seen: *last_seen,
        })
    }

    fn send_digest(
        &self,
        devices: &[MissedPingDigestDevice],
        timeout_minutes: i64,
        now: DateTime<Utc>,
    ) {
        let payload = new_missed_ping_digest_payload(devices, timeout_minutes);
        if let Err(err) = self
            .notifier
            .send(&payload.subject, &payload.message, payload.html.as_deref())
        {
            if err.to_string().contains(ERR_NO_ENDPOINTS) {
                warn!(
                    "Missed pings detected for {} device(s) but no notification endpoints are configured.",
                    devices.len()
                );
            } else {
                error!("Failed to send missed ping digest notification: {err}");
            }
            return;
        }

        let mut notified = self.notified_devices.write().expect("dedup lock poisoned");
        for device in devices {
            notified.insert(device.wwn.clone(), now);
        }
        drop(notified);

        info!(
            "Sent missed ping digest notification for {} device(s)",
            devices.len()
        );
    }

    fn clear_notification_state(&self, wwn: &str) {
        let mut notified = self.notified_devices.write().expect("dedup lock poisoned");
        if notified.remove(wwn).is_some() {
            debug!("Cleared missed ping notification state for device {wwn} (device is now healthy)");
        }
    }

    /// Drop dedup entries for devices that no longer exist.
    fn cleanup_stale_notifications(&self, current_wwns: &HashMap<String, bool>) {
        let mut notified = self.notified_devices.write().expect("dedup lock poisoned");
        notified.retain(|wwn, _| {
            let keep = current_wwns.contains_key(wwn);
            if !keep {
                debug!("Cleaned up stale notification state for deleted device {wwn}");
            }
            keep
        });
    }

    pub(crate) fn is_device_notified(&self, wwn: &str) -> bool {
        self.notified_devices
            .read()
            .expect("dedup lock poisoned")
            .contains_key(wwn)
    }

    pub(crate) fn notified_count(&self) -> usize {
        self.notified_devices
            .read()
            .expect("dedup lock poisoned")
            .len()
    }

    fn status_snapshot(&self) -> Result<MissedPingStatusData, DrivePulseError> {
        let status = self.status.read().expect("status lock poisoned").clone();

        let repo = self.get_or_create_repo()?;
        let settings = repo.load_settings()?;
        let devices = repo.get_devices()?;
        let last_seen = repo.get_last_seen_all().unwrap_or_default();

        let monitored = devices.iter().filter(|d| d.is_monitored()).count();

        let notified = self.notified_devices.read().expect("dedup lock poisoned");
        let mut notified_devices: Vec<NotifiedDeviceInfo> = notified
            .iter()
            .map(|(wwn, time)| NotifiedDeviceInfo {
                wwn: wwn.clone(),
                device_name: devices
                    .iter()
                    .find(|d| &d.wwn == wwn)
                    .map(|d| d.device_name.clone())
                    .unwrap_or_default(),
                notification_time: time.to_rfc3339_opts(SecondsFormat::Secs, true),
                last_seen_time: last_seen
                    .get(wwn)
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            })
            .collect();
        notified_devices.sort_by(|a, b| a.wwn.cmp(&b.wwn));

        let format = |time: Option<DateTime<Utc>>| {
            time.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        };

        Ok(MissedPingStatusData {
            enabled: settings.metrics.notify_on_missed_ping,
            timeout_minutes: settings.metrics.missed_ping_timeout_minutes,
            check_interval_minutes: settings.metrics.missed_ping_check_interval_mins,
            total_devices: devices.len(),
            monitored_devices: monitored,
            notified_devices,
            last_check_time: format(status.last_check_time),
            next_check_time: format(status.next_check_time),
            last_error: status.last_error,
            last_error_time: format(status.last_error_time),
        })
    }
}

struct CheckData {
    timeout_minutes: i64,
    devices: Vec<Device>,
    last_seen: HashMap<String, DateTime<Utc>>,
}
