use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::database::Repository;
use crate::error::DrivePulseError;
use crate::monitors::MonitorStatus;
use crate::notify::{new_heartbeat_payload, NotificationSender, ERR_NO_ENDPOINTS};

pub const DEFAULT_HEARTBEAT_INTERVAL_HOURS: i64 = 24;

/// Sends a periodic "all clear" notification when every monitored device is
/// healthy. Suppressed whenever any failure exists; the failure path owns
/// notification then.
pub struct HeartbeatMonitor {
    inner: Arc<HeartbeatInner>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) struct HeartbeatInner {
    config: Arc<Config>,
    notifier: Arc<dyn NotificationSender>,
    repo: Mutex<Option<Arc<Repository>>>,
    status: RwLock<MonitorStatus>,
}

impl HeartbeatMonitor {
    pub fn new(config: Arc<Config>, notifier: Arc<dyn NotificationSender>) -> HeartbeatMonitor {
        let (stop_tx, _) = watch::channel(false);
        HeartbeatMonitor {
            inner: Arc::new(HeartbeatInner {
                config,
                notifier,
                repo: Mutex::new(None),
                status: RwLock::new(MonitorStatus::default()),
            }),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let mut stop_rx = self.stop_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = inner.heartbeat_interval();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            info!("Heartbeat monitor started with interval: {interval:?}");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        inner.check_and_send_heartbeat();

                        let new_interval = inner.heartbeat_interval();
                        if new_interval != interval {
                            ticker = tokio::time::interval(new_interval);
                            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                            ticker.tick().await;
                            interval = new_interval;
                            debug!("Heartbeat interval updated to: {interval:?}");
                        }
                    }
                }
            }
        });

        *self.handle.lock().expect("monitor handle mutex poisoned") = Some(handle);
    }

    pub async fn stop(&self) {
        debug!("Stopping heartbeat monitor...");
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
        info!("Heartbeat monitor stopped");
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &HeartbeatInner {
        &self.inner
    }
}

impl HeartbeatInner {
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

    fn heartbeat_interval(&self) -> Duration {
        let hours = self
            .get_or_create_repo()
            .and_then(|repo| repo.load_settings())
            .map(|settings| settings.metrics.heartbeat_interval_hours)
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_HOURS);
        let hours = if hours <= 0 {
            DEFAULT_HEARTBEAT_INTERVAL_HOURS
        } else {
            hours
        };
        Duration::from_secs(hours as u64 * 3600)
    }

    /// One heartbeat tick: emit the all-clear iff heartbeats are enabled,
    /// at least one device is monitored, and none of them carry failures.
    pub(crate) fn check_and_send_heartbeat(&self) {
        let now = Utc::now();
        self.status
            .write()
            .expect("status lock poisoned")
            .record_check(now);

        let repo = match self.get_or_create_repo() {
            Ok(repo) => repo,
            Err(err) => {
                error!("Failed to get/create repository for heartbeat: {err}");
                self.status
                    .write()
                    .expect("status lock poisoned")
                    .record_error(now, err.to_string());
                return;
            }
        };

        let settings = match repo.load_settings() {
            Ok(settings) => settings,
            Err(err) => {
                self.reset_repo();
                error!("Failed to load settings for heartbeat: {err}");
                self.status
                    .write()
                    .expect("status lock poisoned")
                    .record_error(now, err.to_string());
                return;
            }
        };

        if !settings.metrics.heartbeat_enabled {
            debug!("Heartbeat notifications are disabled");
            self.status.write().expect("status lock poisoned").clear_error();
            return;
        }

        let devices = match repo.get_devices() {
            Ok(devices) => devices,
            Err(err) => {
                self.reset_repo();
                error!("Failed to load devices for heartbeat: {err}");
                self.status
                    .write()
                    .expect("status lock poisoned")
                    .record_error(now, err.to_string());
                return;
            }
        };

        self.status.write().expect("status lock poisoned").clear_error();

        let total_count = devices.len();
        let mut monitored_count = 0;
        let mut all_healthy = true;

        for device in &devices {
            if !device.is_monitored() {
                continue;
            }
            monitored_count += 1;
            if !device.device_status.is_passed() {
                all_healthy = false;
            }
        }

        if monitored_count == 0 {
            debug!("No monitored devices found, skipping heartbeat");
            return;
        }

        if !all_healthy {
            debug!("Active drive failures detected, skipping heartbeat (failure notifications take priority)");
            return;
        }

        info!("All {monitored_count} monitored drives healthy, sending heartbeat notification");

        let payload = new_heartbeat_payload(monitored_count, total_count);
        if let Err(err) = self
            .notifier
            .send(&payload.subject, &payload.message, payload.html.as_deref())
        {
            if err.to_string().contains(ERR_NO_ENDPOINTS) {
                warn!("Heartbeat ready but no notification endpoints are configured.");
            } else {
                error!("Failed to send heartbeat notification: {err}");
            }
            return;
        }

        info!("Heartbeat notification sent successfully");
    }
}
