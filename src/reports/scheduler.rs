use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, TimeZone, Utc};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::database::Repository;
use crate::error::DrivePulseError;
use crate::notify::NotificationSender;
use crate::reports::html::format_html_report;
use crate::reports::models::{ReportData, ReportPeriod};
use crate::reports::pdf::{generate_pdf, pdf_filename};
use crate::reports::text::format_text_report;
use crate::reports::{self};

pub const DEFAULT_REPORT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

const SETTING_LAST_DAILY_RUN: &str = "metrics.report_last_daily_run";
const SETTING_LAST_WEEKLY_RUN: &str = "metrics.report_last_weekly_run";
const SETTING_LAST_MONTHLY_RUN: &str = "metrics.report_last_monthly_run";

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone)]
struct LastRuns {
    daily: Option<DateTime<Local>>,
    weekly: Option<DateTime<Local>>,
    monthly: Option<DateTime<Local>>,
}

/// Runs report generation on the configured schedules. Ticks once a minute;
/// settings are re-read on every tick so schedule changes apply without a
/// restart. Last-run timestamps are persisted so a restart does not re-fire
/// (or skip) a period.
pub struct ReportScheduler {
    inner: Arc<SchedulerInner>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct SchedulerInner {
    config: Arc<Config>,
    notifier: Arc<dyn NotificationSender>,
    repo: Mutex<Option<Arc<Repository>>>,
    last_runs: RwLock<LastRuns>,
}

impl ReportScheduler {
    pub fn new(config: Arc<Config>, notifier: Arc<dyn NotificationSender>) -> ReportScheduler {
        let (stop_tx, _) = watch::channel(false);
        ReportScheduler {
            inner: Arc::new(SchedulerInner {
                config,
                notifier,
                repo: Mutex::new(None),
                last_runs: RwLock::new(LastRuns::default()),
            }),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let mut stop_rx = self.stop_tx.subscribe();

        let handle = tokio::spawn(async move {
            inner.load_last_run_timestamps();

            let mut ticker = tokio::time::interval(DEFAULT_REPORT_CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            info!("Report scheduler started");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        inner.check_and_run(Local::now());
                    }
                }
            }
        });

        *self.handle.lock().expect("scheduler handle mutex poisoned") = Some(handle);
    }

    pub async fn stop(&self) {
        debug!("Stopping report scheduler...");
        let _ = self.stop_tx.send(true);
        let handle = self
            .handle
            .lock()
            .expect("scheduler handle mutex poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        *self.inner.repo.lock().expect("scheduler repo mutex poisoned") = None;
        info!("Report scheduler stopped");
    }

    /// Generate a report immediately without sending it.
    pub fn generate_on_demand(
        &self,
        period: ReportPeriod,
    ) -> Result<ReportData, DrivePulseError> {
        self.inner.generate(period, Local::now())
    }

    /// Generate a report and push it through the notifier.
    pub fn send_test_report(&self, period: ReportPeriod) -> Result<ReportData, DrivePulseError> {
        let report = self.generate_on_demand(period)?;
        self.inner.send_notification(&report);
        Ok(report)
    }

    /// Generate a PDF on demand; returns the output path.
    pub fn generate_on_demand_pdf(
        &self,
        period: ReportPeriod,
    ) -> Result<PathBuf, DrivePulseError> {
        let report = self.generate_on_demand(period)?;
        let output_path = std::env::temp_dir()
            .join("drivepulse-reports")
            .join(pdf_filename(period, Utc::now()));
        generate_pdf(&report, &output_path, VERSION)?;
        Ok(output_path)
    }
}

impl SchedulerInner {
    fn get_or_create_repo(&self) -> Result<Arc<Repository>, DrivePulseError> {
        let mut guard = self.repo.lock().expect("scheduler repo mutex poisoned");
        if let Some(repo) = guard.as_ref() {
            return Ok(Arc::clone(repo));
        }
        let repo = Arc::new(Repository::connect(Arc::clone(&self.config))?);
        *guard = Some(Arc::clone(&repo));
        Ok(repo)
    }

    fn reset_repo(&self) {
        *self.repo.lock().expect("scheduler repo mutex poisoned") = None;
    }

    fn load_last_run_timestamps(&self) {
        let repo = match self.get_or_create_repo() {
            Ok(repo) => repo,
            Err(err) => {
                warn!("Report scheduler: could not load last-run timestamps: {err}");
                return;
            }
        };

        let load = |key: &str| -> Option<DateTime<Local>> {
            let value = repo.get_setting_value(key).ok()?;
            if value.is_empty() {
                return None;
            }
            match DateTime::parse_from_rfc3339(&value) {
                Ok(parsed) => Some(parsed.with_timezone(&Local)),
                Err(_) => {
                    warn!("Report scheduler: invalid timestamp for {key}: {value:?}");
                    None
                }
            }
        };

        let mut last_runs = self.last_runs.write().expect("last-runs lock poisoned");
        last_runs.daily = load(SETTING_LAST_DAILY_RUN);
        last_runs.weekly = load(SETTING_LAST_WEEKLY_RUN);
        last_runs.monthly = load(SETTING_LAST_MONTHLY_RUN);
        info!(
            "Report scheduler loaded last-run timestamps: daily={:?}, weekly={:?}, monthly={:?}",
            last_runs.daily, last_runs.weekly, last_runs.monthly
        );
    }

    fn save_last_run_timestamp(&self, key: &str, time: DateTime<Local>) {
        let repo = match self.get_or_create_repo() {
            Ok(repo) => repo,
            Err(err) => {
                error!("Report scheduler: could not save last-run timestamp: {err}");
                return;
            }
        };
        if let Err(err) = repo.set_setting_value(key, &time.to_rfc3339()) {
            error!("Report scheduler: failed to persist {key}: {err}");
        }
    }

    /// One scheduler tick. Public within the crate for tests.
    pub(crate) fn check_and_run(&self, now: DateTime<Local>) {
        let repo = match self.get_or_create_repo() {
            Ok(repo) => repo,
            Err(err) => {
                debug!("Report scheduler: failed to get repo: {err}");
                return;
            }
        };

        let settings = match repo.load_settings() {
            Ok(settings) => settings,
            Err(err) => {
                self.reset_repo();
                debug!("Report scheduler: failed to load settings: {err}");
                return;
            }
        };
        if !settings.metrics.report_enabled {
            return;
        }

        let last_runs = self
            .last_runs
            .read()
            .expect("last-runs lock poisoned")
            .clone();

        if settings.metrics.report_daily_enabled
            && is_daily_due(now, last_runs.daily, &settings.metrics.report_daily_time)
        {
            self.run_report(
                ReportPeriod::Daily,
                now,
                settings.metrics.report_pdf_enabled,
                &settings.metrics.report_pdf_path,
            );
            self.last_runs.write().expect("last-runs lock poisoned").daily = Some(now);
            self.save_last_run_timestamp(SETTING_LAST_DAILY_RUN, now);
        }

        if settings.metrics.report_weekly_enabled
            && is_weekly_due(
                now,
                last_runs.weekly,
                settings.metrics.report_weekly_day,
                &settings.metrics.report_weekly_time,
            )
        {
            self.run_report(
                ReportPeriod::Weekly,
                now,
                settings.metrics.report_pdf_enabled,
                &settings.metrics.report_pdf_path,
            );
            self.last_runs.write().expect("last-runs lock poisoned").weekly = Some(now);
            self.save_last_run_timestamp(SETTING_LAST_WEEKLY_RUN, now);
        }

        if settings.metrics.report_monthly_enabled
            && is_monthly_due(
                now,
                last_runs.monthly,
                settings.metrics.report_monthly_day,
                &settings.metrics.report_monthly_time,
            )
        {
            self.run_report(
                ReportPeriod::Monthly,
                now,
                settings.metrics.report_pdf_enabled,
                &settings.metrics.report_pdf_path,
            );
            self.last_runs.write().expect("last-runs lock poisoned").monthly = Some(now);
            self.save_last_run_timestamp(SETTING_LAST_MONTHLY_RUN, now);
        }
    }

    fn generate(
        &self,
        period: ReportPeriod,
        now: DateTime<Local>,
    ) -> Result<ReportData, DrivePulseError> {
        let repo = self.get_or_create_repo()?;
        let end = now.with_timezone(&Utc);
        let start = match period {
            ReportPeriod::Daily => end - chrono::Duration::days(1),
            ReportPeriod::Weekly => end - chrono::Duration::weeks(1),
            ReportPeriod::Monthly => end
                .checked_sub_months(chrono::Months::new(1))
                .unwrap_or(end),
        };
        reports::generator::generate(&repo, period, start, end)
    }

    fn run_report(
        &self,
        period: ReportPeriod,
        now: DateTime<Local>,
        pdf_enabled: bool,
        pdf_path: &str,
    ) {
        info!("Generating {} report...", period.as_str());

        let report = match self.generate(period, now) {
            Ok(report) => report,
            Err(err) => {
                error!("Failed to generate {} report: {err}", period.as_str());
                return;
            }
        };

        self.send_notification(&report);

        if pdf_enabled {
            let output_dir = if pdf_path.is_empty() {
                PathBuf::from("/opt/drivepulse/reports")
            } else {
                PathBuf::from(pdf_path)
            };
            let output_path = output_dir.join(pdf_filename(period, Utc::now()));
            match generate_pdf(&report, &output_path, VERSION) {
                Ok(()) => info!("PDF report saved to {}", output_path.display()),
                Err(err) => error!("Failed to generate PDF report: {err}"),
            }
        }

        info!("Completed {} report generation", period.as_str());
    }

    fn send_notification(&self, report: &ReportData) {
        let (subject, message) = format_text_report(report);
        let html = format_html_report(report);
        if let Err(err) = self.notifier.send(&subject, &message, Some(&html)) {
            error!("Failed to send report notification: {err}");
        }
    }
}

fn parse_time_of_day(time_str: &str) -> (u32, u32) {
    let Some((hour_str, minute_str)) = time_str.split_once(':') else {
        return (8, 0);
    };
    let hour: u32 = match hour_str.parse() {
        Ok(h) if h <= 23 => h,
        _ => return (8, 0),
    };
    let minute: u32 = match minute_str.parse() {
        Ok(m) if m <= 59 => m,
        _ => return (8, 0),
    };
    (hour, minute)
}

/// A daily report is due once the wall clock passes today's configured
/// hh:mm, unless it already ran today.
pub fn is_daily_due(
    now: DateTime<Local>,
    last_run: Option<DateTime<Local>>,
    time_str: &str,
) -> bool {
    let (hour, minute) = parse_time_of_day(time_str);
    let Some(scheduled_today) = Local
        .with_ymd_and_hms(now.year(), now.month(), now.day(), hour, minute, 0)
        .single()
    else {
        return false;
    };
    if now < scheduled_today {
        return false;
    }
    if let Some(last) = last_run {
        if last.year() == now.year() && last.ordinal() == now.ordinal() {
            return false;
        }
    }
    true
}

/// Weekly reports additionally require today's weekday to match
/// (0 = Sunday, matching the settings encoding).
pub fn is_weekly_due(
    now: DateTime<Local>,
    last_run: Option<DateTime<Local>>,
    day_of_week: i64,
    time_str: &str,
) -> bool {
    if now.weekday().num_days_from_sunday() as i64 != day_of_week {
        return false;
    }
    is_daily_due(now, last_run, time_str)
}

/// Monthly reports additionally require today's day-of-month to match.
pub fn is_monthly_due(
    now: DateTime<Local>,
    last_run: Option<DateTime<Local>>,
    day_of_month: i64,
    time_str: &str,
) -> bool {
    if now.day() as i64 != day_of_month {
        return false;
    }
    is_daily_due(now, last_run, time_str)
}
