mod cli;
mod collector;
mod config;
mod database;
mod error;
mod measurements;
mod models;
mod monitors;
mod notify;
mod overrides;
mod reports;
mod status;
mod thresholds;
mod validate;
mod web;
mod workload;
mod zfs;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use directories::ProjectDirs;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};
use log::{error, info, warn};

use cli::{Cli, Command};
use config::{Config, STARTUP_RETRY_ATTEMPTS, STARTUP_RETRY_DELAY_SECS};
use database::Repository;
use error::DrivePulseError;
use monitors::{HeartbeatMonitor, MissedPingMonitor};
use notify::LogNotifier;
use reports::pdf::{generate_pdf, pdf_filename};
use reports::text::format_text_report;
use reports::{ReportPeriod, ReportScheduler};
use web::{AppState, WebServer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("drivepulse: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = setup_logging(&config) {
        eprintln!("drivepulse: could not initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    info!("drivepulse v{VERSION} starting at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));

    let result = match cli.command {
        Command::Serve => serve(config).await,
        Command::Report { period, pdf_dir } => run_report(config, &period, pdf_dir).await,
    };

    match result {
        Ok(()) => {
            info!("drivepulse shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("drivepulse exited with error: {err}");
            eprintln!("drivepulse: {err}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(config: &Config) -> Result<(), DrivePulseError> {
    let spec = format!("drivepulse={}", config.logging.level);

    let log_dir = ProjectDirs::from("", "", "drivepulse")
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .ok_or_else(|| DrivePulseError::ConfigError("could not determine log directory".to_string()))?;

    Logger::try_with_str(&spec)
        .map_err(|e| DrivePulseError::ConfigError(format!("invalid log level: {e}")))?
        .log_to_file(FileSpec::default().directory(log_dir))
        .duplicate_to_stderr(Duplicate::Info)
        .rotate(
            Criterion::Size(10_000_000),
            Naming::TimestampsDirect,
            Cleanup::KeepLogFiles(10),
        )
        .start()
        .map_err(|e| DrivePulseError::ConfigError(format!("could not start logger: {e}")))?;

    Ok(())
}

/// Connect to the storage plane, retrying on a bounded schedule. An
/// unreachable store at startup is fatal only after the retry budget is
/// exhausted; once running, storage errors surface per-request instead.
async fn connect_with_retry(config: Arc<Config>) -> Result<Arc<Repository>, DrivePulseError> {
    let mut attempt = 0;
    loop {
        match Repository::connect(Arc::clone(&config)) {
            Ok(repo) => return Ok(Arc::new(repo)),
            Err(err) => {
                attempt += 1;
                if attempt >= STARTUP_RETRY_ATTEMPTS {
                    return Err(DrivePulseError::ConfigError(format!(
                        "storage plane unreachable after {attempt} attempts: {err}"
                    )));
                }
                warn!(
                    "Storage plane init failed (attempt {attempt}/{STARTUP_RETRY_ATTEMPTS}): {err}, retrying in {STARTUP_RETRY_DELAY_SECS}s"
                );
                tokio::time::sleep(Duration::from_secs(STARTUP_RETRY_DELAY_SECS)).await;
            }
        }
    }
}

async fn serve(config: Arc<Config>) -> Result<(), DrivePulseError> {
    let repo = connect_with_retry(Arc::clone(&config)).await?;
    let notifier: Arc<dyn notify::NotificationSender> =
        Arc::new(LogNotifier::new(config.notify.urls.clone()));

    let missed_ping_monitor = Arc::new(MissedPingMonitor::new(
        Arc::clone(&config),
        Arc::clone(&notifier),
    ));
    let heartbeat_monitor = Arc::new(HeartbeatMonitor::new(
        Arc::clone(&config),
        Arc::clone(&notifier),
    ));
    let report_scheduler = Arc::new(ReportScheduler::new(
        Arc::clone(&config),
        Arc::clone(&notifier),
    ));

    missed_ping_monitor.start();
    heartbeat_monitor.start();
    report_scheduler.start();

    let state = AppState {
        repo,
        config: Arc::clone(&config),
        notifier,
        missed_ping_monitor: Arc::clone(&missed_ping_monitor),
        report_scheduler: Arc::clone(&report_scheduler),
    };

    let server = WebServer::new(config.web.host.clone(), config.web.port);
    let serve_result = server.start(state).await;

    // graceful shutdown: stop every monitor and wait for its loop to drain
    missed_ping_monitor.stop().await;
    heartbeat_monitor.stop().await;
    report_scheduler.stop().await;

    serve_result
}

async fn run_report(
    config: Arc<Config>,
    period: &str,
    pdf_dir: Option<std::path::PathBuf>,
) -> Result<(), DrivePulseError> {
    let period = ReportPeriod::parse(period)
        .ok_or_else(|| DrivePulseError::ValidationError(format!("invalid period: {period}")))?;

    let repo = connect_with_retry(Arc::clone(&config)).await?;
    let now = Utc::now();
    let start = match period {
        ReportPeriod::Daily => now - chrono::Duration::days(1),
        ReportPeriod::Weekly => now - chrono::Duration::weeks(1),
        ReportPeriod::Monthly => now
            .checked_sub_months(chrono::Months::new(1))
            .unwrap_or(now),
    };

    let report = reports::generator::generate(&repo, period, start, now)?;
    let (subject, message) = format_text_report(&report);
    println!("{subject}\n\n{message}");

    if let Some(dir) = pdf_dir {
        let output_path = dir.join(pdf_filename(period, now));
        generate_pdf(&report, &output_path, VERSION)?;
        println!("\nPDF written to {}", output_path.display());
    }

    Ok(())
}
