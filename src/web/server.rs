use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use log::info;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::database::Repository;
use crate::error::DrivePulseError;
use crate::monitors::MissedPingMonitor;
use crate::notify::NotificationSender;
use crate::reports::ReportScheduler;

use super::handlers;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub notifier: Arc<dyn NotificationSender>,
    pub missed_ping_monitor: Arc<MissedPingMonitor>,
    pub report_scheduler: Arc<ReportScheduler>,
}

pub struct WebServer {
    host: String,
    port: u16,
}

impl WebServer {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    pub async fn start(&self, state: AppState) -> Result<(), DrivePulseError> {
        let app = create_router(state);

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| DrivePulseError::ConfigError(format!("invalid listen address: {e}")))?;

        info!("DrivePulse server listening on http://{addr}");

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DrivePulseError::Error(format!("failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DrivePulseError::Error(format!("server error: {e}")))?;

        Ok(())
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // collector ingest endpoints
        .route("/api/devices/register", post(handlers::devices::register_devices))
        .route("/api/device/{wwn}/smart", post(handlers::smart::upload_device_metrics))
        .route(
            "/api/device/{wwn}/performance",
            post(handlers::performance::upload_device_performance)
                .get(handlers::performance::get_device_performance),
        )
        // device management
        .route("/api/summary", get(handlers::devices::get_summary))
        .route(
            "/api/device/{wwn}/details",
            get(handlers::devices::get_device_details),
        )
        .route("/api/device/{wwn}", delete(handlers::devices::delete_device))
        .route(
            "/api/device/{wwn}/archived",
            post(handlers::devices::update_device_archived),
        )
        .route(
            "/api/device/{wwn}/muted",
            post(handlers::devices::update_device_muted),
        )
        .route(
            "/api/device/{wwn}/label",
            post(handlers::devices::update_device_label),
        )
        .route(
            "/api/device/{wwn}/smart-display-mode",
            post(handlers::devices::update_device_smart_display_mode),
        )
        // attribute overrides
        .route(
            "/api/overrides",
            get(handlers::overrides::list_overrides).post(handlers::overrides::save_override),
        )
        .route(
            "/api/overrides/{id}",
            delete(handlers::overrides::delete_override),
        )
        // settings
        .route(
            "/api/settings",
            get(handlers::settings::get_settings).post(handlers::settings::save_settings),
        )
        // zfs pools
        .route("/api/zfs/register", post(handlers::zfs::register_pools))
        .route("/api/zfs/summary", get(handlers::zfs::get_pools_summary))
        .route("/api/zfs/{guid}/metrics", post(handlers::zfs::upload_pool_metrics))
        .route("/api/zfs/{guid}", delete(handlers::zfs::delete_pool))
        // reports
        .route("/api/reports/test", post(handlers::reports::send_test_report))
        .route("/api/reports/generate", get(handlers::reports::generate_report))
        // workload
        .route("/api/workload", get(handlers::workload::get_workload_insights))
        // monitor diagnostics
        .route(
            "/api/monitors/missed-ping/status",
            get(handlers::monitors::get_missed_ping_status),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({"success": true, "status": "ok"})))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
