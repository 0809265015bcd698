mod metrics;
mod repository;
mod schema;
mod settings;

pub use metrics::{DurationKey, MetricsStore, MEASUREMENT_PERFORMANCE, MEASUREMENT_SMART,
    MEASUREMENT_TEMPERATURE, MEASUREMENT_ZFS_POOL_METRICS};
pub use repository::Repository;

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use log::info;
use rusqlite::{Connection, OptionalExtension};

use crate::error::DrivePulseError;
use schema::{
    CREATE_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, UPGRADE_1_TO_2_SQL, UPGRADE_2_TO_3_SQL,
};

const DB_FILENAME: &str = "drivepulse.db";

/// The relational store: devices, pools, overrides and settings with ACID
/// semantics. The connection sits behind a mutex so one handle can be shared
/// across request handlers.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

impl Database {
    /// Open (or create) the database. With no explicit path the file lands in
    /// the project data directory.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self, DrivePulseError> {
        let db_path = match db_path {
            Some(path) => path,
            None => default_data_dir()?.join(DB_FILENAME),
        };

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database: {}", db_path.display());
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Mutex::new(conn),
            path: db_path.to_string_lossy().into_owned(),
        };

        db.ensure_schema()?;

        Ok(db)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn ensure_schema(&self) -> Result<(), DrivePulseError> {
        let conn = self.conn();

        let table_exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='meta'",
                [],
                |row| row.get::<_, i32>(0),
            )
            .map(|count| count > 0)
            .unwrap_or(false);

        if !table_exists {
            info!("Database is uninitialized - creating schema at version {CURRENT_SCHEMA_VERSION}");
            conn.execute_batch(CREATE_SCHEMA_SQL)?;
            drop(conn);
            settings::seed_default_settings(self)?;
            info!("Database successfully initialized");
            return Ok(());
        }

        let db_version_str: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let db_version_str = db_version_str
            .ok_or_else(|| DrivePulseError::Error("Schema version missing".to_string()))?;

        let mut db_version: u32 = db_version_str
            .parse()
            .map_err(|_| DrivePulseError::Error("Schema version mismatch".to_string()))?;

        loop {
            db_version = match db_version {
                CURRENT_SCHEMA_VERSION => break,
                1 => Self::upgrade_schema(&conn, db_version, UPGRADE_1_TO_2_SQL)?,
                2 => Self::upgrade_schema(&conn, db_version, UPGRADE_2_TO_3_SQL)?,
                _ => {
                    return Err(DrivePulseError::Error(
                        "No valid database update available".to_string(),
                    ))
                }
            }
        }

        Ok(())
    }

    fn upgrade_schema(
        conn: &Connection,
        current_version: u32,
        batch: &'static str,
    ) -> Result<u32, DrivePulseError> {
        info!(
            "Upgrading database schema {} => {}",
            current_version,
            current_version + 1
        );
        conn.execute_batch(batch)?;
        info!("Database successfully upgraded");

        Ok(current_version + 1)
    }
}

pub(crate) fn default_data_dir() -> Result<PathBuf, DrivePulseError> {
    ProjectDirs::from("", "", "drivepulse")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .ok_or_else(|| DrivePulseError::Error("Could not determine data directory".to_string()))
}
