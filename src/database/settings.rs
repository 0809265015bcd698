use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use rusqlite::params;

use crate::database::Database;
use crate::error::DrivePulseError;
use crate::models::{MetricsSettings, Settings};

// Process-wide read-through settings cache, keyed by database path. The lock
// is global because multiple repository handles (web layer plus each
// monitor) share one logical settings singleton; writes invalidate.
static SETTINGS_CACHE: Lazy<Mutex<HashMap<String, Settings>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

enum SettingValue {
    Numeric(i64),
    Text(String),
    Flag(bool),
}

fn settings_to_entries(settings: &Settings) -> Vec<(&'static str, SettingValue)> {
    let m = &settings.metrics;
    vec![
        ("theme", SettingValue::Text(settings.theme.clone())),
        (
            "dashboard_display",
            SettingValue::Text(settings.dashboard_display.clone()),
        ),
        (
            "dashboard_sort",
            SettingValue::Text(settings.dashboard_sort.clone()),
        ),
        (
            "temperature_unit",
            SettingValue::Text(settings.temperature_unit.clone()),
        ),
        (
            "file_size_si_units",
            SettingValue::Flag(settings.file_size_si_units),
        ),
        ("metrics.notify_level", SettingValue::Numeric(m.notify_level)),
        (
            "metrics.status_filter_attributes",
            SettingValue::Numeric(m.status_filter_attributes),
        ),
        (
            "metrics.status_threshold",
            SettingValue::Numeric(m.status_threshold),
        ),
        (
            "metrics.repeat_notifications",
            SettingValue::Flag(m.repeat_notifications),
        ),
        (
            "metrics.notify_on_missed_ping",
            SettingValue::Flag(m.notify_on_missed_ping),
        ),
        (
            "metrics.missed_ping_timeout_minutes",
            SettingValue::Numeric(m.missed_ping_timeout_minutes),
        ),
        (
            "metrics.missed_ping_check_interval_mins",
            SettingValue::Numeric(m.missed_ping_check_interval_mins),
        ),
        (
            "metrics.heartbeat_enabled",
            SettingValue::Flag(m.heartbeat_enabled),
        ),
        (
            "metrics.heartbeat_interval_hours",
            SettingValue::Numeric(m.heartbeat_interval_hours),
        ),
        ("metrics.report_enabled", SettingValue::Flag(m.report_enabled)),
        (
            "metrics.report_daily_enabled",
            SettingValue::Flag(m.report_daily_enabled),
        ),
        (
            "metrics.report_daily_time",
            SettingValue::Text(m.report_daily_time.clone()),
        ),
        (
            "metrics.report_weekly_enabled",
            SettingValue::Flag(m.report_weekly_enabled),
        ),
        (
            "metrics.report_weekly_day",
            SettingValue::Numeric(m.report_weekly_day),
        ),
        (
            "metrics.report_weekly_time",
            SettingValue::Text(m.report_weekly_time.clone()),
        ),
        (
            "metrics.report_monthly_enabled",
            SettingValue::Flag(m.report_monthly_enabled),
        ),
        (
            "metrics.report_monthly_day",
            SettingValue::Numeric(m.report_monthly_day),
        ),
        (
            "metrics.report_monthly_time",
            SettingValue::Text(m.report_monthly_time.clone()),
        ),
        (
            "metrics.report_pdf_enabled",
            SettingValue::Flag(m.report_pdf_enabled),
        ),
        (
            "metrics.report_pdf_path",
            SettingValue::Text(m.report_pdf_path.clone()),
        ),
    ]
}

fn apply_entry(settings: &mut Settings, key: &str, numeric: i64, text: &str, flag: bool) {
    let m: &mut MetricsSettings = &mut settings.metrics;
    match key {
        "theme" => settings.theme = text.to_string(),
        "dashboard_display" => settings.dashboard_display = text.to_string(),
        "dashboard_sort" => settings.dashboard_sort = text.to_string(),
        "temperature_unit" => settings.temperature_unit = text.to_string(),
        "file_size_si_units" => settings.file_size_si_units = flag,
        "metrics.notify_level" => m.notify_level = numeric,
        "metrics.status_filter_attributes" => m.status_filter_attributes = numeric,
        "metrics.status_threshold" => m.status_threshold = numeric,
        "metrics.repeat_notifications" => m.repeat_notifications = flag,
        "metrics.notify_on_missed_ping" => m.notify_on_missed_ping = flag,
        "metrics.missed_ping_timeout_minutes" => m.missed_ping_timeout_minutes = numeric,
        "metrics.missed_ping_check_interval_mins" => m.missed_ping_check_interval_mins = numeric,
        "metrics.heartbeat_enabled" => m.heartbeat_enabled = flag,
        "metrics.heartbeat_interval_hours" => m.heartbeat_interval_hours = numeric,
        "metrics.report_enabled" => m.report_enabled = flag,
        "metrics.report_daily_enabled" => m.report_daily_enabled = flag,
        "metrics.report_daily_time" => m.report_daily_time = text.to_string(),
        "metrics.report_weekly_enabled" => m.report_weekly_enabled = flag,
        "metrics.report_weekly_day" => m.report_weekly_day = numeric,
        "metrics.report_weekly_time" => m.report_weekly_time = text.to_string(),
        "metrics.report_monthly_enabled" => m.report_monthly_enabled = flag,
        "metrics.report_monthly_day" => m.report_monthly_day = numeric,
        "metrics.report_monthly_time" => m.report_monthly_time = text.to_string(),
        "metrics.report_pdf_enabled" => m.report_pdf_enabled = flag,
        "metrics.report_pdf_path" => m.report_pdf_path = text.to_string(),
        _ => {}
    }
}

/// Seed the `setting_entries` table with defaults on first schema creation.
pub(super) fn seed_default_settings(db: &Database) -> Result<(), DrivePulseError> {
    write_settings_rows(db, &Settings::default())
}

fn write_settings_rows(db: &Database, settings: &Settings) -> Result<(), DrivePulseError> {
    let mut conn = db.conn();
    let tx = conn.transaction()?;
    for (key, value) in settings_to_entries(settings) {
        let (data_type, numeric, text, flag) = match value {
            SettingValue::Numeric(n) => ("numeric", n, String::new(), false),
            SettingValue::Text(s) => ("string", 0, s, false),
            SettingValue::Flag(b) => ("bool", 0, String::new(), b),
        };
        tx.execute(
            "INSERT INTO setting_entries
                 (setting_key_name, setting_data_type, setting_value_numeric,
                  setting_value_string, setting_value_bool)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(setting_key_name) DO UPDATE SET
                 setting_data_type = excluded.setting_data_type,
                 setting_value_numeric = excluded.setting_value_numeric,
                 setting_value_string = excluded.setting_value_string,
                 setting_value_bool = excluded.setting_value_bool",
            params![key, data_type, numeric, text, flag],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Load settings through the process-wide cache. A database read only
/// happens on a cold cache or after a save invalidated it.
pub fn load_settings(db: &Database) -> Result<Settings, DrivePulseError> {
    let mut cache = SETTINGS_CACHE.lock().expect("settings mutex poisoned");

    if let Some(cached) = cache.get(db.path()) {
        return Ok(cached.clone());
    }

    let mut settings = Settings::default();
    {
        let conn = db.conn();
        let mut stmt = conn.prepare(
            "SELECT setting_key_name, setting_value_numeric, setting_value_string, setting_value_bool
             FROM setting_entries",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;
        for row in rows {
            let (key, numeric, text, flag) = row?;
            apply_entry(&mut settings, &key, numeric, &text, flag);
        }
    }

    cache.insert(db.path().to_string(), settings.clone());
    Ok(settings)
}

/// Persist settings and invalidate the cache entry.
pub fn save_settings(db: &Database, settings: &Settings) -> Result<(), DrivePulseError> {
    let mut cache = SETTINGS_CACHE.lock().expect("settings mutex poisoned");
    write_settings_rows(db, settings)?;
    cache.remove(db.path());
    Ok(())
}

/// Read a single settings key as a string. Used for the scheduler's
/// last-run timestamps.
pub fn get_setting_value(db: &Database, key: &str) -> Result<String, DrivePulseError> {
    let conn = db.conn();
    let row: Option<(String, i64, String, bool)> = conn
        .query_row(
            "SELECT setting_data_type, setting_value_numeric, setting_value_string, setting_value_bool
             FROM setting_entries WHERE setting_key_name = ?1",
            [key],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                ))
            },
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    match row {
        None => Ok(String::new()),
        Some((data_type, numeric, text, flag)) => Ok(match data_type.as_str() {
            "numeric" => numeric.to_string(),
            "bool" => flag.to_string(),
            _ => text,
        }),
    }
}

/// Upsert a single string setting key.
pub fn set_setting_value(db: &Database, key: &str, value: &str) -> Result<(), DrivePulseError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO setting_entries (setting_key_name, setting_data_type, setting_value_string)
         VALUES (?1, 'string', ?2)
         ON CONFLICT(setting_key_name) DO UPDATE SET
             setting_data_type = 'string',
             setting_value_string = excluded.setting_value_string",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db(temp_dir: &TempDir) -> Database {
        Database::new(Some(temp_dir.path().join("drivepulse.db"))).expect("db should open")
    }

    #[test]
    fn test_load_settings_returns_seeded_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let db = test_db(&temp_dir);
        let settings = load_settings(&db).unwrap();
        assert_eq!(settings.metrics.status_threshold, 3);
        assert_eq!(settings.metrics.missed_ping_timeout_minutes, 60);
    }

    #[test]
    fn test_save_and_reload_settings() {
        let temp_dir = TempDir::new().unwrap();
        let db = test_db(&temp_dir);

        let mut settings = load_settings(&db).unwrap();
        settings.metrics.notify_on_missed_ping = true;
        settings.metrics.missed_ping_timeout_minutes = 90;
        settings.metrics.report_daily_time = "07:30".to_string();
        save_settings(&db, &settings).unwrap();

        let reloaded = load_settings(&db).unwrap();
        assert!(reloaded.metrics.notify_on_missed_ping);
        assert_eq!(reloaded.metrics.missed_ping_timeout_minutes, 90);
        assert_eq!(reloaded.metrics.report_daily_time, "07:30");
    }

    #[test]
    fn test_setting_value_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let db = test_db(&temp_dir);

        assert_eq!(get_setting_value(&db, "metrics.report_last_daily_run").unwrap(), "");
        set_setting_value(&db, "metrics.report_last_daily_run", "2026-02-17T08:00:00Z").unwrap();
        assert_eq!(
            get_setting_value(&db, "metrics.report_last_daily_run").unwrap(),
            "2026-02-17T08:00:00Z"
        );

        set_setting_value(&db, "metrics.report_last_daily_run", "2026-02-18T08:00:00Z").unwrap();
        assert_eq!(
            get_setting_value(&db, "metrics.report_last_daily_run").unwrap(),
            "2026-02-18T08:00:00Z"
        );
    }

    #[test]
    fn test_settings_cache_shared_across_handles() {
        let temp_dir = TempDir::new().unwrap();
        let db_a = test_db(&temp_dir);
        let db_b = Database::new(Some(temp_dir.path().join("drivepulse.db"))).unwrap();

        let mut settings = load_settings(&db_a).unwrap();
        settings.metrics.heartbeat_enabled = true;
        save_settings(&db_a, &settings).unwrap();

        // second handle on the same database sees the write immediately
        let seen = load_settings(&db_b).unwrap();
        assert!(seen.metrics.heartbeat_enabled);
    }

    #[test]
    fn test_settings_concurrent_load_save() {
        let temp_dir = TempDir::new().unwrap();
        let db = std::sync::Arc::new(test_db(&temp_dir));

        let mut handles = Vec::new();
        for i in 0..8 {
            let db = std::sync::Arc::clone(&db);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    if i % 2 == 0 {
                        let mut settings = load_settings(&db).unwrap();
                        settings.metrics.missed_ping_timeout_minutes = 60 + i;
                        save_settings(&db, &settings).unwrap();
                    } else {
                        let _ = load_settings(&db).unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let settings = load_settings(&db).unwrap();
        assert!(settings.metrics.missed_ping_timeout_minutes >= 60);
    }
}
