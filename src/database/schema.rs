// Relational schema, versioned and forward-only. The `meta` table records the
// schema version; `Database::ensure_schema` walks the upgrade chain until the
// stored version reaches CURRENT_SCHEMA_VERSION.

pub const CURRENT_SCHEMA_VERSION: u32 = 3;

pub const CREATE_SCHEMA_SQL: &str = r#"
BEGIN;

CREATE TABLE meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
INSERT INTO meta (key, value) VALUES ('schema_version', '3');

CREATE TABLE devices (
    wwn TEXT PRIMARY KEY,
    host_id TEXT NOT NULL DEFAULT '',
    device_name TEXT NOT NULL DEFAULT '',
    manufacturer TEXT NOT NULL DEFAULT '',
    model_name TEXT NOT NULL DEFAULT '',
    serial_number TEXT NOT NULL DEFAULT '',
    firmware TEXT NOT NULL DEFAULT '',
    device_protocol TEXT NOT NULL DEFAULT '',
    device_type TEXT NOT NULL DEFAULT '',
    capacity INTEGER NOT NULL DEFAULT 0,
    label TEXT NOT NULL DEFAULT '',
    archived INTEGER NOT NULL DEFAULT 0,
    muted INTEGER NOT NULL DEFAULT 0,
    smart_display_mode TEXT NOT NULL DEFAULT 'scrutiny',
    device_status INTEGER NOT NULL DEFAULT 0,
    has_forced_failure INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE zfs_pools (
    guid TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    health TEXT NOT NULL DEFAULT '',
    capacity_percent REAL NOT NULL DEFAULT 0,
    total_read_errors INTEGER NOT NULL DEFAULT 0,
    total_write_errors INTEGER NOT NULL DEFAULT 0,
    total_checksum_errors INTEGER NOT NULL DEFAULT 0,
    label TEXT NOT NULL DEFAULT '',
    archived INTEGER NOT NULL DEFAULT 0,
    muted INTEGER NOT NULL DEFAULT 0,
    scrub_state TEXT NOT NULL DEFAULT '',
    scrub_start_time INTEGER,
    scrub_end_time INTEGER,
    scrub_percent_complete REAL NOT NULL DEFAULT 0,
    scrub_issued_bytes INTEGER NOT NULL DEFAULT 0,
    scrub_errors_count INTEGER NOT NULL DEFAULT 0,
    scrub_duration_seconds INTEGER,
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE attribute_overrides (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    protocol TEXT NOT NULL,
    attribute_id TEXT NOT NULL,
    wwn TEXT NOT NULL DEFAULT '',
    action TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT '',
    warn_above INTEGER,
    fail_above INTEGER,
    source TEXT NOT NULL DEFAULT 'ui'
);
CREATE INDEX idx_override_lookup ON attribute_overrides (protocol, attribute_id, wwn);

CREATE TABLE setting_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    setting_key_name TEXT NOT NULL UNIQUE,
    setting_key_description TEXT NOT NULL DEFAULT '',
    setting_data_type TEXT NOT NULL,
    setting_value_numeric INTEGER NOT NULL DEFAULT 0,
    setting_value_string TEXT NOT NULL DEFAULT '',
    setting_value_bool INTEGER NOT NULL DEFAULT 0
);

COMMIT;
"#;

// v1 -> v2: attribute overrides arrive (UI-editable rules with provenance).
pub const UPGRADE_1_TO_2_SQL: &str = r#"
BEGIN;

CREATE TABLE attribute_overrides (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    protocol TEXT NOT NULL,
    attribute_id TEXT NOT NULL,
    wwn TEXT NOT NULL DEFAULT '',
    action TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT '',
    warn_above INTEGER,
    fail_above INTEGER,
    source TEXT NOT NULL DEFAULT 'ui'
);
CREATE INDEX idx_override_lookup ON attribute_overrides (protocol, attribute_id, wwn);

UPDATE meta SET value = '2' WHERE key = 'schema_version';

COMMIT;
"#;

// v2 -> v3: per-device display mode and the forced-failure flag.
pub const UPGRADE_2_TO_3_SQL: &str = r#"
BEGIN;

ALTER TABLE devices ADD COLUMN smart_display_mode TEXT NOT NULL DEFAULT 'scrutiny';
ALTER TABLE devices ADD COLUMN has_forced_failure INTEGER NOT NULL DEFAULT 0;

UPDATE meta SET value = '3' WHERE key = 'schema_version';

COMMIT;
"#;

// The time-series store keeps one table per retention bucket. Writes are
// idempotent by (measurement, tag_id, ts, profile); a device delete fans out
// to every bucket.
pub const METRICS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS metrics_raw (
    measurement TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    protocol TEXT NOT NULL DEFAULT '',
    profile TEXT NOT NULL DEFAULT '',
    ts INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    fields TEXT NOT NULL,
    PRIMARY KEY (measurement, tag_id, ts, profile)
);
CREATE TABLE IF NOT EXISTS metrics_weekly (
    measurement TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    protocol TEXT NOT NULL DEFAULT '',
    profile TEXT NOT NULL DEFAULT '',
    ts INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    fields TEXT NOT NULL,
    PRIMARY KEY (measurement, tag_id, ts, profile)
);
CREATE TABLE IF NOT EXISTS metrics_monthly (
    measurement TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    protocol TEXT NOT NULL DEFAULT '',
    profile TEXT NOT NULL DEFAULT '',
    ts INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    fields TEXT NOT NULL,
    PRIMARY KEY (measurement, tag_id, ts, profile)
);
CREATE TABLE IF NOT EXISTS metrics_yearly (
    measurement TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    protocol TEXT NOT NULL DEFAULT '',
    profile TEXT NOT NULL DEFAULT '',
    ts INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    fields TEXT NOT NULL,
    PRIMARY KEY (measurement, tag_id, ts, profile)
);
"#;
