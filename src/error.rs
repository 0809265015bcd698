use thiserror::Error;

/// Crate-wide error type. Variants map onto the recovery policies used by the
/// web layer and the background monitors: validation errors become 400
/// responses, storage errors become 500s (or a handle reset inside a
/// monitor), and configuration errors are fatal at startup only.
#[derive(Error, Debug)]
pub enum DrivePulseError {
    #[error("{0}")]
    Error(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("notification error: {0}")]
    NotificationError(String),

    #[error("shutting down")]
    ShuttingDown,
}

impl DrivePulseError {
    /// True when the error should be treated as a transient storage failure:
    /// monitors reset their storage handle and retry on the next tick.
    pub fn is_transient_storage(&self) -> bool {
        matches!(
            self,
            DrivePulseError::DatabaseError(_) | DrivePulseError::IoError(_)
        )
    }
}
