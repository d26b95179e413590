//! The Event Log's own error type: wraps the storage-layer failures the
//! sqlx-backed repositories can raise and maps them onto the Port Layer's
//! `PortError` at the crate boundary (§4.6, §7 infrastructure errors).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("workflow '{0}' not found")]
    UnknownWorkflow(String),

    #[error("run '{0}' not found")]
    UnknownRun(String),
}

pub type Result<T> = std::result::Result<T, EventLogError>;

impl From<EventLogError> for ports::PortError {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::UnknownWorkflow(id) => ports::PortError::UnknownWorkflow(id),
            EventLogError::UnknownRun(id) => ports::PortError::UnknownRun(id),
            other => ports::PortError::StorageUnavailable(other.to_string()),
        }
    }
}
