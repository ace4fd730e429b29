//! Error types for load execution

use thiserror::Error;

use crate::connection::Backend;

/// Database errors, classified by what they mean for the worker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    /// The connection can no longer run statements
    #[error("Cannot run statements on connection: {0}")]
    Statement(String),

    /// A single call failed; the connection is still usable
    #[error("Database operation failed: {0}")]
    Operation(String),

    /// A new connection could not be opened
    #[error("Cannot connect to database: {0}")]
    Connect(String),
}

impl DbError {
    /// Whether the worker owning the connection should stop
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, DbError::Statement(_) | DbError::Connect(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbError::Statement(err.to_string()),
            other => DbError::Operation(other.to_string()),
        }
    }
}

/// Errors that prevent a run from starting
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Unknown workload: {0}")]
    UnknownWorkload(String),

    #[error("Database check failed: {0}")]
    DatabaseCheck(DbError),

    #[error("Schema preparation failed: {0}")]
    Schema(DbError),

    #[error("Workload {workload} cannot run on {backend}")]
    UnsupportedBackend { workload: &'static str, backend: Backend },

    #[error("Performance source unavailable: {0}")]
    PerfSource(#[from] dots_perf::PerfError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] dots_config::ConfigError),
}
