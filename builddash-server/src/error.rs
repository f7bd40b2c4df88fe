//! Error types for builddash-server
//!
//! Every library operation returns [`DashError`]. The HTTP layer maps it to a
//! status code in [`crate::http::error`].

use thiserror::Error;

pub type Result<T, E = DashError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum DashError {
    /// Backend identifier is not one of the configured backends
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// Table is not visible in the backend's configured schema
    #[error("table '{table}' not found in backend '{backend}'")]
    UnknownTable { backend: String, table: String },

    /// Could not reach the backend (I/O, TLS, closed pool)
    #[error("backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Every pooled connection stayed busy past the acquire timeout
    #[error("connection pool for backend '{backend}' exhausted")]
    PoolExhausted { backend: String },

    /// The backend rejected the statement; carries the driver message verbatim
    #[error("{0}")]
    QueryFailed(String),

    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    #[error("layout with name '{0}' already exists")]
    DuplicateName(String),

    #[error("{0}")]
    Validation(String),

    /// Local layout store failure
    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashError {
    /// Classify a driver error raised while talking to an external backend.
    pub fn from_backend(backend: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::PoolExhausted {
                backend: backend.to_owned(),
            },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                Self::BackendUnavailable {
                    backend: backend.to_owned(),
                    reason: err.to_string(),
                }
            }
            sqlx::Error::Database(db) => Self::QueryFailed(db.message().to_owned()),
            other => Self::QueryFailed(other.to_string()),
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownBackend(_) => "unknown_backend",
            Self::UnknownTable { .. } => "unknown_table",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::QueryFailed(_) => "query_failed",
            Self::NotFound { .. } => "not_found",
            Self::DuplicateName(_) => "duplicate_name",
            Self::Validation(_) => "validation_error",
            Self::Storage(_) | Self::Config(_) | Self::Io(_) => "internal_error",
        }
    }
}
