use std::fmt;

use thiserror::Error;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Storage,
    Notifier,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Storage => f.write_str("storage"),
            Dependency::Notifier => f.write_str("notifier"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{dependency} failure: {message}")]
    DependencyFailure {
        dependency: Dependency,
        message: String,
    },
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::DependencyFailure {
            dependency: Dependency::Storage,
            message: message.into(),
        }
    }

    pub fn notifier(message: impl Into<String>) -> Self {
        LedgerError::DependencyFailure {
            dependency: Dependency::Notifier,
            message: message.into(),
        }
    }

    /// Stable machine-readable code carried on the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::InvalidArgument(_) => "bad_params",
            LedgerError::Forbidden(_) => "forbidden",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::DependencyFailure {
                dependency: Dependency::Storage,
                ..
            } => "db_failed",
            LedgerError::DependencyFailure {
                dependency: Dependency::Notifier,
                ..
            } => "notify_failed",
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::storage(e.to_string())
    }
}
