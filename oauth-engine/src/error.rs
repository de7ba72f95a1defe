use log::error;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("database operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Normalises `RowNotFound` into [`StoreError::NotFound`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Database(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Coarse classification of an [`OAuthError`], used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code rendered in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Internal => "internal_error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("invalid scopes: {}", .0.join(" "))]
    InvalidScopes(Vec<String>),

    #[error("internal error during {operation}")]
    Internal { operation: String, trace_id: String },
}

impl OAuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OAuthError::Validation(_) => ErrorKind::Validation,
            OAuthError::NotFound(_) => ErrorKind::NotFound,
            OAuthError::Forbidden(_) | OAuthError::InvalidScopes(_) => ErrorKind::Forbidden,
            OAuthError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        OAuthError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        OAuthError::Forbidden(message.into())
    }

    /// Builds an internal error and logs the underlying cause under a fresh trace id.
    /// The cause itself never leaves the process.
    pub fn internal(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        let operation = operation.into();
        let trace_id = uuid::Uuid::new_v4().to_string();
        error!("[{trace_id}] {operation} failed: {cause}");
        OAuthError::Internal {
            operation,
            trace_id,
        }
    }

    /// Classifies a store failure: `NotFound` keeps its meaning, anything else is internal.
    pub(crate) fn from_store(operation: &str, entity: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound => OAuthError::NotFound(entity.to_string()),
            other => OAuthError::internal(operation, other),
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        match self {
            OAuthError::Internal { trace_id, .. } => Some(trace_id),
            _ => None,
        }
    }
}
