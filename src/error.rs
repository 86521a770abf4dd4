//! Application error types for the approval workflow.
//!
//! Every error carries a stable kind plus a human-readable reason. Errors
//! are serializable so the surrounding service layer can hand them to its
//! own transport unchanged.

use serde::Serialize;
use thiserror::Error;

/// Stable error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    InvalidState,
    InvalidInput,
    Busy,
    Database,
    Internal,
}

/// Application-level errors returned by the workflow engine.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// Requested resource not found.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Actor lacks rights to the operation.
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Duplicate response, duplicate re-request, or non-unique approver.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Operation attempted against a terminal or otherwise ineligible request.
    #[error("Invalid state: {message}")]
    InvalidState {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Storage contention. Retried internally; surfaced as `Conflict`
    /// once retries are exhausted.
    #[error("Storage busy: {message}")]
    Busy { message: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a database error with optional operation context.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a database error with operation context.
    pub fn database_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
            status: None,
        }
    }

    /// Create an invalid state error carrying the offending status.
    pub fn invalid_state_with_status(message: impl Into<String>, status: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
            status: Some(status.into()),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a storage contention error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Database { .. } => ErrorKind::Database,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if the operation may succeed when retried as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

// Conversions from common error types

/// SQLite primary result codes for SQLITE_BUSY and SQLITE_LOCKED.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return Self::conflict(db_err.message().to_string());
            }

            // Extended result codes keep the primary code in the low byte.
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            if matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
                return Self::busy(db_err.message().to_string());
            }
        }

        if matches!(err, sqlx::Error::PoolTimedOut) {
            return Self::busy("Timed out acquiring a database connection");
        }

        Self::database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        match err {
            crate::db::DbError::Sqlite(e) => e.into(),
            other => Self::database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = AppError::database("connection failed");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Database\""));
        assert!(json.contains("connection failed"));
    }

    #[test]
    fn test_not_found_with_id() {
        let err = AppError::not_found_with_id("Request", "123");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"resource\":\"Request\""));
        assert!(json.contains("\"id\":\"123\""));
    }

    #[test]
    fn test_invalid_state_carries_status() {
        let err = AppError::invalid_state_with_status("request is resolved", "approved");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"InvalidState\""));
        assert!(json.contains("\"status\":\"approved\""));
    }

    #[test]
    fn test_optional_fields_not_serialized() {
        let err = AppError::invalid_input("empty approver set");
        let json = serde_json::to_string(&err).unwrap();
        // field is None, so should not appear
        assert!(!json.contains("field"));
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(AppError::forbidden("x").kind(), ErrorKind::Forbidden);
        assert_eq!(AppError::conflict("x").kind(), ErrorKind::Conflict);
        assert_eq!(AppError::invalid_state("x").kind(), ErrorKind::InvalidState);
        assert_eq!(AppError::not_found("Request").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(AppError::busy("database is locked").is_retryable());
        assert!(!AppError::conflict("already responded").is_retryable());
        assert!(!AppError::database("disk I/O error").is_retryable());
    }

    #[test]
    fn test_display_impl() {
        let err = AppError::forbidden("member 7 is not an approver");
        assert_eq!(format!("{}", err), "Forbidden: member 7 is not an approver");
    }
}
