//! Error types for pgdao

use serde::Serialize;
use thiserror::Error;

/// Result type alias for pgdao operations
pub type DaoResult<T> = Result<T, DaoError>;

/// Error code reported when a search matched no rows.
pub const CODE_NO_DATA: i32 = 7;
/// Error code reported for malformed conditions.
pub const CODE_VALIDATION: i32 = 8;
/// Error code reported for engine/driver failures.
pub const CODE_INFRASTRUCTURE: i32 = 9;
/// Error code reported when a unique lookup matched more than one row.
pub const CODE_CONFLICT: i32 = 10;

/// Coarse classification of a [`DaoError`], for callers that match on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Infrastructure,
}

impl ErrorKind {
    /// The structured error code used in [`ErrorPayload`].
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Validation => CODE_VALIDATION,
            ErrorKind::NotFound => CODE_NO_DATA,
            ErrorKind::Conflict => CODE_CONFLICT,
            ErrorKind::Infrastructure => CODE_INFRASTRUCTURE,
        }
    }
}

/// Error types for DAO operations
#[derive(Debug, Error)]
pub enum DaoError {
    /// Malformed condition: unsupported operator shape, missing value, bad date
    /// literal, or unknown field name.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An expected row is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique-result query returned more than one row, or a unique constraint fired
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Connectivity or driver level failure
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl DaoError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an infrastructure error
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure(message.into())
    }

    /// Error for a unique lookup that matched `got` rows.
    pub fn multiple_results(got: usize) -> Self {
        Self::Conflict(format!("Expected at most 1 row, got {got}"))
    }

    /// Combine this error with a failed rollback.
    ///
    /// The result is always [`DaoError::Infrastructure`]: the transaction state
    /// is unknown, whatever the original failure was.
    pub fn with_rollback_failure(self, rollback_err: &DaoError) -> Self {
        Self::Infrastructure(format!("{self} (rollback failed: {rollback_err})"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if this is an infrastructure error
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }

    /// Translate a tokio_postgres error into the DAO taxonomy.
    ///
    /// Unique violations (`23505`) become [`DaoError::Conflict`]; everything else is
    /// reported as [`DaoError::Infrastructure`] with the engine message preserved.
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            if db_err.code().code() == "23505" {
                return Self::Conflict(format!("{constraint}: {message}"));
            }
            return Self::Infrastructure(format!("{}: {}", db_err.code().code(), message));
        }
        Self::Infrastructure(err.to_string())
    }

    /// Build the structured payload handed to serialization collaborators.
    pub fn to_payload(&self) -> ErrorPayload {
        let description = match self {
            Self::Validation(m) => format!("{m} check the condition column names"),
            Self::NotFound(m) | Self::Conflict(m) | Self::Infrastructure(m) => m.clone(),
        };
        ErrorPayload::new(self.kind().code(), description)
    }
}

impl From<tokio_postgres::Error> for DaoError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::from_db_error(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for DaoError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Infrastructure(format!("pool: {err}"))
    }
}

impl From<serde_json::Error> for DaoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Infrastructure(format!("serialization: {err}"))
    }
}

/// Structured error record: `{ "error_code": 7, "error_description": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub error_code: i32,
    pub error_description: String,
}

impl ErrorPayload {
    pub fn new(error_code: i32, error_description: impl Into<String>) -> Self {
        Self {
            error_code,
            error_description: error_description.into(),
        }
    }

    /// Payload for a search that matched nothing on `table`.
    pub fn no_data(table: &str) -> Self {
        Self::new(CODE_NO_DATA, format!("No data available on table {table}"))
    }

    /// Serialize as JSON text.
    pub fn to_json(&self) -> DaoResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
