//! Error types for the engine.
//!
//! Every failure the engine can report is a variant of [`EngineError`]. The
//! variants are deliberately coarse so a caller can tell a rejected query apart
//! from a query the database refused, and both apart from an unreachable
//! database. Messages never carry credentials.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unsupported database type: {dialect}")]
    UnsupportedDialect { dialect: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database access error: {message}")]
    DatabaseAccess { message: String },

    #[error("Query rejected: {reason}")]
    InvalidQuery { reason: String },

    #[error("SQL error: {message}")]
    Sql {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("File upload failed: {message}")]
    FileUpload { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create an unsupported dialect error.
    pub fn unsupported_dialect(dialect: impl Into<String>) -> Self {
        Self::UnsupportedDialect {
            dialect: dialect.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a metadata access error.
    pub fn access(message: impl Into<String>) -> Self {
        Self::DatabaseAccess {
            message: message.into(),
        }
    }

    /// Create a validation rejection.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn sql(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Sql {
            message: message.into(),
            sql_state,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn file_upload(message: impl Into<String>) -> Self {
        Self::FileUpload {
            message: message.into(),
        }
    }

    /// Numeric code understood by the outer service layer.
    pub fn code(&self) -> u32 {
        match self {
            Self::Connection { .. } => 2000,
            Self::UnsupportedDialect { .. } => 2001,
            Self::InvalidQuery { .. } => 2002,
            Self::DatabaseAccess { .. } => 2003,
            Self::Sql { .. } => 2004,
            Self::InvalidRequest { .. } => 2005,
            Self::Timeout { .. } => 2006,
            Self::FileUpload { .. } => 3002,
            Self::EmptyFile => 3003,
            Self::Io(_) => 5000,
        }
    }

    /// Stable snake_case name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedDialect { .. } => "unsupported_dialect",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Connection { .. } => "connection_error",
            Self::DatabaseAccess { .. } => "database_access_error",
            Self::InvalidQuery { .. } => "invalid_query",
            Self::Sql { .. } => "sql_error",
            Self::Timeout { .. } => "timeout",
            Self::EmptyFile => "empty_file",
            Self::FileUpload { .. } => "file_upload_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::UnsupportedDialect { .. } => Some("Use one of: mysql, postgresql, sqlite"),
            Self::InvalidQuery { .. } => {
                Some("Only read-only SELECT statements without comments are accepted")
            }
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or narrowing the query")
            }
            _ => None,
        }
    }

    /// Serialize for the host loop and CLI output.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "code": self.code(),
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Some(suggestion) = self.suggestion() {
            body["suggestion"] = serde_json::Value::String(suggestion.to_string());
        }
        if let Self::Sql {
            sql_state: Some(state),
            ..
        } = self
        {
            body["sqlState"] = serde_json::Value::String(state.clone());
        }
        body
    }
}

/// Map a driver error raised while a validated query runs.
///
/// Pool-level failures are still connection problems; everything else is the
/// database rejecting the statement.
impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                EngineError::sql(db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => EngineError::connection(
                "Timed out waiting for a pooled connection",
                "The pool is saturated; retry later or raise the pool size",
            ),
            sqlx::Error::PoolClosed => {
                EngineError::connection("Connection pool is closed", "Retry the request")
            }
            sqlx::Error::Io(io_err) => EngineError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => EngineError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => EngineError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            other => EngineError::sql(other.to_string(), None),
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = EngineError::invalid_query("query contains forbidden token 'drop'");
        assert_eq!(
            err.to_string(),
            "Query rejected: query contains forbidden token 'drop'"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::connection("x", "y").code(), 2000);
        assert_eq!(EngineError::unsupported_dialect("oracle").code(), 2001);
        assert_eq!(EngineError::invalid_query("x").code(), 2002);
        assert_eq!(EngineError::access("x").code(), 2003);
        assert_eq!(EngineError::sql("x", None).code(), 2004);
        assert_eq!(EngineError::file_upload("x").code(), 3002);
        assert_eq!(EngineError::EmptyFile.code(), 3003);
    }

    #[test]
    fn test_validation_and_execution_are_distinct() {
        let rejected = EngineError::invalid_query("unbalanced single quotes");
        let failed = EngineError::sql("no such table: users", None);
        let unreachable = EngineError::connection("refused", "start the server");
        assert_ne!(rejected.kind(), failed.kind());
        assert_ne!(failed.kind(), unreachable.kind());
        assert_ne!(rejected.code(), unreachable.code());
    }

    #[test]
    fn test_error_suggestion() {
        let err = EngineError::connection("refused", "Check that the server is running");
        assert_eq!(err.suggestion(), Some("Check that the server is running"));
        assert!(EngineError::access("boom").suggestion().is_none());
    }

    #[test]
    fn test_to_json_includes_sql_state() {
        let err = EngineError::sql("syntax error", Some("42601".to_string()));
        let json = err.to_json();
        assert_eq!(json["code"], 2004);
        assert_eq!(json["kind"], "sql_error");
        assert_eq!(json["sqlState"], "42601");
        assert!(json.get("suggestion").is_none());
    }

    #[test]
    fn test_pool_timeout_maps_to_connection() {
        let err: EngineError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, EngineError::Connection { .. }));

        let err: EngineError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, EngineError::Sql { .. }));
    }
}
