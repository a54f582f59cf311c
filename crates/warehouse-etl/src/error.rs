//! Error types for the replication engine.

use thiserror::Error;

/// Main error type for ETL operations.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Bad connection name or descriptor; the operation never starts.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or warehouse unreachable
    #[error("Connection error ({context}): {message}")]
    Connection { context: String, message: String },

    /// Introspection or DDL failure for a table
    #[error("Schema error on {table}: {message}")]
    Schema { table: String, message: String },

    /// Insert failure inside a chunk
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// DataSource record persistence failed
    #[error("Metadata store error: {0}")]
    Store(String),

    /// No active DataSource registered under the name
    #[error("Data source '{0}' not found")]
    NotFound(String),

    /// Another operation holds the name
    #[error("An operation is already running for data source '{0}'")]
    Busy(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Create a Connection error naming what was being connected to
    pub fn connection(context: impl Into<String>, message: impl ToString) -> Self {
        EtlError::Connection {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a Schema error
    pub fn schema(table: impl Into<String>, message: impl ToString) -> Self {
        EtlError::Schema {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl ToString) -> Self {
        EtlError::Transfer {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Store error
    pub fn store(message: impl ToString) -> Self {
        EtlError::Store(message.to_string())
    }

    /// Short machine-readable kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Validation(_) => "validation",
            EtlError::Config(_) | EtlError::Yaml(_) => "config",
            EtlError::Connection { .. } => "connection",
            EtlError::Schema { .. } => "schema",
            EtlError::Transfer { .. } => "transfer",
            EtlError::Store(_) => "store",
            EtlError::NotFound(_) => "not_found",
            EtlError::Busy(_) => "busy",
            EtlError::Io(_) => "io",
            EtlError::Json(_) => "json",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            EtlError::Config(_) | EtlError::Yaml(_) | EtlError::Json(_) => 1,
            EtlError::Connection { .. } => 2,
            EtlError::Transfer { .. } => 3,
            EtlError::Validation(_) | EtlError::NotFound(_) => 4,
            EtlError::Schema { .. } => 5,
            EtlError::Store(_) => 6,
            EtlError::Io(_) => 7,
            EtlError::Busy(_) => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_kind() {
        assert_eq!(EtlError::Config("x".into()).exit_code(), 1);
        assert_eq!(EtlError::connection("source", "refused").exit_code(), 2);
        assert_eq!(EtlError::transfer("t", "boom").exit_code(), 3);
        assert_eq!(EtlError::Busy("shop1".into()).exit_code(), 8);
    }

    #[test]
    fn test_messages_carry_cause() {
        let err = EtlError::transfer("shop1__orders", "duplicate key");
        assert_eq!(
            err.to_string(),
            "Transfer failed for table shop1__orders: duplicate key"
        );
        assert!(err.format_detailed().starts_with("Error: Transfer failed"));
    }

    #[test]
    fn test_io_error_has_chain_source() {
        let err: EtlError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err.kind(), "io");
        assert_eq!(err.exit_code(), 7);
    }
}
