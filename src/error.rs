//! Error types for the data MCP server
//!
//! This module defines the error hierarchy for all operations in the server.

use thiserror::Error;

/// Main error type for the data MCP server
#[derive(Error, Debug)]
pub enum DataMcpError {
    /// JSON-RPC protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Input validation errors
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Lookup failures
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// Resource-level failures (pools, sockets, remote endpoints)
    #[error("{0}")]
    Resource(#[from] ResourceError),

    /// Semantic rejections by a tool handler
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Database driver errors
    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// JSON-RPC protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON message")]
    InvalidJson,

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Transport error: {message}")]
    Transport { message: String },
}

/// Input validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Input validation failed: {messages}")]
    SchemaViolation { messages: String },

    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Invalid schema for tool '{tool}': {message}")]
    InvalidSchema { tool: String, message: String },
}

/// Lookup failures
#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("Connection not found: {connection_id}")]
    Connection { connection_id: String },
}

/// Resource-level failures
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Connection pool is closed: {connection_id}")]
    PoolClosed { connection_id: String },

    #[error("Database connection validation failed")]
    ValidationFailed,

    #[error("Database operation failed for {db_type} database (connection: {connection_id}): {cause}")]
    DatabaseOperation {
        db_type: String,
        connection_id: String,
        cause: String,
    },

    #[error("HTTP {code}: {reason}")]
    HttpStatus { code: u16, reason: String },

    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },
}

/// Semantic rejections by a tool handler
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Connection '{connection_id}' already exists")]
    ConnectionExists { connection_id: String },

    #[error("Unsupported database type: {db_type}")]
    UnsupportedDatabaseType { db_type: String },

    #[error("Query cannot be null or empty")]
    EmptyQuery,

    #[error("Data for insertion cannot be empty.")]
    EmptyInsertData,

    #[error("Data for update cannot be empty.")]
    EmptyUpdateData,

    #[error("Columns for table creation cannot be empty.")]
    EmptyColumns,

    #[error("Invalid alter table action: {action}")]
    InvalidAlterAction { action: String },

    #[error("Cannot fetch more than {max} URLs at once")]
    TooManyUrls { max: usize },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar { var: String, value: String },

    #[error("Module '{name}' is already registered")]
    ModuleExists { name: String },

    #[error("Tool '{name}' is already registered")]
    ToolExists { name: String },
}

/// Result type alias for data MCP server operations
pub type Result<T> = std::result::Result<T, DataMcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResourceError::DatabaseOperation {
            db_type: "sqlite".to_string(),
            connection_id: "c1".to_string(),
            cause: "no such table: t".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database operation failed for sqlite database (connection: c1): no such table: t"
        );
    }

    #[test]
    fn test_error_conversion() {
        let domain_err = DomainError::TooManyUrls { max: 10 };
        let err: DataMcpError = domain_err.into();
        assert!(matches!(err, DataMcpError::Domain(_)));
        assert_eq!(err.to_string(), "Cannot fetch more than 10 URLs at once");
    }

    #[test]
    fn test_validation_message_contract() {
        let err = ValidationError::SchemaViolation {
            messages: "$.query: value is shorter than 1 character".to_string(),
        };
        assert!(err.to_string().starts_with("Input validation failed: "));
    }
}
