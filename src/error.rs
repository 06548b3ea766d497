//! Error types for rudu binding operations.

use thiserror::Error;

/// Result type alias using [`RuduError`].
pub type Result<T> = std::result::Result<T, RuduError>;

/// Error types for rudu binding operations.
#[derive(Debug, Error)]
pub enum RuduError {
    /// Parse error with location information.
    #[error("Parse error at line {line}, column {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
    },

    /// Schema-related errors (duplicate table, invalid column list, etc.).
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Catalog persistence errors.
    #[error("Catalog error: {0}")]
    CatalogError(String),

    // ==================== Binding Errors ====================
    /// Binding error (name resolution, scoping, typing).
    #[error("Bind error: {0}")]
    BindError(String),

    /// Planning error (logical plan construction).
    #[error("Plan error: {0}")]
    PlanError(String),

    /// A value could not be converted to the requested type.
    #[error("Cast error: cannot cast {from} to {to}: {reason}")]
    Cast {
        from: String,
        to: String,
        reason: String,
    },

    // ==================== Prepared Statement Errors ====================
    /// An EXECUTE argument has no matching parameter in the prepared statement.
    #[error("Could not find parameter with index {index}")]
    ParameterNotFound { index: usize },

    /// An EXECUTE argument could not be coerced to its parameter's type.
    #[error("Parameter ${index}: {message}")]
    ParameterCast { index: usize, message: String },

    // ==================== Internal Errors ====================
    /// Invariant violation inside the engine (never caused by user input).
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error while reading or writing a catalog file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
