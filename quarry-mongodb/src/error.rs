//! Error types for MongoDB operations.

use thiserror::Error;

/// Result type for MongoDB operations.
pub type MongoResult<T> = Result<T, MongoError>;

/// Errors that can occur during MongoDB operations.
///
/// Per-field coercion failures are deliberately absent: they are logged and
/// the field is left unset, so they never abort a conversion.
#[derive(Error, Debug)]
pub enum MongoError {
    /// MongoDB driver error (network, authentication, server rejection).
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),

    /// Configuration error, including malformed query descriptors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store answered with a shape we did not expect.
    #[error("query error: {0}")]
    Query(String),

    /// Entity conversion failed as a whole.
    #[error("conversion error: {0}")]
    Conversion(String),
}

impl MongoError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Create a conversion error.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// Check if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is an entity conversion error.
    pub fn is_conversion_error(&self) -> bool {
        matches!(self, Self::Conversion(_))
    }

    /// Check if the error came from the driver unchanged.
    pub fn is_driver_error(&self) -> bool {
        matches!(self, Self::Driver(_))
    }
}
