//! Error types shared across the taxi ETL workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Main error type for shared functionality
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
