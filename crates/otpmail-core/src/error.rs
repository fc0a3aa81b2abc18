//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// SMTP configuration or client construction failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] otpmail_smtp::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Code store operation failed.
    #[error("Code store error: {0}")]
    Store(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
