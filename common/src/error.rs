//! Error types for currency values.

use thiserror::Error;

/// Errors raised while building a [`crate::Currency`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    /// The code was empty after trimming.
    #[error("Currency code cannot be empty")]
    Empty,

    /// The code contained something other than ASCII letters or digits.
    #[error("Invalid currency code: {0:?}")]
    Invalid(String),
}

/// Result type alias for currency parsing.
pub type Result<T> = std::result::Result<T, CurrencyError>;
