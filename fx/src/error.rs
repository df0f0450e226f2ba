//! Exchange cache error types.

use std::fmt;

use fxcache_common::{CurrencyError, RateKey};
use thiserror::Error;

/// Upstream quote provider a cache is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Per-pair quotes with dataset selection.
    Oanda,
    /// One flat EUR-relative table per call.
    Fixer,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Oanda => "Oanda",
            Provider::Fixer => "Fixer",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur while resolving a rate.
#[derive(Debug, Error)]
pub enum FxError {
    /// The pair could not be resolved after a fetch attempt.
    #[error("Unknown rate for {0}")]
    UnknownRate(RateKey),

    /// The provider says the currency or pair does not exist.
    #[error("{provider}: unknown currency: {message}")]
    UnknownCurrency { provider: Provider, message: String },

    /// Transport failure or a provider rejection that is not retried.
    #[error("{provider}CurrencyFetchError: {message}")]
    ProviderFetch { provider: Provider, message: String },

    /// A successful response whose payload could not be read.
    #[error("{provider}CurrencyFetchError: malformed response: {cause}")]
    ResponseParse {
        provider: Provider,
        #[source]
        cause: ExtractError,
    },

    /// A caller-supplied currency code was not usable.
    #[error(transparent)]
    InvalidCurrency(#[from] CurrencyError),

    /// Converting an amount overflowed the decimal range.
    #[error("Conversion overflow for {key}")]
    ConversionOverflow { key: RateKey },

    /// The cache could not be built from its configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FxError {
    /// True for the provider fetch family, parse failures included.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            FxError::ProviderFetch { .. } | FxError::ResponseParse { .. }
        )
    }

    /// Provider that raised the error, if it came from upstream.
    pub fn provider(&self) -> Option<Provider> {
        match self {
            FxError::UnknownCurrency { provider, .. }
            | FxError::ProviderFetch { provider, .. }
            | FxError::ResponseParse { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// Upstream message carried by the error, verbatim.
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            FxError::UnknownCurrency { message, .. } | FxError::ProviderFetch { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Why a successful payload could not be turned into rates.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The payload is not JSON or lacks the expected structure.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An entry's magnitude is not a number.
    #[error("non-numeric magnitude for {code}: {value}")]
    InvalidMagnitude { code: String, value: String },
}

/// Result type for exchange cache operations.
pub type FxResult<T> = Result<T, FxError>;
