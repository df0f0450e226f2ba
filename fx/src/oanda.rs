//! OANDA-style provider: per-pair quotes with dataset fallback.
//!
//! A request names a dataset. When the provider answers `400` with error
//! code `1` (pair not published under that dataset) the fetcher retries once
//! against the default dataset. Every other failure is final.

use std::sync::Arc;

use async_trait::async_trait;
use fxcache_common::{Rate, RateKey};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::allow_list::CurrencyAllowList;
use crate::config::{OandaConfig, OANDA_DEFAULT_DATA_SET};
use crate::error::{ExtractError, FxError, FxResult, Provider};
use crate::extractor::{allowed_key, parse_magnitude, store_positive, ResponseExtractor};
use crate::fetcher::RateFetcher;
use crate::store::RateStore;
use crate::transport::{HttpTransport, ProviderRequest, ProviderResponse};

/// Provider error code for "pair not published under requested dataset".
pub const UNSUPPORTED_DATA_SET_CODE: i64 = 1;

/// Which request of the fallback protocol is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetAttempt {
    /// The configured dataset.
    Primary,
    /// The default dataset, after an unsupported-dataset rejection.
    Fallback,
}

impl DatasetAttempt {
    /// Dataset this attempt requests.
    pub fn data_set<'a>(&self, config: &'a OandaConfig) -> &'a str {
        match self {
            DatasetAttempt::Primary => &config.data_set,
            DatasetAttempt::Fallback => OANDA_DEFAULT_DATA_SET,
        }
    }

    /// The attempt to make after an unsupported-dataset rejection. Only the
    /// primary attempt has one, and only if it did not already ask for the
    /// default dataset.
    pub fn next(&self, config: &OandaConfig) -> Option<DatasetAttempt> {
        match self {
            DatasetAttempt::Primary if config.data_set != OANDA_DEFAULT_DATA_SET => {
                Some(DatasetAttempt::Fallback)
            }
            _ => None,
        }
    }

    /// Error for a failure on this attempt. Once on the fallback dataset,
    /// any failure means the pair does not exist upstream.
    fn failure(&self, message: String) -> FxError {
        match self {
            DatasetAttempt::Primary => FxError::ProviderFetch {
                provider: Provider::Oanda,
                message,
            },
            DatasetAttempt::Fallback => FxError::UnknownCurrency {
                provider: Provider::Oanda,
                message,
            },
        }
    }
}

/// What one upstream response means for the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// `200`; the body goes to extraction.
    Success(String),
    /// `400` with the unsupported-dataset code.
    RetryWithDefaultDataset { message: String },
    /// Any other status.
    Rejected { message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// Classify a response by status and error body.
pub fn classify(response: ProviderResponse) -> Classification {
    if response.is_ok() {
        return Classification::Success(response.body);
    }

    let parsed = serde_json::from_str::<ErrorBody>(&response.body).ok();
    let code = parsed.as_ref().and_then(|body| body.code);
    let message = parsed
        .and_then(|body| body.message)
        .unwrap_or(response.body);

    if response.status == 400 && code == Some(UNSUPPORTED_DATA_SET_CODE) {
        Classification::RetryWithDefaultDataset { message }
    } else {
        Classification::Rejected { message }
    }
}

/// Fetches spot quotes for one pair.
pub struct OandaFetcher {
    transport: Arc<dyn HttpTransport>,
    config: OandaConfig,
}

impl OandaFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: OandaConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &OandaConfig {
        &self.config
    }

    fn request(&self, key: &RateKey, data_set: &str) -> ProviderRequest {
        ProviderRequest::get(&self.config.endpoint)
            .param("base", key.base().iso_code())
            .param("quote", key.quote().iso_code())
            .param("data_set", data_set)
            .param("api_key", &self.config.api_key)
    }
}

#[async_trait]
impl RateFetcher for OandaFetcher {
    fn provider(&self) -> Provider {
        Provider::Oanda
    }

    async fn fetch(&self, key: &RateKey) -> FxResult<String> {
        let mut attempt = DatasetAttempt::Primary;

        loop {
            let data_set = attempt.data_set(&self.config);
            debug!(pair = %key, data_set, ?attempt, "Fetching quote");

            let response = match self.transport.get(&self.request(key, data_set)).await {
                Ok(response) => response,
                Err(e) => return Err(attempt.failure(e.to_string())),
            };
            let status = response.status;

            match classify(response) {
                Classification::Success(body) => return Ok(body),
                Classification::RetryWithDefaultDataset { message } => match attempt.next(&self.config) {
                    Some(next) => {
                        warn!(
                            pair = %key,
                            data_set,
                            message = %message,
                            "Pair not published under dataset, retrying with default"
                        );
                        attempt = next;
                    }
                    None => {
                        return Err(FxError::UnknownCurrency {
                            provider: Provider::Oanda,
                            message,
                        })
                    }
                },
                Classification::Rejected { message } => {
                    warn!(pair = %key, status, message = %message, "Provider rejected request");
                    return Err(attempt.failure(message));
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuotesPayload {
    quotes: Vec<QuoteEntry>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    base_currency: String,
    quote_currency: String,
    midpoint: Value,
}

/// Reads `quotes[]` and stores `(base, quote) -> midpoint`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OandaExtractor;

impl ResponseExtractor for OandaExtractor {
    fn extract(
        &self,
        body: &str,
        allow_list: &CurrencyAllowList,
        store: &dyn RateStore,
    ) -> Result<usize, ExtractError> {
        let payload: QuotesPayload = serde_json::from_str(body)?;
        let mut stored = 0;

        for entry in payload.quotes {
            let Some(key) = allowed_key(&entry.base_currency, &entry.quote_currency, allow_list)
            else {
                continue;
            };
            let midpoint = parse_magnitude(&entry.quote_currency, &entry.midpoint)?;

            if store_positive(key, Rate::new(midpoint), store) {
                stored += 1;
            }
        }

        debug!(stored, "Extracted OANDA quotes");
        Ok(stored)
    }
}
