//! Fixer-style provider: one EUR-relative table per call.
//!
//! The upstream table says how many units of each currency one euro buys.
//! The cache stores the reciprocal under `(code, EUR)`, i.e. euros per unit
//! of `code`. [`FixerBank`] derives cross rates from two such entries.

use std::sync::Arc;

use async_trait::async_trait;
use fxcache_common::{Currency, Rate, RateKey};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::allow_list::CurrencyAllowList;
use crate::config::{CacheConfig, FixerConfig};
use crate::engine::{ExchangeCache, ExchangeRates};
use crate::error::{ExtractError, FxError, FxResult, Provider};
use crate::extractor::{allowed_key, parse_magnitude, store_positive, ResponseExtractor};
use crate::fetcher::RateFetcher;
use crate::store::RateStore;
use crate::transport::{HttpTransport, ProviderRequest, ReqwestTransport};

/// Currency every fixer-style table is relative to.
pub fn anchor_currency() -> Currency {
    Currency::eur()
}

#[derive(Debug, Default, Deserialize)]
struct StatusBody {
    success: Option<bool>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    info: Option<String>,
}

impl StatusBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Upstream message, or the raw body when there is none.
    fn message(self, raw: &str) -> String {
        self.error
            .and_then(|error| {
                error.info.or(error.kind).or_else(|| error.code.map(|code| format!("error code {code}")))
            })
            .unwrap_or_else(|| raw.to_string())
    }
}

/// Fetches the full latest-rates table.
pub struct FixerFetcher {
    transport: Arc<dyn HttpTransport>,
    config: FixerConfig,
}

impl FixerFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: FixerConfig) -> Self {
        Self { transport, config }
    }

    fn request(&self) -> ProviderRequest {
        ProviderRequest::get(&self.config.endpoint).param("access_key", &self.config.access_key)
    }

    fn failure(message: String) -> FxError {
        FxError::ProviderFetch {
            provider: Provider::Fixer,
            message,
        }
    }
}

#[async_trait]
impl RateFetcher for FixerFetcher {
    fn provider(&self) -> Provider {
        Provider::Fixer
    }

    async fn fetch(&self, key: &RateKey) -> FxResult<String> {
        debug!(pair = %key, "Fetching rate table");

        let response = self
            .transport
            .get(&self.request())
            .await
            .map_err(|e| Self::failure(e.to_string()))?;

        if !response.is_ok() {
            let message = StatusBody::parse(&response.body).message(&response.body);
            warn!(status = response.status, message = %message, "Provider rejected request");
            return Err(Self::failure(message));
        }

        // Invalid keys and exhausted quotas come back as 200 with success=false.
        let status = StatusBody::parse(&response.body);
        if status.success == Some(false) {
            let message = status.message(&response.body);
            warn!(message = %message, "Provider reported failure");
            return Err(Self::failure(message));
        }

        Ok(response.body)
    }
}

#[derive(Debug, Deserialize)]
struct RatesPayload {
    rates: Map<String, Value>,
}

/// Reads `rates{}` and stores `(code, EUR) -> 1 / magnitude`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixerExtractor;

impl ResponseExtractor for FixerExtractor {
    fn extract(
        &self,
        body: &str,
        allow_list: &CurrencyAllowList,
        store: &dyn RateStore,
    ) -> Result<usize, ExtractError> {
        let payload: RatesPayload = serde_json::from_str(body)?;
        let anchor = anchor_currency();
        let mut stored = 0;

        for (code, magnitude) in &payload.rates {
            let Some(key) = allowed_key(code, anchor.iso_code(), allow_list) else {
                continue;
            };
            let magnitude = parse_magnitude(code, magnitude)?;
            let rate = Rate::new(magnitude).and_then(|rate| rate.reciprocal());

            if store_positive(key, rate, store) {
                stored += 1;
            }
        }

        if allow_list.contains(&anchor) {
            store.set(RateKey::new(anchor.clone(), anchor), Rate::ONE);
        }

        debug!(stored, "Extracted fixer rate table");
        Ok(stored)
    }
}

/// Cross-rate bank over a fixer-style cache.
///
/// `get_rate(from, to)` is `rate(from, EUR) / rate(to, EUR)`, each operand
/// resolved through the cache.
pub struct FixerBank {
    cache: ExchangeCache,
}

impl FixerBank {
    pub fn new(cache: ExchangeCache) -> Self {
        Self { cache }
    }

    /// Fixer-style bank over a `reqwest` transport.
    pub fn from_config(config: FixerConfig, cache: CacheConfig) -> FxResult<Self> {
        config.validate().map_err(FxError::Configuration)?;
        let transport = ReqwestTransport::new(config.timeout)
            .map_err(|e| FxError::Configuration(e.to_string()))?;
        Self::with_transport(config, cache, Arc::new(transport))
    }

    /// Fixer-style bank over any transport.
    pub fn with_transport(
        config: FixerConfig,
        cache: CacheConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> FxResult<Self> {
        let cache = ExchangeCache::builder(
            Arc::new(FixerFetcher::new(transport, config)),
            Arc::new(FixerExtractor),
        )
        .config(cache)
        .build()?;
        Ok(Self::new(cache))
    }

    /// The underlying cache, for flushing and TTL control.
    pub fn cache(&self) -> &ExchangeCache {
        &self.cache
    }

    /// Cross rate through the euro.
    pub async fn get_rate(&self, from: &Currency, to: &Currency) -> FxResult<Rate> {
        let key = RateKey::new(from.clone(), to.clone());

        let Some(from_anchor) = self.anchor_rate(from).await? else {
            return Err(FxError::UnknownRate(key));
        };
        let Some(to_anchor) = self.anchor_rate(to).await? else {
            return Err(FxError::UnknownRate(key));
        };

        from_anchor
            .checked_div(to_anchor)
            .ok_or(FxError::UnknownRate(key))
    }

    async fn anchor_rate(&self, currency: &Currency) -> FxResult<Option<Rate>> {
        match self.cache.get_rate(currency, &anchor_currency()).await {
            Ok(rate) => Ok(Some(rate)),
            Err(FxError::UnknownRate(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ExchangeRates for FixerBank {
    async fn get_rate(&self, from: &Currency, to: &Currency) -> FxResult<Rate> {
        FixerBank::get_rate(self, from, to).await
    }
}
