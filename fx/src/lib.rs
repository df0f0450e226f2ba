//! FxCache
//!
//! Exchange-rate cache in front of a remote quote provider.
//!
//! # Features
//!
//! - Directional rate keys, no implicit inverse or cross rates in the store
//! - TTL expiration, per cache or shared between caches of one provider
//! - OANDA-style per-pair fetching with a single dataset fallback
//! - Fixer-style EUR table fetching with cross rates through the euro
//! - Currency allow-list applied on ingest
//!
//! # Example
//!
//! ```rust,ignore
//! use fxcache::{CacheConfig, ExchangeCache, FxError, OandaConfig};
//! use fxcache_common::Currency;
//!
//! let cache_config = CacheConfig::from_env().map_err(FxError::Configuration)?;
//! let cache = ExchangeCache::oanda(OandaConfig::from_env(), cache_config)?;
//!
//! let rate = cache.get_rate(&Currency::usd(), &Currency::eur()).await?;
//! ```

pub mod allow_list;
pub mod config;
pub mod engine;
pub mod error;
pub mod expiration;
pub mod extractor;
pub mod fetcher;
pub mod fixer;
pub mod oanda;
pub mod store;
pub mod transport;

pub use allow_list::CurrencyAllowList;
pub use config::{CacheConfig, FixerConfig, OandaConfig};
pub use engine::{ExchangeCache, ExchangeCacheBuilder, ExchangeRates};
pub use error::{ExtractError, FxError, FxResult, Provider};
pub use expiration::{ExpirationPolicy, SharedExpirationPolicy};
pub use extractor::ResponseExtractor;
pub use fetcher::RateFetcher;
pub use fixer::{FixerBank, FixerExtractor, FixerFetcher};
pub use oanda::{OandaExtractor, OandaFetcher};
pub use store::{MemoryRateStore, RateStore, SharedRateStore};
pub use transport::{HttpTransport, ProviderRequest, ProviderResponse, ReqwestTransport, TransportError};
