//! The exchange cache: expiration, lookup, fetch on miss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use fxcache_common::{Currency, Money, Rate, RateKey, SharedClock, SystemClock, Timestamp};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument};

use crate::allow_list::CurrencyAllowList;
use crate::config::{CacheConfig, OandaConfig};
use crate::error::{FxError, FxResult, Provider};
use crate::expiration::{ExpirationPolicy, SharedExpirationPolicy};
use crate::extractor::ResponseExtractor;
use crate::fetcher::RateFetcher;
use crate::oanda::{OandaExtractor, OandaFetcher};
use crate::store::{MemoryRateStore, SharedRateStore};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Anything that can quote a rate between two currencies.
#[async_trait]
pub trait ExchangeRates: Send + Sync {
    /// Units of `to` for one unit of `from`.
    async fn get_rate(&self, from: &Currency, to: &Currency) -> FxResult<Rate>;

    /// Convert an amount. Same-currency amounts come back unchanged without
    /// a lookup. No rounding is applied.
    async fn exchange_with(&self, from: &Money, to: &Currency) -> FxResult<Money> {
        if &from.currency == to {
            return Ok(from.clone());
        }

        let rate = self.get_rate(&from.currency, to).await?;
        let value = from
            .value
            .checked_mul(rate.value())
            .ok_or_else(|| FxError::ConversionOverflow {
                key: RateKey::new(from.currency.clone(), to.clone()),
            })?;

        Ok(Money::new(value, to.clone()))
    }
}

/// Rate cache in front of a single upstream provider.
///
/// Every request first runs the expiration check, then looks the pair up.
/// On a miss the provider is fetched once, the payload extracted into the
/// store, and the store consulted again.
pub struct ExchangeCache {
    fetcher: Arc<dyn RateFetcher>,
    extractor: Arc<dyn ResponseExtractor>,
    store: SharedRateStore,
    policy: SharedExpirationPolicy,
    /// Policy generation this cache last flushed for.
    seen_generation: AtomicU64,
    allow_list: CurrencyAllowList,
    clock: SharedClock,
    inflight: Option<DashMap<RateKey, Arc<AsyncMutex<()>>>>,
}

/// Builder for [`ExchangeCache`].
pub struct ExchangeCacheBuilder {
    fetcher: Arc<dyn RateFetcher>,
    extractor: Arc<dyn ResponseExtractor>,
    config: CacheConfig,
    store: Option<SharedRateStore>,
    policy: Option<SharedExpirationPolicy>,
    clock: Option<SharedClock>,
}

impl ExchangeCacheBuilder {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing store, possibly shared with other caches.
    pub fn store(mut self, store: SharedRateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an existing policy. Its TTL is left as configured.
    pub fn policy(mut self, policy: SharedExpirationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fails with [`FxError::Configuration`] if the cache config is invalid.
    pub fn build(self) -> FxResult<ExchangeCache> {
        self.config.validate().map_err(FxError::Configuration)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let policy = self.policy.unwrap_or_else(|| {
            let policy = Arc::new(ExpirationPolicy::new());
            policy.configure(self.config.ttl, clock.now());
            policy
        });

        Ok(ExchangeCache {
            fetcher: self.fetcher,
            extractor: self.extractor,
            store: self.store.unwrap_or_else(MemoryRateStore::shared),
            seen_generation: AtomicU64::new(policy.generation()),
            policy,
            allow_list: self.config.allow_list,
            clock,
            inflight: self.config.single_flight.then(DashMap::new),
        })
    }
}

impl ExchangeCache {
    pub fn builder(
        fetcher: Arc<dyn RateFetcher>,
        extractor: Arc<dyn ResponseExtractor>,
    ) -> ExchangeCacheBuilder {
        ExchangeCacheBuilder {
            fetcher,
            extractor,
            config: CacheConfig::default(),
            store: None,
            policy: None,
            clock: None,
        }
    }

    /// OANDA-style cache over a `reqwest` transport.
    pub fn oanda(config: OandaConfig, cache: CacheConfig) -> FxResult<Self> {
        config.validate().map_err(FxError::Configuration)?;
        let transport = ReqwestTransport::new(config.timeout)
            .map_err(|e| FxError::Configuration(e.to_string()))?;
        Self::oanda_with_transport(config, cache, Arc::new(transport))
    }

    /// OANDA-style cache over any transport.
    pub fn oanda_with_transport(
        config: OandaConfig,
        cache: CacheConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> FxResult<Self> {
        Self::builder(
            Arc::new(OandaFetcher::new(transport, config)),
            Arc::new(OandaExtractor),
        )
        .config(cache)
        .build()
    }

    pub fn provider(&self) -> Provider {
        self.fetcher.provider()
    }

    /// Resolve a rate, fetching from the provider on a miss.
    #[instrument(skip(self), fields(provider = %self.provider()))]
    pub async fn get_rate(&self, base: &Currency, quote: &Currency) -> FxResult<Rate> {
        let key = RateKey::new(base.clone(), quote.clone());

        self.expire_rates();

        if let Some(rate) = self.store.get(&key) {
            debug!(pair = %key, "Cache hit");
            return Ok(rate);
        }
        debug!(pair = %key, "Cache miss");

        match &self.inflight {
            Some(inflight) => self.fetch_single_flight(inflight, &key).await?,
            None => self.fetch_into_store(&key).await?,
        }

        self.store.get(&key).ok_or(FxError::UnknownRate(key))
    }

    /// [`Self::get_rate`] for raw codes.
    pub async fn get_rate_by_code(&self, base: &str, quote: &str) -> FxResult<Rate> {
        let base = Currency::new(base)?;
        let quote = Currency::new(quote)?;
        self.get_rate(&base, &quote).await
    }

    /// Fetch with at most one request in flight per key. The gate is
    /// removed by the last caller holding it, whatever the outcome.
    async fn fetch_single_flight(
        &self,
        inflight: &DashMap<RateKey, Arc<AsyncMutex<()>>>,
        key: &RateKey,
    ) -> FxResult<()> {
        let gate = inflight.entry(key.clone()).or_default().clone();

        let result = {
            let _guard = gate.lock().await;
            if self.store.get(key).is_some() {
                debug!(pair = %key, "Filled by concurrent fetch");
                Ok(())
            } else {
                self.fetch_into_store(key).await
            }
        };

        // One reference in the map, one here.
        inflight.remove_if(key, |_, current| {
            Arc::ptr_eq(current, &gate) && Arc::strong_count(current) == 2
        });
        result
    }

    async fn fetch_into_store(&self, key: &RateKey) -> FxResult<()> {
        debug!(pair = %key, "Fetching from provider");
        let body = self.fetcher.fetch(key).await?;

        self.extractor
            .extract(&body, &self.allow_list, self.store.as_ref())
            .map_err(|cause| FxError::ResponseParse {
                provider: self.provider(),
                cause,
            })?;

        Ok(())
    }

    /// Store a rate by hand, overwriting any previous value.
    pub fn add_rate(&self, base: &Currency, quote: &Currency, rate: Rate) {
        self.store
            .set(RateKey::new(base.clone(), quote.clone()), rate);
    }

    pub fn set_rate(&self, base: &Currency, quote: &Currency, rate: Rate) {
        self.add_rate(base, quote, rate);
    }

    /// Drop one pair.
    pub fn flush_rate(&self, base: &Currency, quote: &Currency) {
        self.store.remove(&RateKey::new(base.clone(), quote.clone()));
    }

    /// Drop every pair.
    pub fn flush_rates(&self) {
        self.store.clear();
    }

    /// Run the expiration check now. Returns true if the store was flushed.
    pub fn expire_rates(&self) -> bool {
        self.policy.expire_if_due(self.clock.now());

        let generation = self.policy.generation();
        if self.seen_generation.swap(generation, Ordering::AcqRel) == generation {
            return false;
        }

        info!(
            provider = %self.provider(),
            next_expiration = ?self.policy.expires_at(),
            "Rates expired, flushing cache"
        );
        self.store.clear();
        true
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.policy.ttl()
    }

    /// Reconfigure the TTL of the policy this cache uses. Every cache
    /// sharing the policy is affected. `None` disables expiration; a TTL
    /// must be positive.
    pub fn set_ttl(&self, ttl: Option<Duration>) -> FxResult<()> {
        if ttl.is_some_and(|ttl| ttl <= Duration::zero()) {
            return Err(FxError::Configuration("TTL must be positive".to_string()));
        }
        self.policy.configure(ttl, self.clock.now());
        Ok(())
    }

    pub fn rates_expiration(&self) -> Option<Timestamp> {
        self.policy.expires_at()
    }

    pub fn store(&self) -> &SharedRateStore {
        &self.store
    }

    pub fn policy(&self) -> &SharedExpirationPolicy {
        &self.policy
    }

    pub fn allow_list(&self) -> &CurrencyAllowList {
        &self.allow_list
    }
}

#[async_trait]
impl ExchangeRates for ExchangeCache {
    async fn get_rate(&self, from: &Currency, to: &Currency) -> FxResult<Rate> {
        ExchangeCache::get_rate(self, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::StaticFetcher;
    use crate::transport::ScriptedTransport;
    use fxcache_common::{Clock, ManualClock};
    use rust_decimal_macros::dec;

    const QUOTES: &str = r#"{"quotes":[
        {"base_currency":"USD","quote_currency":"EUR","midpoint":"0.91"},
        {"base_currency":"GBP","quote_currency":"EUR","midpoint":"1.17"}
    ]}"#;

    struct Harness {
        cache: ExchangeCache,
        fetcher: Arc<StaticFetcher>,
        clock: Arc<ManualClock>,
    }

    fn harness(config: CacheConfig) -> Harness {
        let fetcher = Arc::new(StaticFetcher::new(Provider::Oanda, QUOTES));
        let clock = Arc::new(ManualClock::starting_now());
        let cache = ExchangeCache::builder(fetcher.clone(), Arc::new(OandaExtractor))
            .config(config)
            .clock(clock.clone())
            .build()
            .unwrap();
        Harness {
            cache,
            fetcher,
            clock,
        }
    }

    fn with_ttl(seconds: i64) -> CacheConfig {
        CacheConfig {
            ttl: Some(Duration::seconds(seconds)),
            ..Default::default()
        }
    }

    fn rate(value: rust_decimal::Decimal) -> Rate {
        Rate::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_miss_fetches_once_then_hits() {
        let h = harness(CacheConfig::default());

        let first = h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        let second = h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        assert_eq!(first.value(), dec!(0.91));
        assert_eq!(first, second);
        assert_eq!(h.fetcher.calls(), 1);
        // The whole payload was ingested.
        assert_eq!(h.cache.store().len(), 2);
    }

    #[tokio::test]
    async fn test_identity_rate_served_from_store() {
        let h = harness(CacheConfig::default());
        h.cache.add_rate(&Currency::jpy(), &Currency::jpy(), Rate::ONE);

        let rate = h.cache.get_rate(&Currency::jpy(), &Currency::jpy()).await.unwrap();

        assert_eq!(rate, Rate::ONE);
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_inverse_derivation() {
        let h = harness(CacheConfig::default());
        h.cache.add_rate(&Currency::usd(), &Currency::eur(), rate(dec!(0.91)));

        let err = h
            .cache
            .get_rate(&Currency::eur(), &Currency::usd())
            .await
            .unwrap_err();

        assert!(matches!(err, FxError::UnknownRate(key) if key.to_string() == "EUR/USD"));
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_absent_pair_is_unknown_rate() {
        let h = harness(CacheConfig::default());

        let err = h.cache.get_rate_by_code("usd", "jpy").await.unwrap_err();

        assert!(matches!(err, FxError::UnknownRate(_)));
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_allow_list_filtered_pair_is_unknown_rate() {
        let h = harness(CacheConfig {
            allow_list: CurrencyAllowList::from_codes(&["GBP", "EUR"]).unwrap(),
            ..Default::default()
        });

        let err = h
            .cache
            .get_rate(&Currency::usd(), &Currency::eur())
            .await
            .unwrap_err();

        assert!(matches!(err, FxError::UnknownRate(_)));
        let usd_eur = RateKey::new(Currency::usd(), Currency::eur());
        assert!(h.cache.store().get(&usd_eur).is_none());
        assert_eq!(h.cache.store().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_code_is_rejected_before_fetch() {
        let h = harness(CacheConfig::default());

        let err = h.cache.get_rate_by_code("", "EUR").await.unwrap_err();

        assert!(matches!(err, FxError::InvalidCurrency(_)));
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_ttl_expiry_clears_store_and_recomputes_expiration() {
        let h = harness(with_ttl(1000));
        let start = h.clock.now();
        assert_eq!(h.cache.rates_expiration(), Some(start + Duration::seconds(1000)));

        h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        h.cache.add_rate(&Currency::jpy(), &Currency::jpy(), Rate::ONE);

        h.clock.advance(Duration::seconds(1001));
        let now = h.clock.now();
        h.fetcher.set_body(r#"{"quotes":[{"base_currency":"USD","quote_currency":"EUR","midpoint":"0.95"}]}"#);

        let refreshed = h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        assert_eq!(refreshed.value(), dec!(0.95));
        assert_eq!(h.fetcher.calls(), 2);
        // Flushed entirely, not just the requested pair.
        let jpy = RateKey::new(Currency::jpy(), Currency::jpy());
        assert!(h.cache.store().get(&jpy).is_none());
        assert_eq!(h.cache.rates_expiration(), Some(now + Duration::seconds(1000)));
    }

    #[tokio::test]
    async fn test_expiry_check_runs_on_hits_too() {
        let h = harness(with_ttl(60));
        h.cache.add_rate(&Currency::usd(), &Currency::eur(), rate(dec!(0.5)));

        h.clock.advance(Duration::seconds(61));
        let value = h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        assert_eq!(value.value(), dec!(0.91));
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_ttl_nothing_expires() {
        let h = harness(CacheConfig::default());
        h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        h.clock.advance(Duration::days(365 * 10));

        assert!(!h.cache.expire_rates());
        h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.cache.rates_expiration(), None);
    }

    #[tokio::test]
    async fn test_flush_rate_only_removes_one_pair() {
        let h = harness(CacheConfig::default());
        h.cache.add_rate(&Currency::usd(), &Currency::eur(), rate(dec!(0.91)));
        h.cache.add_rate(&Currency::gbp(), &Currency::eur(), rate(dec!(1.17)));

        h.cache.flush_rate(&Currency::usd(), &Currency::eur());

        let gbp = h.cache.get_rate(&Currency::gbp(), &Currency::eur()).await.unwrap();
        assert_eq!(gbp.value(), dec!(1.17));
        assert_eq!(h.fetcher.calls(), 0);
        assert!(h
            .cache
            .store()
            .get(&RateKey::new(Currency::usd(), Currency::eur()))
            .is_none());
    }

    #[tokio::test]
    async fn test_set_rate_overwrites() {
        let h = harness(CacheConfig::default());
        h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        h.cache.set_rate(&Currency::usd(), &Currency::eur(), rate(dec!(0.5)));

        let value = h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert_eq!(value.value(), dec!(0.5));
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_flush_rates_forces_refetch() {
        let h = harness(CacheConfig::default());
        h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        h.cache.flush_rates();
        h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        assert_eq!(h.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_set_ttl_starts_countdown() {
        let h = harness(CacheConfig::default());
        let now = h.clock.now();

        h.cache.set_ttl(Some(Duration::seconds(30))).unwrap();

        assert_eq!(h.cache.ttl(), Some(Duration::seconds(30)));
        assert_eq!(h.cache.rates_expiration(), Some(now + Duration::seconds(30)));
    }

    #[tokio::test]
    async fn test_shared_policy_flushes_every_sharer() {
        let clock = Arc::new(ManualClock::starting_now());
        let policy = Arc::new(ExpirationPolicy::with_ttl(Duration::seconds(10), clock.now()));
        let build = || {
            ExchangeCache::builder(
                Arc::new(StaticFetcher::new(Provider::Oanda, QUOTES)),
                Arc::new(OandaExtractor),
            )
            .policy(policy.clone())
            .clock(clock.clone())
            .build()
            .unwrap()
        };
        let first = build();
        let second = build();
        first.add_rate(&Currency::usd(), &Currency::eur(), rate(dec!(0.5)));
        second.add_rate(&Currency::usd(), &Currency::eur(), rate(dec!(0.5)));

        clock.advance(Duration::seconds(11));

        assert!(first.expire_rates());
        assert!(second.expire_rates());
        assert!(first.store().is_empty());
        assert!(second.store().is_empty());

        // Reconfiguring through one cache is visible through the other.
        first.set_ttl(Some(Duration::seconds(99))).unwrap();
        assert_eq!(second.ttl(), Some(Duration::seconds(99)));
    }

    #[tokio::test]
    async fn test_provider_errors_propagate_unchanged() {
        let transport = Arc::new(
            ScriptedTransport::new().respond(404, r#"{"code":404,"message":"Not Found"}"#),
        );
        let cache = ExchangeCache::oanda_with_transport(
            OandaConfig::new("key"),
            CacheConfig::default(),
            transport,
        )
        .unwrap();

        let err = cache
            .get_rate(&Currency::usd(), &Currency::eur())
            .await
            .unwrap_err();

        assert!(matches!(err, FxError::ProviderFetch { .. }));
        assert_eq!(err.upstream_message(), Some("Not Found"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_parse_error() {
        let fetcher = Arc::new(StaticFetcher::new(Provider::Oanda, "<html>oops</html>"));
        let cache = ExchangeCache::builder(fetcher, Arc::new(OandaExtractor))
            .build()
            .unwrap();

        let err = cache
            .get_rate(&Currency::usd(), &Currency::eur())
            .await
            .unwrap_err();

        assert!(matches!(err, FxError::ResponseParse { provider: Provider::Oanda, .. }));
        assert!(err.is_fetch_error());
    }

    #[tokio::test]
    async fn test_exchange_with() {
        let h = harness(CacheConfig::default());
        let amount = Money::new(dec!(1000), Currency::usd());

        let converted = h.cache.exchange_with(&amount, &Currency::eur()).await.unwrap();
        let same = h.cache.exchange_with(&amount, &Currency::usd()).await.unwrap();

        assert_eq!(converted, Money::new(dec!(910), Currency::eur()));
        assert_eq!(same, amount);
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_shares_one_fetch() {
        let h = harness(CacheConfig {
            single_flight: true,
            ..Default::default()
        });
        let cache = Arc::new(h.cache);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.get_rate(&Currency::usd(), &Currency::eur()).await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().value(), dec!(0.91));
        }
        assert_eq!(h.fetcher.calls(), 1);
        assert!(cache.inflight.as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_flight_gates_are_released() {
        let h = harness(CacheConfig {
            single_flight: true,
            ..Default::default()
        });

        for i in 0..50 {
            let base = Currency::new(format!("X{i}")).unwrap();
            let err = h.cache.get_rate(&base, &Currency::eur()).await.unwrap_err();
            assert!(matches!(err, FxError::UnknownRate(_)));
        }
        h.cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        assert!(h.cache.inflight.as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_ttl_is_rejected() {
        let h = harness(CacheConfig::default());

        let err = h.cache.set_ttl(Some(Duration::zero())).unwrap_err();
        assert!(matches!(err, FxError::Configuration(_)));
        assert!(h.cache.set_ttl(Some(Duration::seconds(-5))).is_err());
        assert_eq!(h.cache.ttl(), None);
        assert!(h.cache.set_ttl(None).is_ok());

        let built = ExchangeCache::builder(
            Arc::new(StaticFetcher::new(Provider::Oanda, QUOTES)),
            Arc::new(OandaExtractor),
        )
        .config(with_ttl(0))
        .build();
        assert!(matches!(built, Err(FxError::Configuration(_))));
    }
}
