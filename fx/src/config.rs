//! Cache and provider configuration.

use std::fmt;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::allow_list::CurrencyAllowList;

/// Default OANDA-style spot endpoint.
pub const OANDA_ENDPOINT: &str = "https://web-services.oanda.com/rates/api/v2/rates/spot.json";

/// Dataset every OANDA-style pair is published under.
pub const OANDA_DEFAULT_DATA_SET: &str = "OANDA";

/// Default fixer-style endpoint.
pub const FIXER_ENDPOINT: &str = "http://data.fixer.io/api/latest";

/// Configuration shared by every cache instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time to live for cached rates; `None` never expires.
    pub ttl: Option<Duration>,
    /// Currencies accepted from upstream.
    pub allow_list: CurrencyAllowList,
    /// Serialize fetches per pair so concurrent misses share one request.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            allow_list: CurrencyAllowList::default(),
            single_flight: false,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(seconds) = std::env::var("FXCACHE_TTL_SECONDS") {
            let seconds: i64 = seconds
                .trim()
                .parse()
                .map_err(|_| format!("FXCACHE_TTL_SECONDS is not a number: {seconds}"))?;
            config.ttl = (seconds != 0).then(|| Duration::seconds(seconds));
        }

        if let Ok(codes) = std::env::var("FXCACHE_CURRENCIES") {
            let codes: Vec<&str> = codes.split(',').filter(|c| !c.trim().is_empty()).collect();
            config.allow_list = CurrencyAllowList::from_codes(&codes).map_err(|e| e.to_string())?;
        }

        if let Ok(flag) = std::env::var("FXCACHE_SINGLE_FLIGHT") {
            config.single_flight = matches!(flag.trim(), "1" | "true" | "TRUE" | "yes");
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.allow_list.is_empty() {
            return Err("Currency allow-list cannot be empty".to_string());
        }

        if let Some(ttl) = self.ttl {
            if ttl <= Duration::zero() {
                return Err("TTL must be positive".to_string());
            }
        }

        Ok(())
    }
}

/// OANDA-style provider configuration.
#[derive(Clone)]
pub struct OandaConfig {
    /// Spot quote endpoint.
    pub endpoint: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Dataset requested first.
    pub data_set: String,
    /// Per-request timeout.
    pub timeout: StdDuration,
}

impl Default for OandaConfig {
    fn default() -> Self {
        Self {
            endpoint: OANDA_ENDPOINT.to_string(),
            api_key: String::new(),
            data_set: OANDA_DEFAULT_DATA_SET.to_string(),
            timeout: StdDuration::from_secs(10),
        }
    }
}

impl OandaConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_data_set(mut self, data_set: impl Into<String>) -> Self {
        self.data_set = data_set.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("OANDA_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Ok(key) = std::env::var("OANDA_API_KEY") {
            config.api_key = key;
        }

        if let Ok(data_set) = std::env::var("OANDA_DATA_SET") {
            config.data_set = data_set;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("OANDA endpoint cannot be empty".to_string());
        }

        if self.api_key.is_empty() {
            return Err("OANDA API key cannot be empty".to_string());
        }

        if self.data_set.is_empty() {
            return Err("OANDA dataset cannot be empty".to_string());
        }

        Ok(())
    }
}

impl fmt::Debug for OandaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OandaConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"***")
            .field("data_set", &self.data_set)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Fixer-style provider configuration.
#[derive(Clone)]
pub struct FixerConfig {
    /// Latest-rates endpoint.
    pub endpoint: String,
    /// Access key sent with every request.
    pub access_key: String,
    /// Per-request timeout.
    pub timeout: StdDuration,
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self {
            endpoint: FIXER_ENDPOINT.to_string(),
            access_key: String::new(),
            timeout: StdDuration::from_secs(10),
        }
    }
}

impl FixerConfig {
    pub fn new(access_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("FIXER_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Ok(key) = std::env::var("FIXER_ACCESS_KEY") {
            config.access_key = key;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("Fixer endpoint cannot be empty".to_string());
        }

        if self.access_key.is_empty() {
            return Err("Fixer access key cannot be empty".to_string());
        }

        Ok(())
    }
}

impl fmt::Debug for FixerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixerConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}
