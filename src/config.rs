use config::{Config, ConfigError, Environment, File, FileFormat};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// One remote RPC node. `weight` is its relative selection probability.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PoolConfig {
    pub max_failures: u32,
    #[serde(alias = "failureResetWindowMs")]
    pub failure_reset_window_ms: i64,
    #[serde(alias = "rateLimitWindowMs")]
    pub rate_limit_window_ms: i64,
    #[serde(alias = "rateLimit")]
    pub rate_limit_max_requests: usize,
    pub health_check_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            failure_reset_window_ms: 5 * 60 * 1000,
            rate_limit_window_ms: 60 * 1000,
            rate_limit_max_requests: 100,
            health_check_interval_ms: 30_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl PoolConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub estimated_gas_units: u64,
    pub fee_rate: Decimal,
    pub default_deadline_secs: i64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            estimated_gas_units: 150_000,
            fee_rate: dec!(0.003),
            default_deadline_secs: 20 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    /// Depth venues in priority order.
    pub venues: Vec<VenueConfig>,
    pub depth_limit: u32,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct VenueConfig {
    pub name: String,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let venue = |name: &str, base_url: &str| VenueConfig {
            name: name.to_string(),
            base_url: base_url.to_string(),
        };
        Self {
            venues: vec![
                venue("binance", "https://api.binance.com/api/v3"),
                venue("coinbase", "https://api.pro.coinbase.com"),
                venue("kraken", "https://api.kraken.com/0"),
            ],
            depth_limit: 100,
            request_timeout_ms: 800,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SignerConfig {
    pub url: String,
    pub request_timeout_ms: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7070/sign".to_string(),
            request_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // 1. Project defaults from config/default.{toml,json}
            .add_source(File::with_name("config/default").required(false))
            // 2. Local overrides (not checked in)
            .add_source(File::with_name("config/local").required(false))
            // 3. Environment overrides, e.g. DEXEXEC_POOL__MAX_FAILURES=5
            .add_source(Environment::with_prefix("DEXEXEC").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::Message(
                "at least one RPC endpoint must be configured".into(),
            ));
        }
        for endpoint in &self.endpoints {
            Url::parse(&endpoint.url).map_err(|e| {
                ConfigError::Message(format!("invalid endpoint url {}: {}", endpoint.url, e))
            })?;
            if !endpoint.weight.is_finite() || endpoint.weight <= 0.0 {
                return Err(ConfigError::Message(format!(
                    "endpoint {} must have a positive weight, got {}",
                    endpoint.url, endpoint.weight
                )));
            }
        }
        let total_weight: f64 = self.endpoints.iter().map(|endpoint| endpoint.weight).sum();
        if !total_weight.is_finite() {
            return Err(ConfigError::Message(format!(
                "total endpoint weight must be finite, got {}",
                total_weight
            )));
        }
        for venue in &self.feed.venues {
            Url::parse(&venue.base_url).map_err(|e| {
                ConfigError::Message(format!("invalid venue url {}: {}", venue.base_url, e))
            })?;
        }
        if self.pool.max_failures == 0 || self.pool.rate_limit_max_requests == 0 {
            return Err(ConfigError::Message(
                "pool.max_failures and pool.rate_limit_max_requests must be non-zero".into(),
            ));
        }
        if self.execution.max_retries == 0 {
            return Err(ConfigError::Message(
                "execution.max_retries must be at least 1".into(),
            ));
        }
        if self.execution.fee_rate < Decimal::ZERO || self.execution.fee_rate >= Decimal::ONE {
            return Err(ConfigError::Message(format!(
                "execution.fee_rate must be in [0, 1), got {}",
                self.execution.fee_rate
            )));
        }
        Ok(())
    }
}
