use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::U256;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Long-lived handle to one remote RPC node.
#[async_trait]
pub trait RpcProvider: Send + Sync {
    fn url(&self) -> &str;

    /// Cheap liveness probe.
    async fn latest_block_height(&self) -> Result<u64, ProviderError>;

    /// Raw JSON-RPC call.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

pub struct EthersRpcProvider {
    url: String,
    inner: Provider<Http>,
}

impl EthersRpcProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let parsed = Url::parse(url)
            .map_err(|e| ProviderError::Config(format!("Invalid RPC URL {}: {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            inner: Provider::new(Http::new_with_client(parsed, client)),
        })
    }
}

#[async_trait]
impl RpcProvider for EthersRpcProvider {
    fn url(&self) -> &str {
        &self.url
    }

    async fn latest_block_height(&self) -> Result<u64, ProviderError> {
        let block = self
            .inner
            .get_block_number()
            .await
            .map_err(|e| ProviderError::Network(format!("eth_blockNumber: {}", e)))?;
        Ok(block.as_u64())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.inner
            .request::<Value, Value>(method, params)
            .await
            .map_err(|e| ProviderError::Rpc(format!("{}: {}", method, e)))
    }
}

/// Decode a hex JSON-RPC quantity (e.g. `"0x3b9aca00"`) into a decimal.
pub fn parse_quantity(value: &Value) -> Result<Decimal, ProviderError> {
    let raw: U256 = serde_json::from_value(value.clone())
        .map_err(|e| ProviderError::Decode(format!("quantity {}: {}", value, e)))?;
    Decimal::from_str(&raw.to_string())
        .map_err(|e| ProviderError::Decode(format!("quantity {} out of range: {}", raw, e)))
}
