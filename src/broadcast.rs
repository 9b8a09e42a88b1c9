use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Bytes;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SignerConfig;
use crate::impact_calculator::FillQuote;
use crate::model::{Side, TradeRequest};
use crate::rpc::provider::{ProviderError, RpcProvider, parse_quantity};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BroadcastError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Signer error: {0}")]
    Signer(String),
}

/// A request that passed the impact check, together with the quote it was
/// priced at.
#[derive(Debug, Clone, Serialize)]
pub struct PricedTrade {
    pub request: TradeRequest,
    pub side: Side,
    pub quote: FillQuote,
    pub expected_output: Decimal,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub transaction_hash: String,
    /// Taken from the receipt when the node already has one.
    pub gas_used: Option<u64>,
}

/// Produces a signed raw transaction. Key custody lives behind this trait.
#[async_trait]
pub trait TradeSigner: Send + Sync {
    async fn sign(&self, trade: &PricedTrade) -> Result<Bytes, BroadcastError>;
}

/// Sends a priced trade through one chosen endpoint.
#[async_trait]
pub trait TradeBroadcaster: Send + Sync {
    async fn submit(
        &self,
        provider: &dyn RpcProvider,
        trade: &PricedTrade,
    ) -> Result<Submission, BroadcastError>;
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(alias = "rawTransaction")]
    raw_transaction: Bytes,
}

/// Remote signer reached over HTTP. The trade is POSTed as JSON and the
/// response carries the signed transaction bytes.
pub struct HttpTradeSigner {
    client: reqwest::Client,
    url: String,
}

impl HttpTradeSigner {
    pub fn new(config: &SignerConfig) -> Result<Self, BroadcastError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BroadcastError::Signer(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl TradeSigner for HttpTradeSigner {
    async fn sign(&self, trade: &PricedTrade) -> Result<Bytes, BroadcastError> {
        let response = self
            .client
            .post(&self.url)
            .json(trade)
            .send()
            .await
            .map_err(|e| BroadcastError::Signer(e.to_string()))?
            .error_for_status()
            .map_err(|e| BroadcastError::Signer(e.to_string()))?;

        let signed: SignResponse = response
            .json()
            .await
            .map_err(|e| BroadcastError::Signer(format!("bad signer response: {}", e)))?;
        Ok(signed.raw_transaction)
    }
}

pub struct RpcBroadcaster<S> {
    signer: S,
}

impl<S: TradeSigner> RpcBroadcaster<S> {
    pub fn new(signer: S) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl<S: TradeSigner> TradeBroadcaster for RpcBroadcaster<S> {
    async fn submit(
        &self,
        provider: &dyn RpcProvider,
        trade: &PricedTrade,
    ) -> Result<Submission, BroadcastError> {
        let raw = self.signer.sign(trade).await?;

        let hash = provider
            .request("eth_sendRawTransaction", json!([raw]))
            .await?;
        let transaction_hash = hash
            .as_str()
            .ok_or_else(|| ProviderError::Decode(format!("transaction hash {}", hash)))?
            .to_string();
        info!(tx = %transaction_hash, url = provider.url(), "📤 Transaction submitted");

        // The receipt is usually not there yet; gas falls back to the estimate.
        let gas_used = match provider
            .request("eth_getTransactionReceipt", json!([transaction_hash]))
            .await
        {
            Ok(receipt) => receipt
                .get("gasUsed")
                .and_then(|gas| parse_quantity(gas).ok())
                .and_then(|gas| gas.to_u64()),
            Err(e) => {
                debug!(tx = %transaction_hash, error = %e, "receipt lookup failed");
                None
            }
        };

        Ok(Submission {
            transaction_hash,
            gas_used,
        })
    }
}
