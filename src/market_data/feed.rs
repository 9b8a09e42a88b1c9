use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{FeedConfig, VenueConfig};
use crate::context::ExecutionContext;
use crate::market_data::model::{BookError, OrderBookLevel, OrderBookSnapshot};
use crate::model::FeeData;
use crate::rpc::pool::{EndpointPool, PoolError};
use crate::rpc::provider::parse_quantity;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Data not available: {0}")]
    NotAvailable(String),
    #[error("Malformed data: {0}")]
    Malformed(String),
}

impl From<BookError> for FeedError {
    fn from(e: BookError) -> Self {
        FeedError::Malformed(e.to_string())
    }
}

impl From<PoolError> for FeedError {
    fn from(e: PoolError) -> Self {
        FeedError::NotAvailable(e.to_string())
    }
}

/// Source of depth snapshots and chain fee data for the engine.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    async fn get_order_book(&self, pair: &str) -> Result<OrderBookSnapshot, FeedError>;

    async fn get_fee_data(&self) -> Result<FeeData, FeedError>;
}

/// `[price, quantity]` pairs as venues return them (strings or numbers).
#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<(Value, Value)>,
    asks: Vec<(Value, Value)>,
}

/// Depth over venue REST APIs in priority order, fee data over the
/// endpoint pool.
pub struct RestDepthFeed {
    client: reqwest::Client,
    venues: Vec<VenueConfig>,
    depth_limit: u32,
    pool: Arc<EndpointPool>,
    ctx: Arc<ExecutionContext>,
}

impl RestDepthFeed {
    pub fn new(
        config: &FeedConfig,
        pool: Arc<EndpointPool>,
        ctx: Arc<ExecutionContext>,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| FeedError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            venues: config.venues.clone(),
            depth_limit: config.depth_limit,
            pool,
            ctx,
        })
    }

    async fn fetch_depth(
        &self,
        venue: &VenueConfig,
        pair: &str,
    ) -> Result<OrderBookSnapshot, FeedError> {
        let url = format!("{}/depth", venue.base_url.trim_end_matches('/'));
        let limit = self.depth_limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", pair), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| FeedError::NotAvailable(format!("{}: {}", venue.name, e)))?
            .error_for_status()
            .map_err(|e| FeedError::NotAvailable(format!("{}: {}", venue.name, e)))?;

        let depth: DepthResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(format!("{}: {}", venue.name, e)))?;

        parse_depth(pair, depth, &self.ctx)
    }
}

fn parse_depth(
    pair: &str,
    depth: DepthResponse,
    ctx: &ExecutionContext,
) -> Result<OrderBookSnapshot, FeedError> {
    let bids = parse_levels(&depth.bids)?;
    let asks = parse_levels(&depth.asks)?;
    Ok(OrderBookSnapshot::new(pair, bids, asks, ctx.time.now())?)
}

fn parse_levels(raw: &[(Value, Value)]) -> Result<Vec<OrderBookLevel>, FeedError> {
    raw.iter()
        .map(|(price, quantity)| {
            Ok(OrderBookLevel::new(parse_decimal(price)?, parse_decimal(quantity)?))
        })
        .collect()
}

fn parse_decimal(value: &Value) -> Result<Decimal, FeedError> {
    let parsed = match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        // Use the textual form so binary floats never touch the value.
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| Decimal::from_scientific(&n.to_string()).ok()),
        _ => None,
    };
    parsed.ok_or_else(|| FeedError::Malformed(format!("not a decimal: {}", value)))
}

#[async_trait]
impl FeedAdapter for RestDepthFeed {
    async fn get_order_book(&self, pair: &str) -> Result<OrderBookSnapshot, FeedError> {
        for venue in &self.venues {
            match self.fetch_depth(venue, pair).await {
                Ok(snapshot) => {
                    debug!(venue = %venue.name, pair, "order book fetched");
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!(venue = %venue.name, pair, error = %e, "order book fetch failed");
                }
            }
        }
        Err(FeedError::NotAvailable(format!(
            "no venue returned an order book for {}",
            pair
        )))
    }

    async fn get_fee_data(&self) -> Result<FeeData, FeedError> {
        let gas_price = self.pool.read("eth_gasPrice", json!([])).await?;
        let priority_fee = self
            .pool
            .read("eth_maxPriorityFeePerGas", json!([]))
            .await?;
        let block = self
            .pool
            .read("eth_getBlockByNumber", json!(["latest", false]))
            .await?;

        let base_fee = match block.get("baseFeePerGas") {
            Some(value) if !value.is_null() => parse_quantity(value),
            // Pre-London chains have no base fee.
            _ => Ok(Decimal::ZERO),
        };

        Ok(FeeData {
            current_gas_price: parse_quantity(&gas_price)
                .map_err(|e| FeedError::Malformed(e.to_string()))?,
            base_fee: base_fee.map_err(|e| FeedError::Malformed(e.to_string()))?,
            priority_fee: parse_quantity(&priority_fee)
                .map_err(|e| FeedError::Malformed(e.to_string()))?,
        })
    }
}
