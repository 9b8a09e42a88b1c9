use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::error::ErrorKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A swap intent as submitted by a caller. Treated as an immutable value
/// once handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRequest {
    #[serde(alias = "tokenIn")]
    pub token_in: String,
    #[serde(alias = "tokenOut")]
    pub token_out: String,
    #[serde(alias = "amountIn")]
    pub amount_in: Decimal,
    #[serde(alias = "minAmountOut")]
    pub min_amount_out: Decimal,
    /// Maximum accepted price impact, 0–100.
    #[serde(alias = "maxSlippage")]
    pub max_slippage_percent: Decimal,
    /// Absolute unix time in seconds.
    pub deadline: i64,
}

impl TradeRequest {
    /// Request whose deadline is `now_secs + ttl_secs`.
    pub fn with_default_deadline(
        token_in: impl Into<String>,
        token_out: impl Into<String>,
        amount_in: Decimal,
        min_amount_out: Decimal,
        max_slippage_percent: Decimal,
        now_secs: i64,
        ttl_secs: i64,
    ) -> Self {
        Self {
            token_in: token_in.into(),
            token_out: token_out.into(),
            amount_in,
            min_amount_out,
            max_slippage_percent,
            deadline: now_secs + ttl_secs,
        }
    }

    pub fn pair(&self) -> String {
        format!("{}/{}", self.token_in, self.token_out)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionType {
    Market,
    Limit,
    #[serde(rename = "Flash Loan")]
    FlashLoan,
    Arbitrage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
    Pending,
}

/// Created on successful execution and handed to the caller; the engine
/// keeps no copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub pair: String,
    pub amount: Decimal,
    pub entry_price: Decimal,
    /// Unix millis.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub position_type: PositionType,
    pub status: PositionStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub transaction_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub effective_price: Option<Decimal>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub attempts: u32,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SimulationResult {
    pub expected_output: Decimal,
    pub effective_price: Decimal,
    pub price_impact_percent: Decimal,
    /// Wei.
    pub gas_cost: Decimal,
    pub estimated_fees: Decimal,
}

/// Chain fee data, all in wei.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeeData {
    pub current_gas_price: Decimal,
    pub base_fee: Decimal,
    pub priority_fee: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TradeEvent {
    Execution {
        position: Position,
        transaction_hash: String,
        timestamp: i64,
    },
    Error {
        pair: String,
        error: String,
        kind: ErrorKind,
        timestamp: i64,
    },
}
