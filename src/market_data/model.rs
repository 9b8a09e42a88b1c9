use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::model::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    #[error("{side} level {index} has non-positive price or quantity")]
    NonPositiveLevel { side: &'static str, index: usize },
    #[error("{side} level {index} breaks price ordering")]
    Unordered { side: &'static str, index: usize },
}

/// Depth snapshot for one pair. Bids are ordered by descending price and
/// asks by ascending price; both are checked on construction and the
/// snapshot cannot be mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    symbol: String,
    bids: Vec<OrderBookLevel>,
    asks: Vec<OrderBookLevel>,
    timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn new(
        symbol: impl Into<String>,
        bids: Vec<OrderBookLevel>,
        asks: Vec<OrderBookLevel>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, BookError> {
        check_side("bids", &bids, |prev, next| next < prev)?;
        check_side("asks", &asks, |prev, next| next > prev)?;
        Ok(Self {
            symbol: symbol.into(),
            bids,
            asks,
            timestamp,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bids(&self) -> &[OrderBookLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[OrderBookLevel] {
        &self.asks
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The side a taker consumes: asks to buy, bids to sell.
    pub fn liquidity_for(&self, side: Side) -> &[OrderBookLevel] {
        match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        }
    }
}

fn check_side(
    side: &'static str,
    levels: &[OrderBookLevel],
    ordered: impl Fn(Decimal, Decimal) -> bool,
) -> Result<(), BookError> {
    for (index, level) in levels.iter().enumerate() {
        if level.price <= Decimal::ZERO || level.quantity <= Decimal::ZERO {
            return Err(BookError::NonPositiveLevel { side, index });
        }
        if index > 0 && !ordered(levels[index - 1].price, level.price) {
            return Err(BookError::Unordered { side, index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lvl(price: Decimal, quantity: Decimal) -> OrderBookLevel {
        OrderBookLevel::new(price, quantity)
    }

    #[test]
    fn test_accepts_ordered_book() {
        let book = OrderBookSnapshot::new(
            "WETH/USDC",
            vec![lvl(dec!(99), dec!(1)), lvl(dec!(98), dec!(2))],
            vec![lvl(dec!(100), dec!(1)), lvl(dec!(101), dec!(2))],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(book.liquidity_for(Side::Buy)[0].price, dec!(100));
        assert_eq!(book.liquidity_for(Side::Sell)[0].price, dec!(99));
    }

    #[test]
    fn test_rejects_unordered_asks() {
        let err = OrderBookSnapshot::new(
            "WETH/USDC",
            vec![],
            vec![lvl(dec!(101), dec!(1)), lvl(dec!(100), dec!(2))],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, BookError::Unordered { side: "asks", index: 1 });
    }

    #[test]
    fn test_rejects_duplicate_bid_price() {
        let err = OrderBookSnapshot::new(
            "WETH/USDC",
            vec![lvl(dec!(99), dec!(1)), lvl(dec!(99), dec!(2))],
            vec![],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, BookError::Unordered { side: "bids", index: 1 });
    }

    #[test]
    fn test_rejects_zero_quantity() {
        let err = OrderBookSnapshot::new(
            "WETH/USDC",
            vec![],
            vec![lvl(dec!(100), dec!(0))],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, BookError::NonPositiveLevel { side: "asks", index: 0 });
    }
}
