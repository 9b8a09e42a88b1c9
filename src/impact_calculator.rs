use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market_data::model::OrderBookSnapshot;
use crate::model::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillQuote {
    /// Volume-weighted average price over the consumed levels.
    pub filled_price: Decimal,
    /// `|filled_price - best| / best * 100` against the first level.
    pub price_impact_percent: Decimal,
    pub quantity: Decimal,
    pub levels_consumed: usize,
    pub fully_filled: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("Target quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),
    #[error("Insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        requested: Decimal,
        available: Decimal,
    },
    #[error("Arithmetic overflow while walking the book")]
    Overflow,
}

/// Walk the taker side of `snapshot` until `target_quantity` is consumed.
///
/// Never returns a partial fill: when the whole side holds less than the
/// target the call fails with `InsufficientLiquidity`. The snapshot is only
/// read.
pub fn compute_fill(
    snapshot: &OrderBookSnapshot,
    target_quantity: Decimal,
    side: Side,
) -> Result<FillQuote, MatchError> {
    if target_quantity <= Decimal::ZERO {
        return Err(MatchError::InvalidQuantity(target_quantity));
    }

    let levels = snapshot.liquidity_for(side);
    let Some(best) = levels.first() else {
        return Err(MatchError::InsufficientLiquidity {
            requested: target_quantity,
            available: Decimal::ZERO,
        });
    };

    let mut remaining = target_quantity;
    let mut total_cost = Decimal::ZERO;
    let mut levels_consumed = 0;

    for level in levels {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(level.quantity);
        let cost = level.price.checked_mul(take).ok_or(MatchError::Overflow)?;
        total_cost = total_cost.checked_add(cost).ok_or(MatchError::Overflow)?;
        remaining -= take;
        levels_consumed += 1;
    }

    if remaining > Decimal::ZERO {
        let available = levels
            .iter()
            .try_fold(Decimal::ZERO, |acc, level| acc.checked_add(level.quantity))
            .ok_or(MatchError::Overflow)?;
        return Err(MatchError::InsufficientLiquidity {
            requested: target_quantity,
            available,
        });
    }

    let filled_price = total_cost
        .checked_div(target_quantity)
        .ok_or(MatchError::Overflow)?;
    let price_impact_percent = filled_price
        .checked_sub(best.price)
        .and_then(|diff| diff.checked_div(best.price))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or(MatchError::Overflow)?
        .abs();

    Ok(FillQuote {
        filled_price,
        price_impact_percent,
        quantity: target_quantity,
        levels_consumed,
        fully_filled: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::model::OrderBookLevel;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn book(bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> OrderBookSnapshot {
        let levels = |raw: &[(Decimal, Decimal)]| {
            raw.iter()
                .map(|(p, q)| OrderBookLevel::new(*p, *q))
                .collect::<Vec<_>>()
        };
        OrderBookSnapshot::new("WETH/USDC", levels(bids), levels(asks), Utc::now()).unwrap()
    }

    #[test]
    fn test_buy_walks_asks() {
        let snapshot = book(&[], &[(dec!(100), dec!(1)), (dec!(101), dec!(2))]);
        let quote = compute_fill(&snapshot, dec!(2), Side::Buy).unwrap();

        assert_eq!(quote.filled_price, dec!(100.5));
        assert_eq!(quote.price_impact_percent, dec!(0.5));
        assert_eq!(quote.levels_consumed, 2);
        assert!(quote.fully_filled);
    }

    #[test]
    fn test_sell_walks_bids() {
        let snapshot = book(&[(dec!(99), dec!(1)), (dec!(97), dec!(1))], &[]);
        let quote = compute_fill(&snapshot, dec!(2), Side::Sell).unwrap();

        assert_eq!(quote.filled_price, dec!(98));
        // |98 - 99| / 99 * 100
        assert_eq!(quote.price_impact_percent.round_dp(6), dec!(1.010101));
    }

    #[test]
    fn test_fill_within_first_level_has_no_impact() {
        let snapshot = book(&[], &[(dec!(2500), dec!(10))]);
        let quote = compute_fill(&snapshot, dec!(0.25), Side::Buy).unwrap();
        assert_eq!(quote.filled_price, dec!(2500));
        assert!(quote.price_impact_percent.is_zero());
        assert_eq!(quote.levels_consumed, 1);
    }

    #[test]
    fn test_insufficient_liquidity_is_an_error() {
        let snapshot = book(&[], &[(dec!(100), dec!(1)), (dec!(101), dec!(2))]);
        let err = compute_fill(&snapshot, dec!(3.5), Side::Buy).unwrap_err();
        assert_eq!(
            err,
            MatchError::InsufficientLiquidity {
                requested: dec!(3.5),
                available: dec!(3),
            }
        );
    }

    #[test]
    fn test_empty_side() {
        let snapshot = book(&[(dec!(99), dec!(1))], &[]);
        assert!(matches!(
            compute_fill(&snapshot, dec!(1), Side::Buy),
            Err(MatchError::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive_target() {
        let snapshot = book(&[], &[(dec!(100), dec!(1))]);
        assert_eq!(
            compute_fill(&snapshot, dec!(0), Side::Buy),
            Err(MatchError::InvalidQuantity(dec!(0)))
        );
    }

    #[test]
    fn test_many_small_levels_stay_exact() {
        let asks: Vec<(Decimal, Decimal)> = (0..1000)
            .map(|i| (dec!(1.0) + Decimal::new(i, 4), dec!(0.001)))
            .collect();
        let snapshot = book(&[], &asks);
        let quote = compute_fill(&snapshot, dec!(1), Side::Buy).unwrap();
        // Mean of 1.0000 .. 1.0999 step 0.0001
        assert_eq!(quote.filled_price, dec!(1.04995));
    }

    #[test]
    fn test_extreme_price_spread_reports_overflow() {
        let snapshot = book(
            &[],
            &[
                (Decimal::from_scientific("1e-22").unwrap(), dec!(1)),
                (Decimal::from_scientific("1e20").unwrap(), dec!(1)),
            ],
        );
        assert_eq!(
            compute_fill(&snapshot, dec!(2), Side::Buy),
            Err(MatchError::Overflow)
        );
    }

    #[test]
    fn test_snapshot_untouched() {
        let snapshot = book(&[], &[(dec!(100), dec!(1)), (dec!(101), dec!(2))]);
        let before = snapshot.clone();
        compute_fill(&snapshot, dec!(2), Side::Buy).unwrap();
        assert_eq!(snapshot, before);
    }
}
