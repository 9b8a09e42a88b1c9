use ethers::types::Address;
use ethers::utils::to_checksum;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::model::TradeRequest;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid token address {field}: {value}")]
    InvalidToken { field: &'static str, value: String },
    #[error("amount_in must be positive, got {0}")]
    NonPositiveAmount(Decimal),
    #[error("min_amount_out must be {expected}, got {actual}")]
    InvalidMinAmountOut {
        expected: &'static str,
        actual: Decimal,
    },
    #[error("max_slippage_percent must be within [0, 100], got {0}")]
    SlippageOutOfRange(Decimal),
    #[error("Trade deadline {deadline} has passed (now {now})")]
    DeadlinePassed { deadline: i64, now: i64 },
}

/// The execute path requires a strictly positive minimum output; simulation
/// accepts zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Simulate,
    Execute,
}

/// `0x` followed by 40 hex digits. Mixed-case input must carry a valid
/// EIP-55 checksum.
pub fn is_token_address(value: &str) -> bool {
    let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) else {
        return false;
    };
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return true;
    }

    match Address::from_str(hex) {
        Ok(address) => &to_checksum(&address, None)[2..] == hex,
        Err(_) => false,
    }
}

fn check_token(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if is_token_address(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidToken {
            field,
            value: value.to_string(),
        })
    }
}

/// Checks run in a fixed order and stop at the first failure.
pub fn validate(
    request: &TradeRequest,
    mode: ValidationMode,
    now_secs: i64,
) -> Result<(), ValidationError> {
    check_token("token_in", &request.token_in)?;
    check_token("token_out", &request.token_out)?;

    if request.amount_in <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(request.amount_in));
    }

    match mode {
        ValidationMode::Execute if request.min_amount_out <= Decimal::ZERO => {
            return Err(ValidationError::InvalidMinAmountOut {
                expected: "> 0",
                actual: request.min_amount_out,
            });
        }
        ValidationMode::Simulate if request.min_amount_out < Decimal::ZERO => {
            return Err(ValidationError::InvalidMinAmountOut {
                expected: ">= 0",
                actual: request.min_amount_out,
            });
        }
        _ => {}
    }

    if request.max_slippage_percent < Decimal::ZERO
        || request.max_slippage_percent > Decimal::ONE_HUNDRED
    {
        return Err(ValidationError::SlippageOutOfRange(
            request.max_slippage_percent,
        ));
    }

    check_deadline(request, now_secs)
}

pub fn check_deadline(request: &TradeRequest, now_secs: i64) -> Result<(), ValidationError> {
    if request.deadline <= now_secs {
        return Err(ValidationError::DeadlinePassed {
            deadline: request.deadline,
            now: now_secs,
        });
    }
    Ok(())
}
