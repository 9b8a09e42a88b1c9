use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broadcast::BroadcastError;
use crate::engine::state_machine::StateError;
use crate::impact_calculator::MatchError;
use crate::market_data::feed::FeedError;
use crate::rpc::pool::PoolError;
use crate::rpc::provider::ProviderError;
use crate::trade_validation::ValidationError;

/// Caller-facing classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationFailed,
    NoHealthyEndpoint,
    InsufficientLiquidity,
    SlippageExceeded,
    DeadlineExceeded,
    ProviderRequestFailed,
    FeedUnavailable,
    SigningFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::NoHealthyEndpoint => "no_healthy_endpoint",
            ErrorKind::InsufficientLiquidity => "insufficient_liquidity",
            ErrorKind::SlippageExceeded => "slippage_exceeded",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::ProviderRequestFailed => "provider_request_failed",
            ErrorKind::FeedUnavailable => "feed_unavailable",
            ErrorKind::SigningFailed => "signing_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Trade validation failed: {0}")]
    ValidationFailed(ValidationError),
    #[error("Trade deadline {deadline} exceeded (now {now})")]
    DeadlineExceeded { deadline: i64, now: i64 },
    #[error("No healthy RPC endpoints available")]
    NoHealthyEndpoint,
    #[error("Insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        requested: Decimal,
        available: Decimal,
    },
    #[error("Price impact {impact}% exceeds slippage tolerance {max}%")]
    SlippageExceeded { impact: Decimal, max: Decimal },
    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(ProviderError),
    #[error("Market data unavailable: {0}")]
    FeedUnavailable(FeedError),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Trade execution failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        source: Box<ExecutionError>,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            ExecutionError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            ExecutionError::NoHealthyEndpoint => ErrorKind::NoHealthyEndpoint,
            ExecutionError::InsufficientLiquidity { .. } => ErrorKind::InsufficientLiquidity,
            ExecutionError::SlippageExceeded { .. } => ErrorKind::SlippageExceeded,
            ExecutionError::ProviderRequestFailed(_) => ErrorKind::ProviderRequestFailed,
            ExecutionError::FeedUnavailable(_) => ErrorKind::FeedUnavailable,
            ExecutionError::SigningFailed(_) => ErrorKind::SigningFailed,
            ExecutionError::Exhausted { source, .. } => source.kind(),
            ExecutionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Transient faults a later attempt may get past.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::NoHealthyEndpoint
                | ExecutionError::ProviderRequestFailed(_)
                | ExecutionError::FeedUnavailable(_)
        )
    }
}

impl From<ValidationError> for ExecutionError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::DeadlinePassed { deadline, now } => {
                ExecutionError::DeadlineExceeded { deadline, now }
            }
            other => ExecutionError::ValidationFailed(other),
        }
    }
}

impl From<MatchError> for ExecutionError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::InsufficientLiquidity {
                requested,
                available,
            } => ExecutionError::InsufficientLiquidity {
                requested,
                available,
            },
            other => ExecutionError::Internal(other.to_string()),
        }
    }
}

impl From<PoolError> for ExecutionError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::NoHealthyEndpoint => ExecutionError::NoHealthyEndpoint,
            PoolError::Provider(p) => ExecutionError::ProviderRequestFailed(p),
            PoolError::Config(msg) => ExecutionError::Internal(msg),
        }
    }
}

impl From<FeedError> for ExecutionError {
    fn from(e: FeedError) -> Self {
        ExecutionError::FeedUnavailable(e)
    }
}

impl From<BroadcastError> for ExecutionError {
    fn from(e: BroadcastError) -> Self {
        match e {
            BroadcastError::Provider(p) => ExecutionError::ProviderRequestFailed(p),
            BroadcastError::Signer(msg) => ExecutionError::SigningFailed(msg),
        }
    }
}

impl From<StateError> for ExecutionError {
    fn from(e: StateError) -> Self {
        ExecutionError::Internal(e.to_string())
    }
}
