use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    Validating,  // Request checks, deadline
    Quoting,     // Depth fetched, fill computed
    ImpactCheck, // Fresh quote vs slippage tolerance
    Executing,   // Submitted through a pool endpoint
    Rejected,    // Refused before submission
    Completed,   // Submission accepted
    Failed,      // Quote or submission failed
}

impl TradeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeState::Rejected | TradeState::Completed | TradeState::Failed
        )
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Invalid transition from {0} to {1}")]
    InvalidTransition(TradeState, TradeState),
}

pub struct TradeStateMachine;

impl TradeStateMachine {
    pub fn transition(current: TradeState, next: TradeState) -> Result<TradeState, StateError> {
        match (current, next) {
            // Validating
            (TradeState::Validating, TradeState::Quoting) => Ok(next),
            (TradeState::Validating, TradeState::Rejected) => Ok(next),

            // Quoting
            (TradeState::Quoting, TradeState::ImpactCheck) => Ok(next),
            (TradeState::Quoting, TradeState::Failed) => Ok(next), // feed down, no liquidity

            // ImpactCheck
            (TradeState::ImpactCheck, TradeState::Executing) => Ok(next),
            (TradeState::ImpactCheck, TradeState::Rejected) => Ok(next),

            // Executing
            (TradeState::Executing, TradeState::Completed) => Ok(next),
            (TradeState::Executing, TradeState::Failed) => Ok(next),

            _ => Err(StateError::InvalidTransition(current, next)),
        }
    }
}

/// One pass through the state machine. Retries start a new attempt.
#[derive(Debug, Clone)]
pub struct TradeAttempt {
    number: u32,
    state: TradeState,
}

impl TradeAttempt {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            state: TradeState::Validating,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn advance(&mut self, next: TradeState) -> Result<(), StateError> {
        self.state = TradeStateMachine::transition(self.state, next)?;
        debug!(attempt = self.number, state = %self.state, "trade attempt advanced");
        Ok(())
    }
}
