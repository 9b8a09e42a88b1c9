pub mod error;
pub mod execution;
pub mod retry;
pub mod state_machine;

pub use error::{ErrorKind, ExecutionError};
pub use execution::{ExecutionEngine, ExecutionReport};
pub use retry::RetryPolicy;
pub use state_machine::{TradeAttempt, TradeState, TradeStateMachine};
