use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::broadcast::{BroadcastError, PricedTrade, TradeBroadcaster};
use crate::config::ExecutionConfig;
use crate::context::ExecutionContext;
use crate::engine::error::ExecutionError;
use crate::engine::retry::RetryPolicy;
use crate::engine::state_machine::{TradeAttempt, TradeState};
use crate::impact_calculator::{FillQuote, compute_fill};
use crate::market_data::feed::FeedAdapter;
use crate::metrics;
use crate::model::{
    ExecutionResult, Position, PositionStatus, PositionType, Side, SimulationResult, TradeEvent,
    TradeRequest,
};
use crate::rpc::pool::EndpointPool;
use crate::trade_validation::{self, ValidationMode};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Successful execution as seen by typed callers.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub transaction_hash: String,
    pub gas_used: u64,
    pub effective_price: Decimal,
    pub price_impact_percent: Decimal,
    pub endpoint_url: String,
    pub attempts: u32,
    pub position: Position,
}

/// Validates, prices and submits swaps. Holds no per-trade state between
/// calls; concurrent `execute` calls only share the pool and the feed.
pub struct ExecutionEngine {
    pool: Arc<EndpointPool>,
    feed: Arc<dyn FeedAdapter>,
    broadcaster: Arc<dyn TradeBroadcaster>,
    ctx: Arc<ExecutionContext>,
    config: ExecutionConfig,
    retry: RetryPolicy,
    events: broadcast::Sender<TradeEvent>,
}

impl ExecutionEngine {
    pub fn new(
        pool: Arc<EndpointPool>,
        feed: Arc<dyn FeedAdapter>,
        broadcaster: Arc<dyn TradeBroadcaster>,
        ctx: Arc<ExecutionContext>,
        config: ExecutionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pool,
            feed,
            broadcaster,
            ctx,
            retry: RetryPolicy::from_config(&config),
            config,
            events,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Execution and error events. Lagging receivers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.events.subscribe()
    }

    pub fn validate(&self, request: &TradeRequest, mode: ValidationMode) -> Result<(), ExecutionError> {
        trade_validation::validate(request, mode, self.ctx.time.now_secs())?;
        Ok(())
    }

    /// Price a request without submitting anything. Single shot, no retry.
    pub async fn simulate(&self, request: &TradeRequest) -> Result<SimulationResult, ExecutionError> {
        self.validate(request, ValidationMode::Simulate)?;

        let pair = request.pair();
        let (book, fees) = tokio::try_join!(
            self.feed.get_order_book(&pair),
            self.feed.get_fee_data()
        )?;
        let quote = compute_fill(&book, request.amount_in, Side::Buy)?;

        let expected_output = quote.filled_price * request.amount_in;
        Ok(SimulationResult {
            expected_output,
            effective_price: quote.filled_price,
            price_impact_percent: quote.price_impact_percent,
            gas_cost: fees.current_gas_price * Decimal::from(self.config.estimated_gas_units),
            estimated_fees: expected_output * self.config.fee_rate,
        })
    }

    /// Run the request through the retry loop and fold the outcome into an
    /// `ExecutionResult`. Never panics on a failed trade.
    pub async fn execute(&self, request: &TradeRequest) -> ExecutionResult {
        let started = Instant::now();
        let (attempts, outcome) = self.run(request).await;
        metrics::observe_execution_latency(started.elapsed().as_secs_f64());

        let timestamp = self.ctx.time.now_millis();
        match outcome {
            Ok(report) => {
                metrics::inc_trade_outcome("completed");
                let _ = self.events.send(TradeEvent::Execution {
                    position: report.position.clone(),
                    transaction_hash: report.transaction_hash.clone(),
                    timestamp,
                });
                ExecutionResult {
                    success: true,
                    transaction_hash: Some(report.transaction_hash),
                    gas_used: Some(report.gas_used),
                    effective_price: Some(report.effective_price),
                    error: None,
                    error_kind: None,
                    attempts,
                    position: Some(report.position),
                }
            }
            Err(e) => {
                let kind = e.kind();
                metrics::inc_trade_outcome(kind.as_str());
                let _ = self.events.send(TradeEvent::Error {
                    pair: request.pair(),
                    error: e.to_string(),
                    kind,
                    timestamp,
                });
                ExecutionResult {
                    success: false,
                    transaction_hash: None,
                    gas_used: None,
                    effective_price: None,
                    error: Some(e.to_string()),
                    error_kind: Some(kind),
                    attempts,
                    position: None,
                }
            }
        }
    }

    /// Same as `execute` but with a typed error and no event emission.
    pub async fn try_execute(&self, request: &TradeRequest) -> Result<ExecutionReport, ExecutionError> {
        self.run(request).await.1
    }

    async fn run(&self, request: &TradeRequest) -> (u32, Result<ExecutionReport, ExecutionError>) {
        let trade_id = self.ctx.id.new_id();
        let mut number = 0;

        loop {
            number += 1;
            match self.attempt(request, number).await {
                Ok(report) => {
                    info!(
                        trade_id = %trade_id,
                        tx = %report.transaction_hash,
                        "✅ Trade executed: {} {} @ {}",
                        request.amount_in,
                        report.position.pair,
                        report.effective_price
                    );
                    return (number, Ok(report));
                }
                Err(e) if self.retry.should_retry(number, &e) => {
                    metrics::inc_retries();
                    warn!(
                        trade_id = %trade_id,
                        attempt = number,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Execution attempt failed, retrying in {:?}",
                        self.retry.delay
                    );
                    self.ctx.delay.sleep(self.retry.delay).await;
                }
                Err(e) if e.is_retryable() => {
                    error!(trade_id = %trade_id, attempts = number, "❌ Trade execution failed: {}", e);
                    return (
                        number,
                        Err(ExecutionError::Exhausted {
                            attempts: number,
                            source: Box::new(e),
                        }),
                    );
                }
                Err(e) => {
                    warn!(trade_id = %trade_id, attempt = number, "⛔ Trade rejected: {}", e);
                    return (number, Err(e));
                }
            }
        }
    }

    async fn attempt(&self, request: &TradeRequest, number: u32) -> Result<ExecutionReport, ExecutionError> {
        let mut attempt = TradeAttempt::new(number);

        // Deadline is re-checked on every attempt.
        if let Err(e) = self.validate(request, ValidationMode::Execute) {
            return end(&mut attempt, TradeState::Rejected, e);
        }

        attempt.advance(TradeState::Quoting)?;
        let quote = match self.quote(request).await {
            Ok(quote) => quote,
            Err(e) => return end(&mut attempt, TradeState::Failed, e),
        };

        attempt.advance(TradeState::ImpactCheck)?;
        metrics::observe_price_impact(quote.price_impact_percent.to_f64().unwrap_or_default());
        if quote.price_impact_percent > request.max_slippage_percent {
            let e = ExecutionError::SlippageExceeded {
                impact: quote.price_impact_percent,
                max: request.max_slippage_percent,
            };
            return end(&mut attempt, TradeState::Rejected, e);
        }
        if let Err(e) = trade_validation::check_deadline(request, self.ctx.time.now_secs()) {
            return end(&mut attempt, TradeState::Rejected, e.into());
        }

        let expected_output = quote.filled_price * request.amount_in;
        if expected_output < request.min_amount_out {
            warn!(
                expected = %expected_output,
                min = %request.min_amount_out,
                "Quoted output below min_amount_out"
            );
        }

        attempt.advance(TradeState::Executing)?;
        let endpoint = match self.pool.select() {
            Ok(endpoint) => endpoint,
            Err(e) => return end(&mut attempt, TradeState::Failed, e.into()),
        };

        let trade = PricedTrade {
            request: request.clone(),
            side: Side::Buy,
            quote,
            expected_output,
            gas_limit: self.config.estimated_gas_units,
        };
        let provider = endpoint.provider();
        let submitted = self.broadcaster.submit(provider.as_ref(), &trade).await;

        match &submitted {
            Ok(_) => self.pool.record_outcome(&endpoint, true),
            Err(BroadcastError::Provider(_)) => self.pool.record_outcome(&endpoint, false),
            // Signing happens before the endpoint is contacted.
            Err(BroadcastError::Signer(_)) => {}
        }

        let submission = match submitted {
            Ok(submission) => submission,
            Err(e) => return end(&mut attempt, TradeState::Failed, e.into()),
        };
        attempt.advance(TradeState::Completed)?;

        Ok(ExecutionReport {
            transaction_hash: submission.transaction_hash,
            gas_used: submission.gas_used.unwrap_or(self.config.estimated_gas_units),
            effective_price: quote.filled_price,
            price_impact_percent: quote.price_impact_percent,
            endpoint_url: endpoint.url().to_string(),
            attempts: number,
            position: Position {
                pair: request.pair(),
                amount: request.amount_in,
                entry_price: quote.filled_price,
                timestamp: self.ctx.time.now_millis(),
                position_type: PositionType::Market,
                status: PositionStatus::Open,
            },
        })
    }

    async fn quote(&self, request: &TradeRequest) -> Result<FillQuote, ExecutionError> {
        let book = self.feed.get_order_book(&request.pair()).await?;
        Ok(compute_fill(&book, request.amount_in, Side::Buy)?)
    }
}

fn end<T>(attempt: &mut TradeAttempt, to: TradeState, error: ExecutionError) -> Result<T, ExecutionError> {
    attempt.advance(to)?;
    Err(error)
}
