pub mod broadcast;
pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod engine;
pub mod impact_calculator;
pub mod market_data;
pub mod metrics;
pub mod model;
pub mod rate_limiter;
pub mod rpc;
pub mod trade_validation;
