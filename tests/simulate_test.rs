//! Simulation over the production feed wiring: depth from a venue REST API,
//! fee data read through the endpoint pool.

use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dex_execution_rs::broadcast::{BroadcastError, PricedTrade, Submission, TradeBroadcaster};
use dex_execution_rs::config::{ExecutionConfig, FeedConfig, PoolConfig, VenueConfig};
use dex_execution_rs::context::ExecutionContext;
use dex_execution_rs::engine::{ErrorKind, ExecutionEngine};
use dex_execution_rs::market_data::feed::RestDepthFeed;
use dex_execution_rs::model::TradeRequest;
use dex_execution_rs::rpc::{EndpointPool, ProviderError, RpcProvider};

const START_MS: i64 = 1_700_000_000_000;

struct FeeNode {
    up: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl RpcProvider for FeeNode {
    fn url(&self) -> &str {
        "https://fees.example.org"
    }

    async fn latest_block_height(&self) -> Result<u64, ProviderError> {
        Ok(19_000_000)
    }

    async fn request(&self, method: &str, _params: Value) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.up.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("connection reset".into()));
        }
        match method {
            "eth_gasPrice" => Ok(json!("0x4a817c800")),
            "eth_maxPriorityFeePerGas" => Ok(json!("0x77359400")),
            "eth_getBlockByNumber" => Ok(json!({ "baseFeePerGas": "0x430e23400" })),
            _ => Ok(json!("0xfeed")),
        }
    }
}

struct AcceptAll;

#[async_trait]
impl TradeBroadcaster for AcceptAll {
    async fn submit(
        &self,
        _provider: &dyn RpcProvider,
        trade: &PricedTrade,
    ) -> Result<Submission, BroadcastError> {
        Ok(Submission {
            transaction_hash: "0xfeed".into(),
            gas_used: Some(trade.gas_limit),
        })
    }
}

async fn depth_venue() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/depth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bids": [["2499", "4"]],
            "asks": [["2500", "5"], ["2510", "5"]]
        })))
        .mount(&server)
        .await;
    server
}

fn wire(server: &MockServer, node: Arc<FeeNode>) -> (ExecutionEngine, Arc<EndpointPool>) {
    let ctx = Arc::new(ExecutionContext::new_simulated(START_MS).0);
    let pool = Arc::new(
        EndpointPool::new(
            PoolConfig::default(),
            vec![(node as Arc<dyn RpcProvider>, 1.0)],
            ctx.clone(),
        )
        .expect("pool"),
    );
    let feed_config = FeedConfig {
        venues: vec![VenueConfig {
            name: "local".into(),
            base_url: server.uri(),
        }],
        ..FeedConfig::default()
    };
    let feed = RestDepthFeed::new(&feed_config, pool.clone(), ctx.clone()).expect("feed");
    let engine = ExecutionEngine::new(
        pool.clone(),
        Arc::new(feed),
        Arc::new(AcceptAll),
        ctx,
        ExecutionConfig::default(),
    );
    (engine, pool)
}

fn request() -> TradeRequest {
    TradeRequest::with_default_deadline(
        "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
        "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        dec!(6),
        dec!(1),
        dec!(1),
        START_MS / 1000,
        1200,
    )
}

#[tokio::test]
async fn test_repeated_simulation_leaves_pool_untouched() {
    let server = depth_venue().await;
    let node = Arc::new(FeeNode {
        up: AtomicBool::new(true),
        calls: AtomicUsize::new(0),
    });
    let (engine, pool) = wire(&server, node.clone());
    let before = pool.statuses();

    // Well past the point where three stamps per call would fill a
    // 100-request window.
    for _ in 0..50 {
        let sim = tokio_test::assert_ok!(engine.simulate(&request()).await);
        // 5 @ 2500 + 1 @ 2510
        assert_eq!(sim.effective_price.round_dp(6), dec!(2501.666667));
        assert_eq!(sim.gas_cost, dec!(3000000000000000));
    }

    assert_eq!(node.calls.load(Ordering::SeqCst), 150);
    assert_eq!(pool.statuses(), before);
    assert!(!pool.is_rate_limited(&pool.endpoints()[0]));

    let result = engine.execute(&request()).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(pool.statuses()[0].requests_in_window, 1);
}

#[tokio::test]
async fn test_failed_fee_reads_do_not_count_against_endpoint() {
    let server = depth_venue().await;
    let node = Arc::new(FeeNode {
        up: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
    });
    let (engine, pool) = wire(&server, node);

    for _ in 0..5 {
        let err = engine.simulate(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeedUnavailable);
    }

    let status = &pool.statuses()[0];
    assert!(status.alive);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.requests_in_window, 0);
}
