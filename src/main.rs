use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dex_execution_rs::broadcast::{HttpTradeSigner, RpcBroadcaster};
use dex_execution_rs::config::{LogConfig, Settings};
use dex_execution_rs::context::ExecutionContext;
use dex_execution_rs::engine::ExecutionEngine;
use dex_execution_rs::market_data::feed::RestDepthFeed;
use dex_execution_rs::model::TradeEvent;
use dex_execution_rs::rpc::EndpointPool;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();

    let settings = Settings::new()?;
    init_tracing(&settings.log);

    info!("╔═══════════════════════════════════════════════════════════════╗");
    info!("║               DEX EXECUTION RS                                ║");
    info!("║               Multi-endpoint Swap Execution Engine            ║");
    info!("╚═══════════════════════════════════════════════════════════════╝");

    let ctx = Arc::new(ExecutionContext::new_system());

    let pool = Arc::new(EndpointPool::connect(&settings, ctx.clone())?);
    pool.start_health_checks();

    let feed = Arc::new(RestDepthFeed::new(&settings.feed, pool.clone(), ctx.clone())?);
    let signer = HttpTradeSigner::new(&settings.signer)?;
    let engine = Arc::new(ExecutionEngine::new(
        pool.clone(),
        feed,
        Arc::new(RpcBroadcaster::new(signer)),
        ctx.clone(),
        settings.execution.clone(),
    ));
    info!(
        endpoints = pool.endpoints().len(),
        venues = settings.feed.venues.len(),
        "✅ Core components initialized"
    );

    // --- Trade event logger ---
    let mut events = engine.subscribe();
    let events_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TradeEvent::Execution {
                    position,
                    transaction_hash,
                    ..
                }) => {
                    info!(tx = %transaction_hash, "📈 Position opened: {} {} @ {}", position.amount, position.pair, position.entry_price);
                }
                Ok(TradeEvent::Error { pair, error, kind, .. }) => {
                    warn!(pair = %pair, kind = kind.as_str(), "Trade failed: {}", error);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Trade event logger lagged, {} events skipped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // --- Pool heartbeat ---
    let heartbeat_pool = pool.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let statuses = heartbeat_pool.statuses();
            let alive = statuses.iter().filter(|status| status.alive).count();
            info!("💓 Endpoint pool: {}/{} alive", alive, statuses.len());
            for status in statuses.iter().filter(|status| !status.alive) {
                warn!(
                    url = %status.url,
                    failures = status.consecutive_failures,
                    "Endpoint marked dead"
                );
            }
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutdown signal received"),
        Err(e) => error!("❌ Failed to listen for shutdown signal: {}", e),
    }

    pool.shutdown();
    heartbeat_handle.abort();
    drop(engine);
    let _ = events_handle.await;

    info!("Shutdown complete");
    Ok(())
}
