use std::sync::{Arc, Weak};

use futures::future::join_all;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::{CircuitBreaker, Trip};
use crate::config::{PoolConfig, Settings};
use crate::context::ExecutionContext;
use crate::metrics;
use crate::rate_limiter::SlidingWindow;
use crate::rpc::provider::{EthersRpcProvider, ProviderError, RpcProvider};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("No healthy RPC endpoints available")]
    NoHealthyEndpoint,
    #[error("Invalid pool configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Stable arena index of an endpoint inside its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EndpointId(pub usize);

struct EndpointState {
    breaker: CircuitBreaker,
    requests: SlidingWindow,
}

/// One remote node. Identity fields are immutable; health and the request
/// window live behind the endpoint's own lock.
pub struct Endpoint {
    id: EndpointId,
    url: String,
    weight: f64,
    provider: Arc<dyn RpcProvider>,
    state: Mutex<EndpointState>,
}

impl Endpoint {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn provider(&self) -> Arc<dyn RpcProvider> {
        self.provider.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().breaker.is_alive()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().breaker.consecutive_failures()
    }

    fn is_eligible(&self, now_ms: i64) -> bool {
        let mut state = self.state.lock();
        state.breaker.is_alive() && !state.requests.is_limited(now_ms)
    }

    /// Re-check eligibility and stamp the request under one lock.
    fn try_claim(&self, now_ms: i64) -> bool {
        let mut state = self.state.lock();
        if !state.breaker.is_alive() || state.requests.is_limited(now_ms) {
            return false;
        }
        state.requests.record(now_ms);
        true
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("weight", &self.weight)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EndpointStatus {
    pub id: EndpointId,
    pub url: String,
    pub weight: f64,
    pub consecutive_failures: u32,
    pub last_failure_ms: Option<i64>,
    pub alive: bool,
    pub requests_in_window: usize,
}

struct HealthTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Weighted, health-aware set of RPC endpoints.
///
/// Selection scans endpoints one lock at a time; there is no pool-wide lock
/// around endpoint state. The endpoint set is fixed at construction.
pub struct EndpointPool {
    endpoints: Vec<Arc<Endpoint>>,
    config: PoolConfig,
    ctx: Arc<ExecutionContext>,
    seeded_rng: Option<Mutex<StdRng>>,
    health_task: Mutex<Option<HealthTask>>,
}

impl EndpointPool {
    pub fn new(
        config: PoolConfig,
        providers: Vec<(Arc<dyn RpcProvider>, f64)>,
        ctx: Arc<ExecutionContext>,
    ) -> Result<Self, PoolError> {
        if providers.is_empty() {
            return Err(PoolError::Config("no endpoints configured".into()));
        }

        let mut endpoints = Vec::with_capacity(providers.len());
        for (idx, (provider, weight)) in providers.into_iter().enumerate() {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(PoolError::Config(format!(
                    "endpoint {} has non-positive weight {}",
                    provider.url(),
                    weight
                )));
            }
            endpoints.push(Arc::new(Endpoint {
                id: EndpointId(idx),
                url: provider.url().to_string(),
                weight,
                provider,
                state: Mutex::new(EndpointState {
                    breaker: CircuitBreaker::new(
                        config.max_failures,
                        config.failure_reset_window_ms,
                    ),
                    requests: SlidingWindow::new(
                        config.rate_limit_window_ms,
                        config.rate_limit_max_requests,
                    ),
                }),
            }));
        }

        let total_weight: f64 = endpoints.iter().map(|endpoint| endpoint.weight).sum();
        if !total_weight.is_finite() {
            return Err(PoolError::Config(format!(
                "total endpoint weight {} is not finite",
                total_weight
            )));
        }

        metrics::add_alive_endpoints(endpoints.len() as i64);
        info!("🔌 Endpoint pool ready with {} endpoints", endpoints.len());

        Ok(Self {
            endpoints,
            config,
            ctx,
            seeded_rng: None,
            health_task: Mutex::new(None),
        })
    }

    /// Build one ethers HTTP provider per configured URL.
    pub fn connect(settings: &Settings, ctx: Arc<ExecutionContext>) -> Result<Self, PoolError> {
        let timeout = settings.pool.request_timeout();
        let mut providers: Vec<(Arc<dyn RpcProvider>, f64)> = Vec::new();
        for endpoint in &settings.endpoints {
            let provider = EthersRpcProvider::new(&endpoint.url, timeout)?;
            providers.push((Arc::new(provider), endpoint.weight));
        }
        Self::new(settings.pool.clone(), providers, ctx)
    }

    /// Use a deterministic random source for selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeded_rng = Some(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn get(&self, id: EndpointId) -> Option<&Arc<Endpoint>> {
        self.endpoints.get(id.0)
    }

    fn draw(&self, upper: f64) -> f64 {
        match &self.seeded_rng {
            Some(rng) => rng.lock().gen_range(0.0..upper),
            None => rand::thread_rng().gen_range(0.0..upper),
        }
    }

    /// Weighted draw over endpoints that are alive and under their rate
    /// limit. Nothing is stamped.
    fn pick_eligible(&self, now: i64) -> Option<Arc<Endpoint>> {
        let eligible: Vec<&Arc<Endpoint>> = self
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.is_eligible(now))
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let total: f64 = eligible.iter().map(|endpoint| endpoint.weight).sum();
        let draw = self.draw(total);
        let idx = weighted_index(eligible.iter().map(|endpoint| endpoint.weight), draw);
        Some(eligible[idx].clone())
    }

    /// Weighted random choice among endpoints that are alive and under their
    /// rate limit. The chosen endpoint's request window is stamped.
    pub fn select(&self) -> Result<Arc<Endpoint>, PoolError> {
        // A concurrent select can fill the chosen endpoint's window between
        // the scan and the claim; rescan when that happens.
        for _ in 0..=self.endpoints.len() {
            let now = self.ctx.time.now_millis();
            let Some(chosen) = self.pick_eligible(now) else {
                break;
            };

            if chosen.try_claim(now) {
                metrics::inc_selections();
                debug!(url = %chosen.url, "selected endpoint");
                return Ok(chosen);
            }
        }

        metrics::inc_no_healthy_endpoint();
        warn!("⚠️ No healthy RPC endpoints available");
        Err(PoolError::NoHealthyEndpoint)
    }

    pub fn record_outcome(&self, endpoint: &Endpoint, success: bool) {
        let now = self.ctx.time.now_millis();
        let mut state = endpoint.state.lock();

        if success {
            if state.breaker.record_success() {
                metrics::endpoint_recovered();
                info!(url = %endpoint.url, "✅ RPC endpoint recovered");
            }
            return;
        }

        metrics::inc_endpoint_failures();
        match state.breaker.record_failure(now) {
            Trip::Tripped => {
                metrics::endpoint_marked_dead();
                error!(
                    url = %endpoint.url,
                    failures = state.breaker.consecutive_failures(),
                    "🚨 RPC endpoint marked as dead after {} failures",
                    self.config.max_failures
                );
            }
            Trip::Counted | Trip::AlreadyOpen => {
                debug!(
                    url = %endpoint.url,
                    failures = state.breaker.consecutive_failures(),
                    "endpoint failure recorded"
                );
            }
        }
    }

    pub fn is_rate_limited(&self, endpoint: &Endpoint) -> bool {
        let now = self.ctx.time.now_millis();
        endpoint.state.lock().requests.is_limited(now)
    }

    /// Probe every endpoint, dead ones included, and feed the results into
    /// `record_outcome`.
    pub async fn run_health_checks(&self) {
        let timeout = self.config.request_timeout();
        let probes = self.endpoints.iter().map(|endpoint| async move {
            let result =
                match tokio::time::timeout(timeout, endpoint.provider.latest_block_height()).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Network(format!(
                        "health probe timed out after {:?}",
                        timeout
                    ))),
                };
            (endpoint, result)
        });

        for (endpoint, result) in join_all(probes).await {
            match result {
                Ok(height) => {
                    debug!(url = %endpoint.url, height, "health probe ok");
                    self.record_outcome(endpoint, true);
                }
                Err(e) => {
                    warn!(url = %endpoint.url, error = %e, "health probe failed");
                    self.record_outcome(endpoint, false);
                }
            }
        }
        metrics::inc_health_check_runs();
    }

    /// Spawn the periodic health-check task. A second call is a no-op.
    pub fn start_health_checks(self: &Arc<Self>) {
        let mut guard = self.health_task.lock();
        if guard.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let pool: Weak<Self> = Arc::downgrade(self);
        let period = self.config.health_check_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; checks start one period in.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(pool) = pool.upgrade() else { break };
                        pool.run_health_checks().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("health check task stopped");
        });

        info!("🩺 Health checks every {:?}", period);
        *guard = Some(HealthTask {
            stop: stop_tx,
            handle,
        });
    }

    pub fn is_health_check_running(&self) -> bool {
        self.health_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Stop the periodic health-check task. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if let Some(task) = self.health_task.lock().take() {
            let _ = task.stop.send(true);
            info!("Endpoint pool health checks stopped");
        }
    }

    /// Read-only call for quoting paths. Routed like `select`, but the
    /// endpoint's request window and failure count are left untouched.
    pub async fn read(&self, method: &str, params: Value) -> Result<Value, PoolError> {
        let endpoint = self
            .pick_eligible(self.ctx.time.now_millis())
            .ok_or(PoolError::NoHealthyEndpoint)?;
        endpoint
            .provider
            .request(method, params)
            .await
            .map_err(PoolError::from)
    }

    /// Select an endpoint, issue one JSON-RPC call and record the outcome.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, PoolError> {
        let endpoint = self.select()?;
        let result = endpoint.provider.request(method, params).await;
        self.record_outcome(&endpoint, result.is_ok());
        result.map_err(PoolError::from)
    }

    pub fn statuses(&self) -> Vec<EndpointStatus> {
        let now = self.ctx.time.now_millis();
        self.endpoints
            .iter()
            .map(|endpoint| {
                let mut state = endpoint.state.lock();
                state.requests.prune(now);
                EndpointStatus {
                    id: endpoint.id,
                    url: endpoint.url.clone(),
                    weight: endpoint.weight,
                    consecutive_failures: state.breaker.consecutive_failures(),
                    last_failure_ms: state.breaker.last_failure_ms(),
                    alive: state.breaker.is_alive(),
                    requests_in_window: state.requests.len(),
                }
            })
            .collect()
    }
}

impl Drop for EndpointPool {
    fn drop(&mut self) {
        if let Some(task) = self.health_task.get_mut().take() {
            let _ = task.stop.send(true);
        }
    }
}

/// Subtract weights in order from `draw` and return the first index where
/// the remainder reaches zero. Falls back to the first entry when rounding
/// leaves a positive remainder.
fn weighted_index(weights: impl Iterator<Item = f64>, mut draw: f64) -> usize {
    for (idx, weight) in weights.enumerate() {
        draw -= weight;
        if draw <= 0.0 {
            return idx;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimulatedTimeProvider;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockProvider {
        url: String,
        healthy: AtomicBool,
        probes: AtomicUsize,
    }

    impl MockProvider {
        fn new(url: &str) -> Arc<Self> {
            Arc::new(Self {
                url: url.to_string(),
                healthy: AtomicBool::new(true),
                probes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RpcProvider for MockProvider {
        fn url(&self) -> &str {
            &self.url
        }

        async fn latest_block_height(&self) -> Result<u64, ProviderError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(19_000_000)
            } else {
                Err(ProviderError::Network("connection refused".into()))
            }
        }

        async fn request(&self, method: &str, _params: Value) -> Result<Value, ProviderError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(json!({ "method": method }))
            } else {
                Err(ProviderError::Rpc("503".into()))
            }
        }
    }

    fn pool_with(
        weights: &[f64],
    ) -> (EndpointPool, Vec<Arc<MockProvider>>, Arc<SimulatedTimeProvider>) {
        let (ctx, clock, _) = ExecutionContext::new_simulated(1_700_000_000_000);
        let mocks: Vec<Arc<MockProvider>> = (0..weights.len())
            .map(|i| MockProvider::new(&format!("https://node-{}.example.org", i)))
            .collect();
        let providers = mocks
            .iter()
            .zip(weights)
            .map(|(mock, weight)| (mock.clone() as Arc<dyn RpcProvider>, *weight))
            .collect();
        let pool = EndpointPool::new(PoolConfig::default(), providers, Arc::new(ctx))
            .unwrap()
            .with_seed(7);
        (pool, mocks, clock)
    }

    #[test]
    fn test_weighted_index() {
        let weights = [1.0, 1.0, 2.0];
        assert_eq!(weighted_index(weights.iter().copied(), 0.0), 0);
        assert_eq!(weighted_index(weights.iter().copied(), 1.0), 0);
        assert_eq!(weighted_index(weights.iter().copied(), 1.5), 1);
        assert_eq!(weighted_index(weights.iter().copied(), 3.99), 2);
        assert_eq!(weighted_index(weights.iter().copied(), 4.5), 0);
    }

    #[test]
    fn test_rejects_bad_weights() {
        let (ctx, _, _) = ExecutionContext::new_simulated(0);
        let provider = MockProvider::new("https://a.example.org") as Arc<dyn RpcProvider>;
        let result = EndpointPool::new(PoolConfig::default(), vec![(provider, 0.0)], Arc::new(ctx));
        assert!(matches!(result, Err(PoolError::Config(_))));
    }

    #[test]
    fn test_rejects_overflowing_total_weight() {
        let (ctx, _, _) = ExecutionContext::new_simulated(0);
        let providers = vec![
            (MockProvider::new("https://a.example.org") as Arc<dyn RpcProvider>, f64::MAX),
            (MockProvider::new("https://b.example.org") as Arc<dyn RpcProvider>, f64::MAX),
        ];
        let result = EndpointPool::new(PoolConfig::default(), providers, Arc::new(ctx));
        assert!(matches!(result, Err(PoolError::Config(msg)) if msg.contains("not finite")));
    }

    #[test]
    fn test_three_failures_within_window_kill_endpoint() {
        let (pool, _, clock) = pool_with(&[1.0]);
        let endpoint = pool.endpoints()[0].clone();

        for _ in 0..3 {
            pool.record_outcome(&endpoint, false);
            clock.advance(1_000);
        }

        assert!(!endpoint.is_alive());
        assert_eq!(pool.select().unwrap_err(), PoolError::NoHealthyEndpoint);
    }

    #[test]
    fn test_failures_beyond_reset_window_stay_alive() {
        let (pool, _, clock) = pool_with(&[1.0]);
        let endpoint = pool.endpoints()[0].clone();
        let window = PoolConfig::default().failure_reset_window_ms;

        for _ in 0..3 {
            pool.record_outcome(&endpoint, false);
            clock.advance(window + 1);
        }

        assert!(endpoint.is_alive());
        assert_eq!(endpoint.consecutive_failures(), 1);
    }

    #[test]
    fn test_success_resets_failures() {
        let (pool, _, _) = pool_with(&[1.0]);
        let endpoint = pool.endpoints()[0].clone();
        for _ in 0..5 {
            pool.record_outcome(&endpoint, false);
        }
        assert!(!endpoint.is_alive());

        pool.record_outcome(&endpoint, true);
        assert!(endpoint.is_alive());
        assert_eq!(endpoint.consecutive_failures(), 0);
    }

    #[test]
    fn test_rate_limited_endpoint_is_skipped_until_window_passes() {
        let (pool, _, clock) = pool_with(&[1.0, 1.0]);
        let first = pool.endpoints()[0].clone();
        let second = pool.endpoints()[1].clone();

        // Kill the second endpoint so every selection lands on the first.
        for _ in 0..3 {
            pool.record_outcome(&second, false);
        }

        for _ in 0..100 {
            assert_eq!(pool.select().unwrap().id(), first.id());
        }
        assert!(pool.is_rate_limited(&first));
        assert_eq!(pool.select().unwrap_err(), PoolError::NoHealthyEndpoint);

        clock.advance(60_000);
        assert!(!pool.is_rate_limited(&first));
        assert_eq!(pool.select().unwrap().id(), first.id());
    }

    #[test]
    fn test_weighted_selection_frequencies() {
        let (pool, _, clock) = pool_with(&[1.0, 1.0, 2.0]);
        let trials = 40_000;
        let mut counts = [0usize; 3];

        for i in 0..trials {
            // Stay clear of the per-endpoint rate limit.
            if i % 50 == 0 {
                clock.advance(60_000);
            }
            counts[pool.select().unwrap().id().0] += 1;
        }

        let expected = [0.25, 0.25, 0.5];
        for (count, want) in counts.iter().zip(expected) {
            let freq = *count as f64 / trials as f64;
            assert!((freq - want).abs() < 0.02, "freq {} vs {}", freq, want);
        }
    }

    #[test]
    fn test_statuses_report_window() {
        let (pool, _, _) = pool_with(&[1.0]);
        pool.select().unwrap();
        pool.select().unwrap();
        let statuses = pool.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].requests_in_window, 2);
        assert!(statuses[0].alive);
    }

    #[tokio::test]
    async fn test_health_checks_revive_and_kill() {
        let (pool, mocks, _) = pool_with(&[1.0, 1.0]);
        let dead = pool.endpoints()[0].clone();
        for _ in 0..3 {
            pool.record_outcome(&dead, false);
        }
        assert!(!dead.is_alive());

        mocks[1].healthy.store(false, Ordering::SeqCst);
        for _ in 0..3 {
            pool.run_health_checks().await;
        }

        assert!(dead.is_alive(), "dead endpoint should recover via health check");
        assert!(!pool.endpoints()[1].is_alive());
        assert_eq!(mocks[0].probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_request_records_outcome() {
        let (pool, mocks, _) = pool_with(&[1.0]);
        assert!(pool.request("eth_chainId", json!([])).await.is_ok());

        mocks[0].healthy.store(false, Ordering::SeqCst);
        let err = pool.request("eth_chainId", json!([])).await.unwrap_err();
        assert!(matches!(err, PoolError::Provider(ProviderError::Rpc(_))));
        assert_eq!(pool.endpoints()[0].consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_read_leaves_endpoint_state_untouched() {
        let (pool, mocks, _) = pool_with(&[1.0]);
        let before = pool.statuses();

        assert!(pool.read("eth_gasPrice", json!([])).await.is_ok());
        mocks[0].healthy.store(false, Ordering::SeqCst);
        for _ in 0..5 {
            assert!(pool.read("eth_gasPrice", json!([])).await.is_err());
        }

        assert_eq!(pool.statuses(), before);
        assert!(pool.endpoints()[0].is_alive());
    }

    #[tokio::test]
    async fn test_read_skips_dead_endpoints() {
        let (pool, _, _) = pool_with(&[1.0]);
        let endpoint = pool.endpoints()[0].clone();
        for _ in 0..3 {
            pool.record_outcome(&endpoint, false);
        }
        assert_eq!(
            pool.read("eth_gasPrice", json!([])).await.unwrap_err(),
            PoolError::NoHealthyEndpoint
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_health_checks_and_shutdown() {
        let (pool, mocks, _) = pool_with(&[1.0]);
        let pool = Arc::new(pool);

        pool.start_health_checks();
        pool.start_health_checks();
        assert!(pool.is_health_check_running());

        tokio::time::sleep(std::time::Duration::from_millis(30_000 * 2 + 100)).await;
        assert_eq!(mocks[0].probes.load(Ordering::SeqCst), 2);

        pool.shutdown();
        pool.shutdown();
        tokio::time::sleep(std::time::Duration::from_millis(30_000 * 3)).await;
        assert_eq!(mocks[0].probes.load(Ordering::SeqCst), 2);
        assert!(!pool.is_health_check_running());
    }
}
