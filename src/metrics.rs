use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

// --- Endpoint Pool ---

pub static ENDPOINT_SELECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "dex_execution_endpoint_selections_total",
        "Total successful endpoint selections"
    )
    .expect("endpoint_selections counter")
});

pub static NO_HEALTHY_ENDPOINT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "dex_execution_no_healthy_endpoint_total",
        "Selections that found no eligible endpoint"
    )
    .expect("no_healthy_endpoint counter")
});

pub static ENDPOINT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "dex_execution_endpoint_failures_total",
        "Failed requests or probes reported against endpoints"
    )
    .expect("endpoint_failures counter")
});

pub static ENDPOINT_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "dex_execution_endpoint_transitions_total",
        "Endpoint liveness transitions",
        &["to"]
    )
    .expect("endpoint_transitions counter")
});

pub static ALIVE_ENDPOINTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "dex_execution_alive_endpoints",
        "Endpoints currently marked alive"
    )
    .expect("alive_endpoints gauge")
});

pub static HEALTH_CHECK_RUNS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "dex_execution_health_check_runs_total",
        "Completed health-check sweeps"
    )
    .expect("health_check_runs counter")
});

// --- Execution ---

pub static TRADE_EXECUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "dex_execution_trades_total",
        "Trade executions by outcome",
        &["outcome"]
    )
    .expect("trades counter")
});

pub static EXECUTION_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "dex_execution_retries_total",
        "Execution attempts retried after a transient failure"
    )
    .expect("retries counter")
});

pub static PRICE_IMPACT_PCT: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "dex_execution_price_impact_percent",
        "Quoted price impact in percent",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]
    )
    .expect("price_impact histogram")
});

pub static EXECUTION_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "dex_execution_latency_seconds",
        "End-to-end execute latency (request -> result)",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("execution_latency histogram")
});

pub fn inc_selections() {
    ENDPOINT_SELECTIONS.inc();
}

pub fn inc_no_healthy_endpoint() {
    NO_HEALTHY_ENDPOINT.inc();
}

pub fn inc_endpoint_failures() {
    ENDPOINT_FAILURES.inc();
}

pub fn endpoint_marked_dead() {
    ENDPOINT_TRANSITIONS.with_label_values(&["dead"]).inc();
    ALIVE_ENDPOINTS.dec();
}

pub fn endpoint_recovered() {
    ENDPOINT_TRANSITIONS.with_label_values(&["alive"]).inc();
    ALIVE_ENDPOINTS.inc();
}

pub fn add_alive_endpoints(count: i64) {
    ALIVE_ENDPOINTS.add(count);
}

pub fn inc_health_check_runs() {
    HEALTH_CHECK_RUNS.inc();
}

pub fn inc_trade_outcome(outcome: &str) {
    TRADE_EXECUTIONS.with_label_values(&[outcome]).inc();
}

pub fn inc_retries() {
    EXECUTION_RETRIES.inc();
}

pub fn observe_price_impact(percent: f64) {
    PRICE_IMPACT_PCT.observe(percent);
}

pub fn observe_execution_latency(duration_sec: f64) {
    EXECUTION_LATENCY.observe(duration_sec);
}

/// Render the default registry in the text exposition format.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
