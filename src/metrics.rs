use lazy_static::lazy_static;
use prometheus::{
    Histogram, IntCounter, IntCounterVec, IntGauge, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge,
};

// Registration only fails on duplicate names, which is a startup bug
lazy_static! {
    pub static ref GUARD_DECISIONS: IntCounterVec = register_int_counter_vec!(
        "guard_decisions_total",
        "Guard decisions by operation class and outcome",
        &["class", "decision"]
    )
    .unwrap();
    pub static ref TOKENS_ISSUED: IntCounter =
        register_int_counter!("guard_tokens_issued_total", "CSRF tokens issued").unwrap();
    pub static ref COUNTER_ENTRIES: IntGauge =
        register_int_gauge!("guard_counter_entries", "Live rate limit counters").unwrap();
    pub static ref TOKEN_ENTRIES: IntGauge =
        register_int_gauge!("guard_token_entries", "Live CSRF tokens").unwrap();
    pub static ref SWEPT_ENTRIES: IntCounter =
        register_int_counter!("guard_swept_entries_total", "Entries removed by sweeps").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "guard_upstream_latency_seconds",
        "Upstream request latency in seconds"
    )
    .unwrap();
}
