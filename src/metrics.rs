//! Process-wide Prometheus metrics, registered the way the teacher
//! registers `HTTP_COUNTER`/`HTTP_REQ_HISTOGRAM`/`NODE_REST_COUNTER` in
//! `lib.rs`: `lazy_static!` statics built with `register_*_vec!` against
//! the default registry.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// One increment per provider call attempt, labeled by operation
    /// (`get_transaction`, `get_address_meta`, `get_incoming_transactions`).
    pub static ref PROVIDER_REQUESTS: CounterVec = register_counter_vec!(
        "kyt_provider_requests",
        "Number of requests issued to the upstream blockchain data provider.",
        &["operation"]
    )
    .unwrap();

    /// Latency of one provider call attempt, including time spent paced
    /// by the rate limiter but not the retry loop around it.
    pub static ref PROVIDER_LATENCY: HistogramVec = register_histogram_vec!(
        "kyt_provider_request_duration_seconds",
        "Provider request latency in seconds.",
        &["operation"]
    )
    .unwrap();

    /// One increment per completed analysis, labeled by chain and final
    /// risk level.
    pub static ref ANALYSES_COMPLETED: CounterVec = register_counter_vec!(
        "kyt_analyses_completed",
        "Number of analyses completed, by chain and resulting risk level.",
        &["chain", "risk_level"]
    )
    .unwrap();

    /// Wall-clock duration of a whole `analyze` call, cache hits included.
    pub static ref ANALYSIS_LATENCY: HistogramVec = register_histogram_vec!(
        "kyt_analysis_duration_seconds",
        "Whole-analysis latency in seconds.",
        &["chain"]
    )
    .unwrap();

    /// Cache hit/miss counts, labeled by cache name (`tx`, `address`,
    /// `report`) and outcome (`hit`, `miss`).
    pub static ref CACHE_OUTCOMES: CounterVec = register_counter_vec!(
        "kyt_cache_outcomes",
        "Cache lookups, by cache name and outcome.",
        &["cache", "outcome"]
    )
    .unwrap();
}
