//! Typed configuration: CLI flags with environment-variable fallback, in
//! the style of the teacher's `Arguments` (`clap::Parser` with `env` on
//! every field), plus an optional TOML file overlay applied before CLI/env
//! take over — the configuration table in the engine design (`provider.*`,
//! `cache.*`, `trace.*`, `score.*`) reads naturally as a TOML document.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::Error;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Know-Your-Transaction tracing and risk-scoring engine")]
pub struct Arguments {
    /// Chain to analyze, e.g. `bitcoin` or `ethereum`.
    #[arg()]
    pub chain: String,

    /// Root transaction id to trace upstream from.
    #[arg()]
    pub tx_id: String,

    /// BFS depth for this analysis; falls back to `trace_default_depth`
    /// (clamped to `trace_max_depth`) when omitted.
    #[arg()]
    pub depth: Option<u32>,

    /// Upstream blockchain data provider root, e.g. https://api.example.com
    #[arg(long, env)]
    pub provider_base_url: String,

    /// Optional bearer token for the upstream provider.
    #[arg(long, env, hide_env_values = true)]
    pub provider_api_key: Option<String>,

    /// Requests per second the Provider Client paces itself to.
    #[arg(long, default_value_t = 5.0, env)]
    pub provider_requests_per_second: f64,

    /// Retry cap for transient provider failures.
    #[arg(long, default_value_t = 3, env)]
    pub provider_max_retries: u32,

    /// Base exponential-backoff delay in seconds.
    #[arg(long, default_value_t = 1.0, env)]
    pub provider_retry_delay_seconds: f64,

    /// Cap on any single retry delay (including a provider's Retry-After).
    #[arg(long, default_value_t = 30.0, env)]
    pub provider_max_retry_delay_seconds: f64,

    /// Consecutive failures before the circuit breaker opens.
    #[arg(long, default_value_t = 5, env)]
    pub provider_circuit_failure_threshold: u32,

    /// Seconds the circuit stays OPEN before a HALF_OPEN probe is allowed.
    #[arg(long, default_value_t = 60, env)]
    pub provider_circuit_cooldown_seconds: u64,

    /// Persistent cache backend.
    #[arg(long, value_enum, default_value_t = CacheBackendKind::Memory, env)]
    pub cache_backend: CacheBackendKind,

    /// RocksDB directory, required when `cache_backend = rocks`.
    #[arg(long, env)]
    pub cache_rocks_path: Option<PathBuf>,

    /// Maximum entries kept by the in-memory cache backend.
    #[arg(long, default_value_t = 100_000, env)]
    pub cache_memory_max_entries: usize,

    /// Default TTL applied to cached transactions, address metadata, and
    /// reports.
    #[arg(long, default_value_t = 300, env)]
    pub cache_ttl_seconds: u64,

    /// Depth used when the caller omits one.
    #[arg(long, default_value_t = 3, env)]
    pub trace_default_depth: u32,

    /// Upper bound on the depth a caller may request.
    #[arg(long, default_value_t = 6, env)]
    pub trace_max_depth: u32,

    /// Safety cap on distinct addresses visited in one analysis.
    #[arg(long, default_value_t = 5_000, env)]
    pub trace_max_addresses_visited: usize,

    /// Safety cap on provider calls spent in one analysis.
    #[arg(long, default_value_t = 2_000, env)]
    pub trace_max_api_calls: u64,

    /// Concurrent address-meta fetches per BFS layer.
    #[arg(long, default_value_t = 8, env)]
    pub trace_fetch_parallelism: usize,

    /// Wall-clock budget for one analysis, in seconds.
    #[arg(long, default_value_t = 30, env)]
    pub trace_timeout_seconds: u64,

    /// Log-damping constant `K` in the contribution term of the score.
    #[arg(long, default_value_t = 3.0, env)]
    pub score_contribution_k: f64,

    /// Optional TOML file overlaying any of the settings above; CLI flags
    /// and environment variables still win when both are set, since this
    /// file is merged in before `clap` parses.
    #[arg(long)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Rocks,
}

/// Partial view of [`Arguments`], used only to read a TOML overlay file.
/// Every field is optional: a present value pre-seeds the corresponding
/// environment variable so `clap`'s own env/CLI precedence still applies
/// on top of it.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    provider: Option<ProviderSection>,
    cache: Option<CacheSection>,
    trace: Option<TraceSection>,
    score: Option<ScoreSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ProviderSection {
    base_url: Option<String>,
    api_key: Option<String>,
    requests_per_second: Option<f64>,
    max_retries: Option<u32>,
    retry_delay: Option<f64>,
    circuit: Option<CircuitSection>,
}

#[derive(Debug, Deserialize, Default)]
struct CircuitSection {
    failure_threshold: Option<u32>,
    cooldown: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheSection {
    backend: Option<CacheBackendKind>,
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TraceSection {
    default_depth: Option<u32>,
    max_depth: Option<u32>,
    max_addresses_visited: Option<usize>,
    max_api_calls: Option<u64>,
    fetch_parallelism: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ScoreSection {
    contribution_k: Option<f64>,
}

/// Applies a TOML overlay file's values as environment-variable defaults,
/// then parses [`Arguments`] from `std::env::args()`. Values already
/// present in the environment are left untouched (the file never
/// overrides an explicit env var or CLI flag).
pub fn load() -> Result<Arguments, Error> {
    if let Some(path) = peek_config_file_flag() {
        let contents = std::fs::read_to_string(&path)?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| Error::InvalidInput(format!("invalid config file {path:?}: {e}")))?;
        apply_overlay(file);
    }
    Ok(Arguments::parse())
}

fn peek_config_file_flag() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    args.iter().position(|a| a == "--config-file").and_then(|i| args.get(i + 1)).map(PathBuf::from)
}

fn apply_overlay(file: ConfigFile) {
    if let Some(p) = file.provider {
        set_default_env("PROVIDER_BASE_URL", p.base_url);
        set_default_env("PROVIDER_API_KEY", p.api_key);
        set_default_env("PROVIDER_REQUESTS_PER_SECOND", p.requests_per_second.map(|v| v.to_string()));
        set_default_env("PROVIDER_MAX_RETRIES", p.max_retries.map(|v| v.to_string()));
        set_default_env("PROVIDER_RETRY_DELAY_SECONDS", p.retry_delay.map(|v| v.to_string()));
        if let Some(c) = p.circuit {
            set_default_env("PROVIDER_CIRCUIT_FAILURE_THRESHOLD", c.failure_threshold.map(|v| v.to_string()));
            set_default_env("PROVIDER_CIRCUIT_COOLDOWN_SECONDS", c.cooldown.map(|v| v.to_string()));
        }
    }
    if let Some(c) = file.cache {
        set_default_env("CACHE_BACKEND", c.backend.map(|b| match b {
            CacheBackendKind::Memory => "memory".to_string(),
            CacheBackendKind::Rocks => "rocks".to_string(),
        }));
        set_default_env("CACHE_TTL_SECONDS", c.ttl_seconds.map(|v| v.to_string()));
    }
    if let Some(t) = file.trace {
        set_default_env("TRACE_DEFAULT_DEPTH", t.default_depth.map(|v| v.to_string()));
        set_default_env("TRACE_MAX_DEPTH", t.max_depth.map(|v| v.to_string()));
        set_default_env("TRACE_MAX_ADDRESSES_VISITED", t.max_addresses_visited.map(|v| v.to_string()));
        set_default_env("TRACE_MAX_API_CALLS", t.max_api_calls.map(|v| v.to_string()));
        set_default_env("TRACE_FETCH_PARALLELISM", t.fetch_parallelism.map(|v| v.to_string()));
    }
    if let Some(s) = file.score {
        set_default_env("SCORE_CONTRIBUTION_K", s.contribution_k.map(|v| v.to_string()));
    }
}

fn set_default_env(key: &str, value: Option<String>) {
    if let Some(value) = value {
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
        }
    }
}

impl Arguments {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: self.provider_base_url.clone(),
            api_key: self.provider_api_key.clone(),
            requests_per_second: self.provider_requests_per_second,
            max_retries: self.provider_max_retries,
            retry_delay: Duration::from_secs_f64(self.provider_retry_delay_seconds),
            max_retry_delay: Duration::from_secs_f64(self.provider_max_retry_delay_seconds),
            circuit_failure_threshold: self.provider_circuit_failure_threshold,
            circuit_cooldown: Duration::from_secs(self.provider_circuit_cooldown_seconds),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn trace_config(&self) -> crate::tracer::TraceConfig {
        crate::tracer::TraceConfig {
            max_addresses_visited: self.trace_max_addresses_visited,
            max_api_calls: self.trace_max_api_calls,
            fetch_parallelism: self.trace_fetch_parallelism,
            timeout: Duration::from_secs(self.trace_timeout_seconds),
        }
    }

    pub fn score_config(&self) -> crate::scorer::ScoreConfig {
        crate::scorer::ScoreConfig {
            contribution_k: self.score_contribution_k,
        }
    }
}

/// Settings consumed by [`crate::provider::http::HttpProvider`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub requests_per_second: f64,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown: Duration,
}
