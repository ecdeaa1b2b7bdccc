//! Composition root. `KytEngine` is the narrow interface the (absent) HTTP
//! layer would sit behind: `analyze`, `list_chains`, `health`, mirroring the
//! teacher's own pattern of building one `SharedState` at startup and handing
//! it to every request handler — except here there is no server loop to hand
//! it to, since an HTTP surface is explicitly out of scope.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{keys, Cache};
use crate::chains;
use crate::config::{Arguments, CacheBackendKind};
use crate::error::Error;
use crate::provider::http::HttpProvider;
use crate::provider::{BlockchainProvider, ProviderHealth};
use crate::scorer::{self, ScoreConfig};
use crate::tracer::{TraceConfig, Tracer};
use crate::types::{ChainId, ChainSpec, RiskReport, TxId};

/// Provider + cache health, per the external-interfaces table's
/// `health() -> {provider, cache}`.
#[derive(Debug, Clone)]
pub struct EngineHealth {
    pub provider: ProviderHealth,
    pub cache_reachable: bool,
}

pub struct KytEngine {
    provider: Arc<dyn BlockchainProvider>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
    trace_config: TraceConfig,
    score_config: ScoreConfig,
    max_depth: u32,
    default_depth: u32,
}

impl KytEngine {
    pub fn new(args: &Arguments) -> Result<Self, Error> {
        let provider: Arc<dyn BlockchainProvider> =
            Arc::new(HttpProvider::new(args.provider_config()));
        let cache: Arc<dyn Cache> = match args.cache_backend {
            CacheBackendKind::Memory => {
                Arc::new(crate::cache::memory::MemoryCache::new(args.cache_memory_max_entries))
            }
            CacheBackendKind::Rocks => {
                let path = args.cache_rocks_path.as_ref().ok_or_else(|| {
                    Error::InvalidInput(
                        "cache_rocks_path is required when cache_backend = rocks".into(),
                    )
                })?;
                Arc::new(crate::cache::rocks::RocksCache::open(path).map_err(|e| {
                    Error::InternalError(format!("failed to open rocks cache at {path:?}: {e}"))
                })?)
            }
        };

        Ok(KytEngine {
            provider,
            cache,
            cache_ttl: args.cache_ttl(),
            trace_config: args.trace_config(),
            score_config: args.score_config(),
            max_depth: args.trace_max_depth,
            default_depth: args.trace_default_depth,
        })
    }

    /// The single entry point: runs a bounded trace and risk-scores the
    /// result, consulting the persistent report cache first. `depth`
    /// defaults to the configured default and is clamped to the configured
    /// maximum rather than rejected, since a caller-supplied depth above
    /// the ceiling is a bound, not an error.
    pub async fn analyze(
        &self,
        chain: ChainId,
        tx_id: TxId,
        depth: Option<u32>,
    ) -> Result<RiskReport, Error> {
        chains::lookup(&chain)?;
        let depth = depth.unwrap_or(self.default_depth).min(self.max_depth);

        let report_key = keys::report(chain.as_str(), tx_id.as_str(), depth);
        if let Some(bytes) = self.cache.get(&report_key).await {
            if let Ok(report) = serde_json::from_slice::<RiskReport>(&bytes) {
                return Ok(report);
            }
        }

        let started = Instant::now();
        let tracer = Tracer::new(
            self.provider.clone(),
            self.cache.clone(),
            self.cache_ttl,
            self.trace_config.clone(),
        );

        let result = tracer.trace(&chain, &tx_id, depth).await;
        crate::metrics::ANALYSIS_LATENCY
            .with_label_values(&[chain.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let outcome = result?;

        let risk_score = scorer::score(&outcome.flagged, outcome.circular_paths, &self.score_config);
        let report = crate::report::build(chain.clone(), tx_id, depth, &outcome, risk_score);

        crate::metrics::ANALYSES_COMPLETED
            .with_label_values(&[chain.as_str(), &format!("{:?}", report.risk_score.level)])
            .inc();

        if let Ok(bytes) = serde_json::to_vec(&report) {
            self.cache.put(&report_key, bytes, self.cache_ttl).await;
        }

        Ok(report)
    }

    pub fn list_chains(&self) -> Vec<&'static ChainSpec> {
        chains::all()
    }

    pub async fn health(&self) -> EngineHealth {
        EngineHealth {
            provider: self.provider.health().await,
            cache_reachable: self.cache.ping().await,
        }
    }
}
