//! HTTP-backed [`BlockchainProvider`]: one shared [`hyper::Client`] (per the
//! teacher's `rpc::CLIENT` static pattern), paced by a [`RateLimiter`],
//! guarded by a [`CircuitBreaker`], with concurrent identical requests
//! collapsed by [`SingleFlight`].
//!
//! State lives behind an `Arc<Inner>` rather than directly on
//! [`HttpProvider`] so the futures handed to [`SingleFlight::run`] can own a
//! cloned handle instead of borrowing `&self` — `Shared` requires `'static`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::body::Buf;
use hyper::{client::HttpConnector, Client, StatusCode, Uri};
use rand::Rng;
use serde::de::DeserializeOwned;

use crate::config::ProviderConfig;
use crate::error::Error;
use crate::metrics;
use crate::types::{Address, AddressMeta, ChainId, TxId, TxRecord};

use super::circuit_breaker::{Admission, CircuitBreaker};
use super::normalize::{self, RawAddress, RawTransaction};
use super::rate_limiter::RateLimiter;
use super::single_flight::SingleFlight;
use super::{BlockchainProvider, ProviderHealth};

struct Inner {
    client: Client<HttpConnector>,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    max_retries: u32,
    retry_delay: Duration,
    max_retry_delay: Duration,
    request_count: AtomicU64,
    tx_single_flight: SingleFlight<TxRecord>,
    addr_single_flight: SingleFlight<AddressMeta>,
    incoming_single_flight: SingleFlight<Vec<TxRecord>>,
}

pub struct HttpProvider {
    inner: Arc<Inner>,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Self {
        HttpProvider {
            inner: Arc::new(Inner {
                client: Client::new(),
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key: config.api_key,
                rate_limiter: RateLimiter::new(config.requests_per_second),
                circuit_breaker: CircuitBreaker::new(
                    config.circuit_failure_threshold,
                    config.circuit_cooldown,
                ),
                max_retries: config.max_retries,
                retry_delay: config.retry_delay,
                max_retry_delay: config.max_retry_delay,
                request_count: AtomicU64::new(0),
                tx_single_flight: SingleFlight::new(),
                addr_single_flight: SingleFlight::new(),
                incoming_single_flight: SingleFlight::new(),
            }),
        }
    }
}

enum HttpOutcome {
    Success(hyper::body::Bytes),
    NotFound,
    RateLimited(Option<Duration>),
    ServerError(StatusCode),
    Network(Error),
}

impl Inner {
    fn build_uri(&self, path: &str) -> Result<Uri, Error> {
        let mut url = format!("{}{}", self.base_url, path);
        if let Some(key) = &self.api_key {
            let sep = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{sep}api_key={key}");
        }
        url.parse().map_err(Error::from)
    }

    /// Runs one resilient GET against `path`, deserializing the body as
    /// `T`. Retries server errors, rate limiting, and network failures
    /// with capped exponential backoff and jitter, consulting the circuit
    /// breaker before every attempt and feeding it back the outcome. A 404
    /// is a definitive negative, not a failure: `not_found` decides what
    /// that means for this particular call (a hard error for a root
    /// transaction lookup, an empty result for address history).
    async fn get_json<T: DeserializeOwned>(
        self: Arc<Self>,
        path: String,
        op: &'static str,
        not_found: impl FnOnce() -> Result<T, Error>,
    ) -> Result<T, Error> {
        let uri = self.build_uri(&path)?;
        let mut attempt: u32 = 0;

        loop {
            match self.circuit_breaker.admit() {
                Admission::Rejected => {
                    return Err(Error::ProviderDown(format!("circuit open, rejecting {op}")))
                }
                Admission::Allowed => {}
            }

            self.rate_limiter.acquire().await;
            self.request_count.fetch_add(1, Ordering::Relaxed);
            metrics::PROVIDER_REQUESTS.with_label_values(&[op]).inc();
            let timer = metrics::PROVIDER_LATENCY.with_label_values(&[op]).start_timer();

            let outcome = self.raw_get(uri.clone()).await;
            timer.observe_duration();

            match outcome {
                HttpOutcome::Success(bytes) => {
                    self.circuit_breaker.on_success();
                    return serde_json::from_reader(bytes.reader()).map_err(Error::from);
                }
                HttpOutcome::NotFound => {
                    self.circuit_breaker.on_success();
                    return not_found();
                }
                HttpOutcome::RateLimited(retry_after) => {
                    self.circuit_breaker.on_failure();
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(Error::RateLimited);
                    }
                    let delay = retry_after.unwrap_or(self.retry_delay).min(self.max_retry_delay);
                    tokio::time::sleep(delay).await;
                }
                HttpOutcome::ServerError(status) => {
                    self.circuit_breaker.on_failure();
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(Error::ProviderDown(format!(
                            "{op} failed after {attempt} attempts, last status {status}"
                        )));
                    }
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                HttpOutcome::Network(err) => {
                    self.circuit_breaker.on_failure();
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(Error::ProviderDown(format!("{op}: {err}")));
                    }
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.retry_delay.mul_f64(2f64.powi(attempt as i32 - 1));
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));
        (exp + jitter).min(self.max_retry_delay)
    }

    async fn raw_get(&self, uri: Uri) -> HttpOutcome {
        match self.client.get(uri).await {
            Ok(resp) => {
                let status = resp.status();
                if status == StatusCode::NOT_FOUND {
                    return HttpOutcome::NotFound;
                }
                if status == StatusCode::TOO_MANY_REQUESTS {
                    let retry_after = resp
                        .headers()
                        .get(hyper::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    return HttpOutcome::RateLimited(retry_after);
                }
                if status.is_server_error() {
                    return HttpOutcome::ServerError(status);
                }
                if !status.is_success() {
                    return HttpOutcome::Network(Error::InternalError(format!(
                        "unexpected status {status}"
                    )));
                }
                match hyper::body::to_bytes(resp.into_body()).await {
                    Ok(bytes) => HttpOutcome::Success(bytes),
                    Err(e) => HttpOutcome::Network(Error::from(e)),
                }
            }
            Err(e) => HttpOutcome::Network(Error::from(e)),
        }
    }
}

#[async_trait]
impl BlockchainProvider for HttpProvider {
    async fn get_transaction(&self, chain: &ChainId, tx_id: &TxId) -> Result<TxRecord, Error> {
        let spec = crate::chains::lookup(chain)?;
        let key = format!("{}:{}", chain.as_str(), tx_id.as_str());
        let path = format!("/{}/dashboards/transaction/{}", spec.api_path, tx_id.as_str());
        let family = spec.family;
        let chain_owned = chain.clone();
        let tx_id_owned = tx_id.clone();
        let tx_id_for_err = tx_id.clone();
        let chain_for_err = chain.clone();
        let inner = self.inner.clone();

        let fetch = async move {
            inner
                .get_json::<RawTransaction>(path, "get_transaction", move || {
                    Err(Error::TxNotFound(tx_id_for_err.as_str().to_string(), chain_for_err))
                })
                .await
        };

        let raw = self
            .inner
            .tx_single_flight
            .run(&key, fetch)
            .await
            .map_err(|e| clone_error(&e))?;
        normalize::tx_record(raw, &chain_owned, family, &tx_id_owned)
    }

    async fn get_address_meta(
        &self,
        chain: &ChainId,
        address: &Address,
    ) -> Result<AddressMeta, Error> {
        let spec = crate::chains::lookup(chain)?;
        let key = format!("{}:{}", chain.as_str(), address.as_str());
        let path = format!("/{}/dashboards/address/{}", spec.api_path, address.as_str());
        let chain_owned = chain.clone();
        let address_owned = address.clone();
        let inner = self.inner.clone();

        let fetch = async move {
            inner
                .get_json::<RawAddress>(path, "get_address_meta", || Ok(RawAddress::default()))
                .await
        };

        let raw = self
            .inner
            .addr_single_flight
            .run(&key, fetch)
            .await
            .map_err(|e| clone_error(&e))?;
        Ok(normalize::address_meta(raw, &chain_owned, &address_owned))
    }

    async fn get_incoming_transactions(
        &self,
        chain: &ChainId,
        address: &Address,
    ) -> Result<Vec<TxRecord>, Error> {
        let spec = crate::chains::lookup(chain)?;
        let key = format!("incoming:{}:{}", chain.as_str(), address.as_str());
        let path = format!(
            "/{}/dashboards/address/{}/transactions?direction=incoming&limit=25",
            spec.api_path,
            address.as_str()
        );
        let family = spec.family;
        let chain_owned = chain.clone();
        let inner = self.inner.clone();

        let fetch = async move {
            inner
                .get_json::<Vec<RawTransaction>>(path, "get_incoming_transactions", || Ok(Vec::new()))
                .await
        };

        let raw = self
            .inner
            .incoming_single_flight
            .run(&key, fetch)
            .await
            .map_err(|e| clone_error(&e))?;
        raw.into_iter()
            .map(|r| {
                let tx_id = r
                    .hash
                    .clone()
                    .map(TxId::from)
                    .ok_or_else(|| Error::DecodeError("incoming tx missing 'hash'".into()))?;
                normalize::tx_record(r, &chain_owned, family, &tx_id)
            })
            .collect()
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth {
            state: self.inner.circuit_breaker.state(),
            request_count: self.inner.request_count.load(Ordering::Relaxed),
            latest_block: None,
        }
    }
}

/// [`SingleFlight`] shares errors as `Arc<Error>`; callers further up need
/// an owned [`Error`], so the few variants a caller might branch on are
/// reconstructed by hand rather than requiring `Error: Clone` crate-wide.
fn clone_error(e: &Arc<Error>) -> Error {
    match e.as_ref() {
        Error::TxNotFound(a, b) => Error::TxNotFound(a.clone(), b.clone()),
        Error::ChainUnsupported(a, b) => Error::ChainUnsupported(a.clone(), b.clone()),
        Error::InvalidInput(s) => Error::InvalidInput(s.clone()),
        Error::ProviderDown(s) => Error::ProviderDown(s.clone()),
        Error::RateLimited => Error::RateLimited,
        Error::DecodeError(s) => Error::DecodeError(s.clone()),
        Error::PartialDegradation(s) => Error::PartialDegradation(s.clone()),
        Error::InternalError(s) => Error::InternalError(s.clone()),
        other => Error::InternalError(other.to_string()),
    }
}
