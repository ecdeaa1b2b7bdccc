use crate::types::ChainId;

/// Crate-wide error type.
///
/// Variants map to the error kinds in the engine design: some are
/// recoverable by the [`crate::tracer::Tracer`] (a non-root provider failure
/// degrades a single node instead of aborting the analysis), others are
/// fatal to the whole call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Hyper(#[from] hyper::Error),

    #[error(transparent)]
    HyperHttp(#[from] hyper::http::Error),

    #[error(transparent)]
    Uri(#[from] hyper::http::uri::InvalidUri),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("chain '{0}' is not supported, supported chains: {1:?}")]
    ChainUnsupported(String, Vec<ChainId>),

    #[error("transaction {0} not found on {1}")]
    TxNotFound(String, ChainId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provider unavailable: {0}")]
    ProviderDown(String),

    #[error("rate limited by upstream provider")]
    RateLimited,

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("analysis bounded before completion: {0}")]
    PartialDegradation(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Whether an [`Error`] permits the resulting [`crate::types::RiskReport`]
/// to be written to the persistent cache, per the error-handling design:
/// `ProviderDown`/`RateLimited` reports must not be cached since a retry
/// later may see different upstream state; `PartialDegradation` reports are
/// cached, since the bound that was hit is itself part of the deterministic
/// contract for that `(chain, tx_id, depth)`; `InternalError` is never
/// cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cacheability {
    Cacheable,
    NotCacheable,
}

impl Error {
    pub fn cacheability(&self) -> Cacheability {
        match self {
            Error::ProviderDown(_) | Error::RateLimited | Error::InternalError(_) => {
                Cacheability::NotCacheable
            }
            Error::PartialDegradation(_) => Cacheability::Cacheable,
            _ => Cacheability::NotCacheable,
        }
    }
}
