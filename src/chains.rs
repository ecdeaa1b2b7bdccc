//! Chain Registry: a frozen table mapping chain ids to their family, display
//! metadata, and provider path fragment. Contents are configuration, not
//! core design, but the table itself is process-wide static state, matching
//! how the teacher keeps the active `Network` in a `once_cell::sync::OnceCell`.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::Error;
use crate::types::{ChainFamily, ChainId, ChainSpec};

static REGISTRY: Lazy<HashMap<&'static str, ChainSpec>> = Lazy::new(|| {
    let specs = [
        ChainSpec {
            id: ChainId::new("bitcoin"),
            family: ChainFamily::Utxo,
            display_name: "Bitcoin",
            decimals: 8,
            api_path: "btc",
            native_symbol: "BTC",
        },
        ChainSpec {
            id: ChainId::new("ethereum"),
            family: ChainFamily::Account,
            display_name: "Ethereum",
            decimals: 18,
            api_path: "eth",
            native_symbol: "ETH",
        },
        ChainSpec {
            id: ChainId::new("litecoin"),
            family: ChainFamily::Utxo,
            display_name: "Litecoin",
            decimals: 8,
            api_path: "ltc",
            native_symbol: "LTC",
        },
        ChainSpec {
            id: ChainId::new("bsc"),
            family: ChainFamily::Account,
            display_name: "BNB Smart Chain",
            decimals: 18,
            api_path: "bsc",
            native_symbol: "BNB",
        },
        ChainSpec {
            id: ChainId::new("polygon"),
            family: ChainFamily::Account,
            display_name: "Polygon",
            decimals: 18,
            api_path: "matic",
            native_symbol: "MATIC",
        },
    ];
    specs.into_iter().map(|s| (s.api_path, s)).collect()
});

/// Look up a chain by id, rejecting unknown ids with `ChainUnsupported`.
pub fn lookup(chain: &ChainId) -> Result<&'static ChainSpec, Error> {
    REGISTRY
        .values()
        .find(|s| &s.id == chain)
        .ok_or_else(|| Error::ChainUnsupported(chain.0.clone(), supported_ids()))
}

/// All chains known to the registry, for `list_chains()`.
pub fn all() -> Vec<&'static ChainSpec> {
    let mut v: Vec<_> = REGISTRY.values().collect();
    v.sort_by(|a, b| a.id.0.cmp(&b.id.0));
    v
}

fn supported_ids() -> Vec<ChainId> {
    all().into_iter().map(|s| s.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chain_resolves() {
        let spec = lookup(&ChainId::new("bitcoin")).unwrap();
        assert_eq!(spec.family, ChainFamily::Utxo);
        assert_eq!(spec.decimals, 8);
    }

    #[test]
    fn unknown_chain_is_rejected() {
        let err = lookup(&ChainId::new("dogecoin")).unwrap_err();
        match err {
            Error::ChainUnsupported(id, supported) => {
                assert_eq!(id, "dogecoin");
                assert!(supported.iter().any(|c| c.0 == "bitcoin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
