use serde::Serialize;

/// One entry of the static chain registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainRequestSpec {
    pub chain_id: u64,
    pub display_name: &'static str,
    pub order: u32,
}

/// Aggregation order matters: chains are fetched one after another in this order.
pub const SUPPORTED_CHAINS: &[ChainRequestSpec] = &[
    ChainRequestSpec {
        chain_id: 1,
        display_name: "Ethereum",
        order: 0,
    },
    ChainRequestSpec {
        chain_id: 56,
        display_name: "BNB Chain",
        order: 1,
    },
    ChainRequestSpec {
        chain_id: 137,
        display_name: "Polygon",
        order: 2,
    },
    ChainRequestSpec {
        chain_id: 42161,
        display_name: "Arbitrum",
        order: 3,
    },
    ChainRequestSpec {
        chain_id: 100,
        display_name: "Gnosis",
        order: 4,
    },
    ChainRequestSpec {
        chain_id: 10,
        display_name: "Optimism",
        order: 5,
    },
    ChainRequestSpec {
        chain_id: 8453,
        display_name: "Base",
        order: 6,
    },
    ChainRequestSpec {
        chain_id: 43114,
        display_name: "Avalanche",
        order: 7,
    },
    ChainRequestSpec {
        chain_id: 324,
        display_name: "zkSync Era",
        order: 8,
    },
    ChainRequestSpec {
        chain_id: 59144,
        display_name: "Linea",
        order: 9,
    },
];

/// Registry sorted by declared order.
pub fn registry() -> Vec<ChainRequestSpec> {
    let mut chains = SUPPORTED_CHAINS.to_vec();
    chains.sort_by_key(|c| c.order);
    chains
}

pub fn find_chain(chain_id: u64) -> Option<&'static ChainRequestSpec> {
    SUPPORTED_CHAINS.iter().find(|c| c.chain_id == chain_id)
}

pub fn find_chain_id(name: &str) -> Option<u64> {
    SUPPORTED_CHAINS
        .iter()
        .find(|c| c.display_name.eq_ignore_ascii_case(name.trim()))
        .map(|c| c.chain_id)
}

pub fn chain_name(chain_id: u64) -> String {
    find_chain(chain_id)
        .map(|c| c.display_name.to_string())
        .unwrap_or_else(|| format!("Chain {}", chain_id))
}

/// A network the chain indexer serves, addressed by its path name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedNetwork {
    pub name: &'static str,
    pub chain_id: u64,
    pub native_symbol: &'static str,
}

/// Balance lookups walk these in order.
pub const INDEXED_NETWORKS: &[IndexedNetwork] = &[
    IndexedNetwork {
        name: "ethereum",
        chain_id: 1,
        native_symbol: "ETH",
    },
    IndexedNetwork {
        name: "base",
        chain_id: 8453,
        native_symbol: "ETH",
    },
    IndexedNetwork {
        name: "arbitrum",
        chain_id: 42161,
        native_symbol: "ETH",
    },
    IndexedNetwork {
        name: "optimism",
        chain_id: 10,
        native_symbol: "ETH",
    },
    IndexedNetwork {
        name: "polygon",
        chain_id: 137,
        native_symbol: "MATIC",
    },
];

/// By network name, chain id, or registry display name.
pub fn find_network(raw: &str) -> Option<&'static IndexedNetwork> {
    let raw = raw.trim();
    let chain_id = raw.parse::<u64>().ok().or_else(|| find_chain_id(raw));
    INDEXED_NETWORKS
        .iter()
        .find(|n| n.name.eq_ignore_ascii_case(raw) || Some(n.chain_id) == chain_id)
}
