// src/chain/registry.rs
// Static chain id -> RPC endpoint / ticket contract mapping

use crate::types::{Address, ChainId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("chain {0} is not configured")]
    NotFound(ChainId),

    #[error("chain {0} configured more than once")]
    Duplicate(ChainId),

    #[error("chain {chain_id}: rpc endpoint must be http(s), got {endpoint}")]
    BadEndpoint { chain_id: ChainId, endpoint: String },

    #[error("invalid chain config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read chain config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// One supported chain. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub rpc_endpoint: Url,
    pub contract_address: Address,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: BTreeMap<ChainId, ChainConfig>,
}

impl ChainRegistry {
    pub fn new(configs: Vec<ChainConfig>) -> Result<Self, RegistryError> {
        let mut chains = BTreeMap::new();
        for cfg in configs {
            if !matches!(cfg.rpc_endpoint.scheme(), "http" | "https") {
                return Err(RegistryError::BadEndpoint {
                    chain_id: cfg.chain_id,
                    endpoint: cfg.rpc_endpoint.to_string(),
                });
            }
            let id = cfg.chain_id;
            if chains.insert(id, cfg).is_some() {
                return Err(RegistryError::Duplicate(id));
            }
        }
        Ok(Self { chains })
    }

    /// Parse a JSON array of chain configs.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let configs: Vec<ChainConfig> = serde_json::from_str(json)?;
        Self::new(configs)
    }

    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let json = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Look up a chain. Unknown ids are an error, never a fallback.
    pub fn resolve(&self, chain_id: ChainId) -> Result<&ChainConfig, RegistryError> {
        self.chains
            .get(&chain_id)
            .ok_or(RegistryError::NotFound(chain_id))
    }

    pub fn supported_chain_ids(&self) -> Vec<ChainId> {
        self.chains.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CHAINS: &str = r#"[
        {"chainId": 137, "rpcEndpoint": "https://polygon-rpc.example/", "contractAddress": "0x00000000000000000000000000000000000000aa", "name": "polygon"},
        {"chainId": 1, "rpcEndpoint": "http://127.0.0.1:8545", "contractAddress": "0x00000000000000000000000000000000000000BB"}
    ]"#;

    #[test]
    fn test_resolve_known_and_unknown() {
        let registry = ChainRegistry::from_json(TWO_CHAINS).unwrap();
        let polygon = registry.resolve(ChainId(137)).unwrap();
        assert_eq!(polygon.name.as_deref(), Some("polygon"));
        assert!(matches!(
            registry.resolve(ChainId(10)),
            Err(RegistryError::NotFound(ChainId(10)))
        ));
    }

    #[test]
    fn test_supported_ids_sorted() {
        let registry = ChainRegistry::from_json(TWO_CHAINS).unwrap();
        assert_eq!(registry.supported_chain_ids(), vec![ChainId(1), ChainId(137)]);
    }

    #[test]
    fn test_duplicate_chain_rejected() {
        let json = r#"[
            {"chainId": 1, "rpcEndpoint": "http://a.example", "contractAddress": "0x00000000000000000000000000000000000000aa"},
            {"chainId": 1, "rpcEndpoint": "http://b.example", "contractAddress": "0x00000000000000000000000000000000000000aa"}
        ]"#;
        assert!(matches!(
            ChainRegistry::from_json(json),
            Err(RegistryError::Duplicate(ChainId(1)))
        ));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let json = r#"[{"chainId": 1, "rpcEndpoint": "ws://a.example", "contractAddress": "0x00000000000000000000000000000000000000aa"}]"#;
        assert!(matches!(
            ChainRegistry::from_json(json),
            Err(RegistryError::BadEndpoint { .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chains.json");
        std::fs::write(&path, TWO_CHAINS).unwrap();
        let registry = ChainRegistry::from_file(&path).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(ChainRegistry::from_file(&dir.path().join("missing.json")).is_err());
    }
}
