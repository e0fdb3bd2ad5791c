// src/oracle.rs
// Ownership oracle: "does wallet W own token T on chain C", fail-closed

use crate::chain::{ChainConfig, ChainRegistry, EvmRpcClient, RpcClientError};
use crate::error::{ProofError, ProofResult};
use crate::metrics::METRICS;
use crate::types::{Address, ChainId, TokenId};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// ERC-721 `ownerOf(uint256)` selector.
pub const OWNER_OF_SELECTOR: [u8; 4] = [0x63, 0x52, 0x21, 0x1e];

/// Read-only "current owner of token id" on one chain.
#[async_trait]
pub trait OwnershipChecker: Send + Sync {
    async fn owner_of(&self, token_id: &TokenId) -> Result<Address, RpcClientError>;
}

/// `ownerOf` over JSON-RPC `eth_call` against a deployed ticket contract.
#[derive(Debug, Clone)]
pub struct Erc721OwnershipChecker {
    client: EvmRpcClient,
    contract: Address,
}

impl Erc721OwnershipChecker {
    pub fn new(client: EvmRpcClient, contract: Address) -> Self {
        Self { client, contract }
    }

    pub fn for_chain(config: &ChainConfig, timeout: Duration) -> Result<Self, RpcClientError> {
        let client = EvmRpcClient::new(config.rpc_endpoint.clone(), timeout)?;
        Ok(Self::new(client, config.contract_address))
    }

    fn calldata(token_id: &TokenId) -> Vec<u8> {
        let mut data = Vec::with_capacity(36);
        data.extend_from_slice(&OWNER_OF_SELECTOR);
        data.extend_from_slice(&token_id.to_abi_word());
        data
    }
}

#[async_trait]
impl OwnershipChecker for Erc721OwnershipChecker {
    async fn owner_of(&self, token_id: &TokenId) -> Result<Address, RpcClientError> {
        let ret = self
            .client
            .eth_call(&self.contract, &Self::calldata(token_id))
            .await?;
        Address::from_abi_word(&ret).ok_or_else(|| {
            RpcClientError::Malformed(format!("ownerOf returned {} bytes: 0x{}", ret.len(), hex::encode(&ret)))
        })
    }
}

/// Wire-friendly result of an ownership check.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OwnershipVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&ProofResult<()>> for OwnershipVerdict {
    fn from(result: &ProofResult<()>) -> Self {
        match result {
            Ok(()) => OwnershipVerdict {
                valid: true,
                reason: None,
            },
            Err(e) => OwnershipVerdict {
                valid: false,
                reason: Some(e.reason()),
            },
        }
    }
}

/// Dispatches ownership checks to a per-chain checker.
///
/// Adding a chain is a registration, not a code change. Each chain owns its
/// own client, so a hung endpoint only fails checks for that chain.
pub struct OwnershipOracle {
    registry: Arc<ChainRegistry>,
    checkers: HashMap<ChainId, Arc<dyn OwnershipChecker>>,
    timeout: Duration,
}

impl OwnershipOracle {
    /// Oracle with no checkers registered yet.
    pub fn new(registry: Arc<ChainRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            checkers: HashMap::new(),
            timeout,
        }
    }

    /// Build one ERC-721 checker per configured chain.
    pub fn connect(registry: Arc<ChainRegistry>, timeout: Duration) -> Result<Self, RpcClientError> {
        let mut oracle = Self::new(registry.clone(), timeout);
        for cfg in registry.iter() {
            let checker = Erc721OwnershipChecker::for_chain(cfg, timeout)?;
            info!(
                "Ownership checker ready for chain {} (contract {}, rpc {})",
                cfg.chain_id,
                cfg.contract_address,
                cfg.rpc_endpoint.host_str().unwrap_or("?")
            );
            oracle.register(cfg.chain_id, Arc::new(checker));
        }
        Ok(oracle)
    }

    pub fn register(&mut self, chain_id: ChainId, checker: Arc<dyn OwnershipChecker>) {
        self.checkers.insert(chain_id, checker);
    }

    pub fn with_checker(mut self, chain_id: ChainId, checker: Arc<dyn OwnershipChecker>) -> Self {
        self.register(chain_id, checker);
        self
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// `Ok(())` only when the chain reports `owner` as the current holder.
    /// Every failure mode is an error; nothing defaults to success.
    pub async fn check_ownership(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
    ) -> ProofResult<()> {
        let result = self.check_inner(token_id, owner, chain_id).await;
        METRICS.record_ownership_check(chain_id, &result);
        result
    }

    /// Same check, rendered as `{ valid, reason }`.
    pub async fn verdict(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
    ) -> OwnershipVerdict {
        OwnershipVerdict::from(&self.check_ownership(token_id, owner, chain_id).await)
    }

    async fn check_inner(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
    ) -> ProofResult<()> {
        if self.registry.resolve(chain_id).is_err() {
            return Err(ProofError::UnsupportedChain(chain_id));
        }
        let checker = match self.checkers.get(&chain_id) {
            Some(c) => c,
            None => {
                warn!("Chain {} configured but no ownership checker registered", chain_id);
                return Err(ProofError::UnsupportedChain(chain_id));
            }
        };

        let current = match tokio::time::timeout(self.timeout, checker.owner_of(token_id)).await {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                warn!(
                    "ownerOf({}) on chain {} failed: {}",
                    token_id, chain_id, e
                );
                return Err(ProofError::RpcUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(
                    "ownerOf({}) on chain {} timed out after {:?}",
                    token_id, chain_id, self.timeout
                );
                return Err(ProofError::RpcUnavailable(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        // Address equality is byte equality, so checksum casing never matters.
        if current == *owner {
            Ok(())
        } else {
            debug!(
                "Token {} on chain {} held by {}, not {}",
                token_id, chain_id, current, owner
            );
            Err(ProofError::OwnershipMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedOwner(Address, AtomicUsize);

    #[async_trait]
    impl OwnershipChecker for FixedOwner {
        async fn owner_of(&self, _token_id: &TokenId) -> Result<Address, RpcClientError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0)
        }
    }

    struct Broken;

    #[async_trait]
    impl OwnershipChecker for Broken {
        async fn owner_of(&self, _token_id: &TokenId) -> Result<Address, RpcClientError> {
            Err(RpcClientError::Rpc {
                code: 3,
                message: "execution reverted".into(),
            })
        }
    }

    struct Hung;

    #[async_trait]
    impl OwnershipChecker for Hung {
        async fn owner_of(&self, _token_id: &TokenId) -> Result<Address, RpcClientError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(RpcClientError::EmptyResponse)
        }
    }

    fn registry(ids: &[u64]) -> Arc<ChainRegistry> {
        let configs = ids
            .iter()
            .map(|id| ChainConfig {
                chain_id: ChainId(*id),
                rpc_endpoint: "http://127.0.0.1:1".parse().unwrap(),
                contract_address: Address::from_bytes([0xaa; 20]),
                name: None,
            })
            .collect();
        Arc::new(ChainRegistry::new(configs).unwrap())
    }

    fn holder() -> Address {
        "0xabc0000000000000000000000000000000000001".parse().unwrap()
    }

    #[test]
    fn test_calldata_layout() {
        let data = Erc721OwnershipChecker::calldata(&TokenId::from(42));
        assert_eq!(data.len(), 36);
        assert_eq!(&data[..4], &OWNER_OF_SELECTOR);
        assert_eq!(data[35], 42);
    }

    #[tokio::test]
    async fn test_owner_matches() {
        let oracle = OwnershipOracle::new(registry(&[137]), Duration::from_secs(1))
            .with_checker(ChainId(137), Arc::new(FixedOwner(holder(), AtomicUsize::new(0))));
        let verdict = oracle.verdict(&TokenId::from(42), &holder(), ChainId(137)).await;
        assert!(verdict.valid);
        assert!(verdict.reason.is_none());
    }

    #[tokio::test]
    async fn test_other_owner_is_mismatch() {
        let someone_else = Address::from_bytes([0x11; 20]);
        let oracle = OwnershipOracle::new(registry(&[137]), Duration::from_secs(1))
            .with_checker(ChainId(137), Arc::new(FixedOwner(someone_else, AtomicUsize::new(0))));
        let result = oracle
            .check_ownership(&TokenId::from(42), &holder(), ChainId(137))
            .await;
        assert_eq!(result, Err(ProofError::OwnershipMismatch));
    }

    #[tokio::test]
    async fn test_unknown_chain_is_unsupported() {
        let oracle = OwnershipOracle::new(registry(&[137]), Duration::from_secs(1));
        let verdict = oracle.verdict(&TokenId::from(1), &holder(), ChainId(56)).await;
        assert!(!verdict.valid);
        assert_eq!(verdict.reason.as_deref(), Some("unsupported chain"));
    }

    #[tokio::test]
    async fn test_configured_chain_without_checker_is_unsupported() {
        let oracle = OwnershipOracle::new(registry(&[137]), Duration::from_secs(1));
        let result = oracle
            .check_ownership(&TokenId::from(1), &holder(), ChainId(137))
            .await;
        assert_eq!(result, Err(ProofError::UnsupportedChain(ChainId(137))));
    }

    #[tokio::test]
    async fn test_rpc_error_fails_closed() {
        let oracle = OwnershipOracle::new(registry(&[137]), Duration::from_secs(1))
            .with_checker(ChainId(137), Arc::new(Broken));
        let verdict = oracle.verdict(&TokenId::from(1), &holder(), ChainId(137)).await;
        assert!(!verdict.valid);
        assert_eq!(verdict.reason.as_deref(), Some("ownership check failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_chain_times_out_without_blocking_others() {
        let oracle = OwnershipOracle::new(registry(&[1, 137]), Duration::from_millis(200))
            .with_checker(ChainId(1), Arc::new(Hung))
            .with_checker(ChainId(137), Arc::new(FixedOwner(holder(), AtomicUsize::new(0))));

        let token = TokenId::from(1);
        let owner = holder();
        let (hung, healthy) = tokio::join!(
            oracle.check_ownership(&token, &owner, ChainId(1)),
            oracle.check_ownership(&token, &owner, ChainId(137)),
        );
        assert!(matches!(hung, Err(ProofError::RpcUnavailable(_))));
        assert_eq!(healthy, Ok(()));
    }
}
