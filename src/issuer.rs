// src/issuer.rs
// Proof issuance: ownership gate, fresh nonce, signature over the canonical payload

use crate::clock::Clock;
use crate::crypto::Signer;
use crate::error::{ProofError, ProofResult};
use crate::metrics::METRICS;
use crate::oracle::OwnershipOracle;
use crate::proof::{generate_nonce, ProofPayload, SignedProof};
use crate::types::{Address, ChainId, TokenId};
use log::{debug, info, warn};
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on remembered ownership checks.
const TRUST_CACHE_CAPACITY: u64 = 100_000;

type TrustKey = (ChainId, TokenId, Address);

/// Builds and signs ownership proofs.
///
/// `refresh` may skip the chain read, but only inside a window the issuer
/// itself opened: a successful check for the same `(chain, token, owner)`
/// less than `refresh_cooldown_secs` ago. The client's `lastIssuedAt` is
/// never enough on its own.
pub struct ProofIssuer {
    signer: Arc<dyn Signer>,
    oracle: Arc<OwnershipOracle>,
    clock: Arc<dyn Clock>,
    refresh_cooldown_secs: i64,
    /// Unix time of the last successful ownership check per holder/token.
    recent_checks: Cache<TrustKey, i64>,
}

impl ProofIssuer {
    pub fn new(
        signer: Arc<dyn Signer>,
        oracle: Arc<OwnershipOracle>,
        clock: Arc<dyn Clock>,
        refresh_cooldown_secs: i64,
    ) -> Self {
        let ttl = Duration::from_secs(refresh_cooldown_secs.max(1) as u64);
        Self {
            signer,
            oracle,
            clock,
            refresh_cooldown_secs,
            recent_checks: Cache::builder()
                .max_capacity(TRUST_CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    pub fn oracle(&self) -> &Arc<OwnershipOracle> {
        &self.oracle
    }

    /// Check ownership on chain, then sign a fresh proof.
    pub async fn issue(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
    ) -> ProofResult<SignedProof> {
        let result = self.checked_sign(token_id, owner, chain_id).await;
        self.record("issue", true, &result);
        result
    }

    /// Re-sign for a holder already showing a code. Within the cooldown the
    /// chain read is skipped; otherwise this is `issue`.
    pub async fn refresh(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
        last_issued_at: i64,
    ) -> ProofResult<SignedProof> {
        let now = self.clock.now();
        let key = (chain_id, token_id.clone(), *owner);

        if self.within_cooldown(now, last_issued_at) && self.recently_checked(&key, now) {
            debug!(
                "Refresh for token {} on chain {} inside cooldown, skipping ownerOf",
                token_id, chain_id
            );
            let result = self.sign(token_id, owner, chain_id, now);
            self.record("refresh", false, &result);
            return result;
        }

        let result = self.checked_sign(token_id, owner, chain_id).await;
        self.record("refresh", true, &result);
        result
    }

    fn within_cooldown(&self, now: i64, last_issued_at: i64) -> bool {
        // lastIssuedAt is client input: a future or out-of-range value never qualifies.
        now.checked_sub(last_issued_at)
            .map_or(false, |age| age >= 0 && age < self.refresh_cooldown_secs)
    }

    fn recently_checked(&self, key: &TrustKey, now: i64) -> bool {
        match self.recent_checks.get(key) {
            Some(checked_at) => self.within_cooldown(now, checked_at),
            None => false,
        }
    }

    async fn checked_sign(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
    ) -> ProofResult<SignedProof> {
        self.oracle
            .check_ownership(token_id, owner, chain_id)
            .await?;
        let now = self.clock.now();
        self.recent_checks
            .insert((chain_id, token_id.clone(), *owner), now);
        self.sign(token_id, owner, chain_id, now)
    }

    fn sign(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
        issued_at: i64,
    ) -> ProofResult<SignedProof> {
        let data = ProofPayload {
            token_id: token_id.clone(),
            owner: *owner,
            chain_id,
            issued_at,
            nonce: generate_nonce(),
        };
        let signature = self
            .signer
            .sign(&data.canonical_bytes())
            .map_err(|e| {
                warn!("Signing proof for token {} failed: {}", token_id, e);
                ProofError::SignerUnavailable(e.to_string())
            })?;
        Ok(SignedProof { data, signature })
    }

    fn record(&self, path: &str, chain_checked: bool, result: &ProofResult<SignedProof>) {
        match result {
            Ok(proof) => {
                METRICS.record_issued(path, chain_checked);
                info!(
                    "Proof {} for token {} on chain {} (chain checked: {})",
                    path, proof.data.token_id, proof.data.chain_id, chain_checked
                );
            }
            Err(e) => {
                METRICS.record_issue_rejected(e);
                debug!("Proof {} refused: {}", path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainConfig, ChainRegistry, RpcClientError};
    use crate::clock::ManualClock;
    use crate::crypto::LocalSigner;
    use crate::oracle::OwnershipChecker;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOwner {
        owner: Address,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OwnershipChecker for CountingOwner {
        async fn owner_of(&self, _token_id: &TokenId) -> Result<Address, RpcClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.owner)
        }
    }

    fn holder() -> Address {
        "0xabc0000000000000000000000000000000000001".parse().unwrap()
    }

    fn setup(owner: Address) -> (Arc<ManualClock>, Arc<CountingOwner>, ProofIssuer) {
        let registry = Arc::new(
            ChainRegistry::new(vec![ChainConfig {
                chain_id: ChainId(137),
                rpc_endpoint: "http://127.0.0.1:1".parse().unwrap(),
                contract_address: Address::from_bytes([0xaa; 20]),
                name: None,
            }])
            .unwrap(),
        );
        let checker = Arc::new(CountingOwner {
            owner,
            calls: AtomicUsize::new(0),
        });
        let oracle = OwnershipOracle::new(registry, Duration::from_secs(1))
            .with_checker(ChainId(137), checker.clone());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let issuer = ProofIssuer::new(
            Arc::new(LocalSigner::random()),
            Arc::new(oracle),
            clock.clone(),
            30,
        );
        (clock, checker, issuer)
    }

    #[tokio::test]
    async fn test_issue_signs_current_time() {
        let (clock, _, issuer) = setup(holder());
        let proof = issuer
            .issue(&TokenId::from(42), &holder(), ChainId(137))
            .await
            .unwrap();
        assert_eq!(proof.data.issued_at, clock.now());
        assert_eq!(
            proof.signature.recover(&proof.data.canonical_bytes()),
            Some(issuer.signer_address())
        );
    }

    #[tokio::test]
    async fn test_issue_refused_for_non_holder() {
        let (_, _, issuer) = setup(Address::from_bytes([0x22; 20]));
        let result = issuer.issue(&TokenId::from(42), &holder(), ChainId(137)).await;
        assert_eq!(result, Err(ProofError::OwnershipMismatch));
    }

    #[tokio::test]
    async fn test_refresh_without_prior_check_reads_chain() {
        let (clock, checker, issuer) = setup(holder());
        // Client claims a recent issuance the issuer never made.
        let result = issuer
            .refresh(&TokenId::from(42), &holder(), ChainId(137), clock.now() - 1)
            .await;
        assert!(result.is_ok());
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_with_future_last_issued_reads_chain() {
        let (clock, checker, issuer) = setup(holder());
        let first = issuer
            .issue(&TokenId::from(42), &holder(), ChainId(137))
            .await
            .unwrap();
        issuer
            .refresh(&TokenId::from(42), &holder(), ChainId(137), clock.now() + 60)
            .await
            .unwrap();
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
        assert!(first.data.issued_at <= clock.now());
    }

    #[tokio::test]
    async fn test_refresh_with_extreme_last_issued_reads_chain() {
        let (_, checker, issuer) = setup(holder());
        issuer
            .issue(&TokenId::from(42), &holder(), ChainId(137))
            .await
            .unwrap();
        for last_issued_at in [i64::MIN, i64::MAX] {
            let result = issuer
                .refresh(&TokenId::from(42), &holder(), ChainId(137), last_issued_at)
                .await;
            assert!(result.is_ok());
        }
        assert_eq!(checker.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_trust_window_is_per_owner() {
        let (clock, checker, issuer) = setup(holder());
        issuer
            .issue(&TokenId::from(42), &holder(), ChainId(137))
            .await
            .unwrap();
        let other = Address::from_bytes([0x33; 20]);
        let result = issuer
            .refresh(&TokenId::from(42), &other, ChainId(137), clock.now())
            .await;
        assert_eq!(result, Err(ProofError::OwnershipMismatch));
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
    }
}
