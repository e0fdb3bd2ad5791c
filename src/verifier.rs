// src/verifier.rs
// Scanner-side verification: signature, validity window, single-use claim

use crate::clock::Clock;
use crate::crypto::RecoverableSignature;
use crate::error::{ProofError, ProofResult};
use crate::ledger::NonceLedger;
use crate::metrics::METRICS;
use crate::proof::ProofPayload;
use crate::types::Address;
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Structured scan result handed back to the scanner.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl From<&ProofResult<Address>> for Verification {
    fn from(result: &ProofResult<Address>) -> Self {
        match result {
            Ok(signer) => Verification {
                valid: true,
                signer: Some(*signer),
                reason: None,
                code: None,
                hint: None,
                retryable: None,
            },
            Err(e) => Verification {
                valid: false,
                signer: None,
                reason: Some(e.reason()),
                code: Some(e.code()),
                hint: Some(e.hint()),
                retryable: Some(e.is_retryable()),
            },
        }
    }
}

pub struct ProofVerifier {
    signer_address: Address,
    ledger: Arc<dyn NonceLedger>,
    clock: Arc<dyn Clock>,
    expiration_secs: i64,
    ledger_ttl_secs: i64,
    ledger_timeout: Duration,
}

impl ProofVerifier {
    pub fn new(
        signer_address: Address,
        ledger: Arc<dyn NonceLedger>,
        clock: Arc<dyn Clock>,
        expiration_secs: i64,
        ledger_ttl_secs: i64,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            signer_address,
            ledger,
            clock,
            expiration_secs,
            ledger_ttl_secs,
            ledger_timeout,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn NonceLedger> {
        &self.ledger
    }

    /// Accept a proof at most once. Returns the recovered signer.
    ///
    /// The nonce is only claimed after the signature and the validity window
    /// pass, so a forged or stale code never burns a real nonce. No chain
    /// RPC happens here.
    pub async fn verify(
        &self,
        data: &ProofPayload,
        signature: &RecoverableSignature,
    ) -> ProofResult<Address> {
        let result = self.verify_inner(data, signature).await;
        METRICS.record_verification(&result);
        result
    }

    async fn verify_inner(
        &self,
        data: &ProofPayload,
        signature: &RecoverableSignature,
    ) -> ProofResult<Address> {
        let signer = match signature.recover(&data.canonical_bytes()) {
            Some(addr) if addr == self.signer_address => addr,
            Some(addr) => {
                debug!("Proof signed by {}, expected {}", addr, self.signer_address);
                return Err(ProofError::InvalidSignature);
            }
            None => return Err(ProofError::InvalidSignature),
        };

        let now = self.clock.now();
        let age = now.saturating_sub(data.issued_at);
        if age < 0 {
            return Err(ProofError::NotYetValid);
        }
        if age > self.expiration_secs {
            return Err(ProofError::Expired);
        }

        let expires_at = now + self.ledger_ttl_secs;
        let claim = tokio::time::timeout(self.ledger_timeout, self.ledger.claim(&data.nonce, expires_at));
        match claim.await {
            Ok(Ok(true)) => Ok(signer),
            Ok(Ok(false)) => {
                debug!("Nonce {} already claimed", data.nonce);
                Err(ProofError::AlreadyUsed)
            }
            Ok(Err(e)) => {
                warn!("Nonce claim failed: {}", e);
                Err(ProofError::LedgerUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!("Nonce claim timed out after {:?}", self.ledger_timeout);
                Err(ProofError::LedgerUnavailable(format!(
                    "timed out after {}ms",
                    self.ledger_timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::{LocalSigner, Signer};
    use crate::ledger::{LedgerBackend, LedgerError, LedgerStats, MemoryNonceLedger};
    use crate::types::{ChainId, TokenId};
    use async_trait::async_trait;

    const NOW: i64 = 1_700_000_000;

    struct DownLedger;

    #[async_trait]
    impl NonceLedger for DownLedger {
        async fn claim(&self, _nonce: &str, _expires_at: i64) -> Result<bool, LedgerError> {
            Err(LedgerError::Backend("connection refused".into()))
        }
        async fn is_claimed(&self, _nonce: &str) -> Result<bool, LedgerError> {
            Err(LedgerError::Backend("connection refused".into()))
        }
        async fn stats(&self) -> Result<LedgerStats, LedgerError> {
            Err(LedgerError::Backend("connection refused".into()))
        }
        async fn sweep_expired(&self, _now: i64) -> Result<u64, LedgerError> {
            Ok(0)
        }
        fn backend(&self) -> LedgerBackend {
            LedgerBackend::Postgres
        }
    }

    struct SlowLedger;

    #[async_trait]
    impl NonceLedger for SlowLedger {
        async fn claim(&self, _nonce: &str, _expires_at: i64) -> Result<bool, LedgerError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }
        async fn is_claimed(&self, _nonce: &str) -> Result<bool, LedgerError> {
            Ok(false)
        }
        async fn stats(&self) -> Result<LedgerStats, LedgerError> {
            Ok(LedgerStats { active_count: 0 })
        }
        async fn sweep_expired(&self, _now: i64) -> Result<u64, LedgerError> {
            Ok(0)
        }
        fn backend(&self) -> LedgerBackend {
            LedgerBackend::Postgres
        }
    }

    fn signed(signer: &LocalSigner, issued_at: i64, nonce: &str) -> (ProofPayload, RecoverableSignature) {
        let data = ProofPayload {
            token_id: TokenId::from(42),
            owner: "0xabc0000000000000000000000000000000000001".parse().unwrap(),
            chain_id: ChainId(137),
            issued_at,
            nonce: nonce.to_string(),
        };
        let sig = signer.sign(&data.canonical_bytes()).unwrap();
        (data, sig)
    }

    fn verifier_with(signer: &LocalSigner, ledger: Arc<dyn NonceLedger>) -> ProofVerifier {
        let clock = Arc::new(ManualClock::new(NOW));
        ProofVerifier::new(signer.address(), ledger, clock, 30, 300, Duration::from_millis(100))
    }

    fn verifier(signer: &LocalSigner) -> (Arc<MemoryNonceLedger>, ProofVerifier) {
        let clock = Arc::new(ManualClock::new(NOW));
        let ledger = Arc::new(MemoryNonceLedger::new(clock.clone()));
        let v = ProofVerifier::new(
            signer.address(),
            ledger.clone(),
            clock,
            30,
            300,
            Duration::from_millis(100),
        );
        (ledger, v)
    }

    #[tokio::test]
    async fn test_accepts_then_rejects_replay() {
        let signer = LocalSigner::random();
        let (ledger, v) = verifier(&signer);
        let (data, sig) = signed(&signer, NOW - 1, "n1");
        assert_eq!(v.verify(&data, &sig).await, Ok(signer.address()));
        assert_eq!(v.verify(&data, &sig).await, Err(ProofError::AlreadyUsed));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_signer_rejected_without_claim() {
        let issuer = LocalSigner::random();
        let forger = LocalSigner::random();
        let (ledger, v) = verifier(&issuer);
        let (data, sig) = signed(&forger, NOW, "n1");
        assert_eq!(v.verify(&data, &sig).await, Err(ProofError::InvalidSignature));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_window_checked_before_claim() {
        let signer = LocalSigner::random();
        let (ledger, v) = verifier(&signer);
        let (future, sig) = signed(&signer, NOW + 5, "n1");
        assert_eq!(v.verify(&future, &sig).await, Err(ProofError::NotYetValid));
        let (stale, sig) = signed(&signer, NOW - 31, "n2");
        assert_eq!(v.verify(&stale, &sig).await, Err(ProofError::Expired));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_exact_expiration_still_valid() {
        let signer = LocalSigner::random();
        let (_, v) = verifier(&signer);
        let (data, sig) = signed(&signer, NOW - 30, "n1");
        assert!(v.verify(&data, &sig).await.is_ok());
    }

    #[tokio::test]
    async fn test_ledger_error_fails_closed() {
        let signer = LocalSigner::random();
        let v = verifier_with(&signer, Arc::new(DownLedger));
        let (data, sig) = signed(&signer, NOW, "n1");
        let result = v.verify(&data, &sig).await;
        assert!(matches!(result, Err(ProofError::LedgerUnavailable(_))));
        let view = Verification::from(&result);
        assert!(!view.valid);
        assert_eq!(view.retryable, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ledger_times_out() {
        let signer = LocalSigner::random();
        let v = verifier_with(&signer, Arc::new(SlowLedger));
        let (data, sig) = signed(&signer, NOW, "n1");
        assert!(matches!(
            v.verify(&data, &sig).await,
            Err(ProofError::LedgerUnavailable(_))
        ));
    }

    #[test]
    fn test_verification_view_serializes_camel_case() {
        let ok: ProofResult<Address> = Ok(Address::from_bytes([1; 20]));
        let json = serde_json::to_value(Verification::from(&ok)).unwrap();
        assert_eq!(json["valid"], true);
        assert!(json.get("reason").is_none());

        let err: ProofResult<Address> = Err(ProofError::AlreadyUsed);
        let json = serde_json::to_value(Verification::from(&err)).unwrap();
        assert_eq!(json["reason"], "already used");
        assert_eq!(json["hint"], "already scanned");
    }
}
