// src/service.rs
// Proof service facade: wires issuer, verifier, ledger and registry together

use crate::chain::ChainRegistry;
use crate::clock::{Clock, SystemClock};
use crate::config::{ProtocolSettings, ServiceConfig};
use crate::crypto::{RecoverableSignature, Signer};
use crate::error::{ProofError, ProofResult};
use crate::issuer::ProofIssuer;
use crate::ledger::{spawn_sweeper, LedgerBackend, MemoryNonceLedger, NonceLedger, PgNonceLedger};
use crate::oracle::OwnershipOracle;
use crate::proof::{ProofPayload, SignedProof};
use crate::types::{Address, ChainId, TokenId};
use crate::verifier::ProofVerifier;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Public protocol parameters for holder apps and scanners.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProofConfigView {
    pub expiration_seconds: i64,
    pub refresh_cooldown_seconds: i64,
    pub rotation_interval_seconds: i64,
    pub supported_chain_ids: Vec<ChainId>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub active_nonce_count: u64,
    pub signer_address: Address,
    pub supported_chain_ids: Vec<ChainId>,
    pub ledger_backend: LedgerBackend,
}

pub struct ProofService {
    issuer: ProofIssuer,
    verifier: ProofVerifier,
    registry: Arc<ChainRegistry>,
    settings: ProtocolSettings,
    sweeper: Option<JoinHandle<()>>,
}

impl ProofService {
    /// Assemble from already-built parts. No background tasks are started.
    pub fn new(
        settings: ProtocolSettings,
        signer: Arc<dyn Signer>,
        oracle: Arc<OwnershipOracle>,
        ledger: Arc<dyn NonceLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = oracle.registry().clone();
        let verifier = ProofVerifier::new(
            signer.address(),
            ledger,
            clock.clone(),
            settings.expiration_secs,
            settings.ledger_ttl_secs,
            settings.ledger_timeout,
        );
        let issuer = ProofIssuer::new(signer, oracle, clock, settings.refresh_cooldown_secs);
        Self {
            issuer,
            verifier,
            registry,
            settings,
            sweeper: None,
        }
    }

    /// Build the production service: per-chain checkers, the configured
    /// nonce ledger and its expiry sweeper.
    pub async fn from_config(config: &ServiceConfig, signer: Arc<dyn Signer>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(config.load_chains().context("load chain registry")?);
        let oracle = OwnershipOracle::connect(registry, config.protocol.oracle_timeout)
            .context("build ownership checkers")?;

        let ledger: Arc<dyn NonceLedger> = match &config.ledger_url {
            Some(url) => Arc::new(
                PgNonceLedger::connect(
                    url,
                    config.ledger_max_connections,
                    config.protocol.ledger_timeout,
                    clock.clone(),
                )
                .await
                .context("connect nonce ledger")?,
            ),
            None => {
                warn!(
                    "Using in-memory nonce ledger: a proof can be accepted once per running \
                     instance. Set NONCE_LEDGER_URL before running more than one verifier."
                );
                Arc::new(MemoryNonceLedger::new(clock.clone()))
            }
        };

        let sweeper = spawn_sweeper(ledger.clone(), clock.clone(), config.sweep_interval);
        let mut service = Self::new(
            config.protocol.clone(),
            signer,
            Arc::new(oracle),
            ledger,
            clock,
        );
        service.sweeper = Some(sweeper);

        info!(
            "Proof service ready: signer {}, chains {:?}, ledger {:?}",
            service.signer_address(),
            service.supported_chain_ids(),
            service.verifier.ledger().backend()
        );
        Ok(service)
    }

    pub fn signer_address(&self) -> Address {
        self.issuer.signer_address()
    }

    pub fn supported_chain_ids(&self) -> Vec<ChainId> {
        self.registry.supported_chain_ids()
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub async fn issue(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
    ) -> ProofResult<SignedProof> {
        tokio::time::timeout(
            self.settings.request_timeout,
            self.issuer.issue(token_id, owner, chain_id),
        )
        .await
        .unwrap_or_else(|_| Err(self.deadline(ProofError::RpcUnavailable)))
    }

    pub async fn refresh(
        &self,
        token_id: &TokenId,
        owner: &Address,
        chain_id: ChainId,
        last_issued_at: i64,
    ) -> ProofResult<SignedProof> {
        tokio::time::timeout(
            self.settings.request_timeout,
            self.issuer.refresh(token_id, owner, chain_id, last_issued_at),
        )
        .await
        .unwrap_or_else(|_| Err(self.deadline(ProofError::RpcUnavailable)))
    }

    /// Returns the issuer address on acceptance.
    pub async fn verify(
        &self,
        data: &ProofPayload,
        signature: &RecoverableSignature,
    ) -> ProofResult<Address> {
        tokio::time::timeout(self.settings.request_timeout, self.verifier.verify(data, signature))
            .await
            .unwrap_or_else(|_| Err(self.deadline(ProofError::LedgerUnavailable)))
    }

    pub fn config(&self) -> ProofConfigView {
        ProofConfigView {
            expiration_seconds: self.settings.expiration_secs,
            refresh_cooldown_seconds: self.settings.refresh_cooldown_secs,
            rotation_interval_seconds: self.settings.rotation_interval_secs,
            supported_chain_ids: self.supported_chain_ids(),
        }
    }

    pub async fn stats(&self) -> ProofResult<StatsView> {
        let ledger = self.verifier.ledger();
        let stats = match tokio::time::timeout(self.settings.ledger_timeout, ledger.stats()).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(ProofError::LedgerUnavailable(e.to_string())),
            Err(_) => return Err(ProofError::LedgerUnavailable("stats timed out".into())),
        };
        Ok(StatsView {
            active_nonce_count: stats.active_count,
            signer_address: self.signer_address(),
            supported_chain_ids: self.supported_chain_ids(),
            ledger_backend: ledger.backend(),
        })
    }

    fn deadline(&self, kind: fn(String) -> ProofError) -> ProofError {
        warn!(
            "Request exceeded {}ms deadline",
            self.settings.request_timeout.as_millis()
        );
        kind(format!(
            "request deadline of {}ms exceeded",
            self.settings.request_timeout.as_millis()
        ))
    }
}

impl Drop for ProofService {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}
