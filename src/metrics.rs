// src/metrics.rs
// Prometheus counters for issuance, ownership checks and scans

use crate::error::{ProofError, ProofResult};
use crate::types::ChainId;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub static METRICS: Lazy<ProofMetrics> = Lazy::new(ProofMetrics::new);

pub struct ProofMetrics {
    registry: Registry,
    /// Proofs signed, by path (`issue` / `refresh`) and whether the chain was read.
    pub proofs_issued: IntCounterVec,
    /// Issuance refusals, by error code.
    pub issue_rejected: IntCounterVec,
    /// Ownership oracle calls, by chain and outcome.
    pub ownership_checks: IntCounterVec,
    /// Verification results, by outcome (`accepted` or an error code).
    pub verifications: IntCounterVec,
    /// Nonces removed by the ledger sweep.
    pub nonces_swept: IntGauge,
}

impl ProofMetrics {
    fn new() -> Self {
        let registry = Registry::new_custom(Some("ticket_proof".into()), None)
            .unwrap_or_else(|_| Registry::new());

        let proofs_issued = IntCounterVec::new(
            Opts::new("proofs_issued_total", "Signed proofs handed to holders"),
            &["path", "chain_checked"],
        )
        .expect("static metric definition");
        let issue_rejected = IntCounterVec::new(
            Opts::new("issue_rejected_total", "Issuance requests refused"),
            &["code"],
        )
        .expect("static metric definition");
        let ownership_checks = IntCounterVec::new(
            Opts::new("ownership_checks_total", "On-chain ownerOf checks"),
            &["chain", "outcome"],
        )
        .expect("static metric definition");
        let verifications = IntCounterVec::new(
            Opts::new("verifications_total", "Scanner verification results"),
            &["outcome"],
        )
        .expect("static metric definition");
        let nonces_swept = IntGauge::new("nonces_swept_last", "Nonces removed by the last sweep")
            .expect("static metric definition");

        for collector in [
            Box::new(proofs_issued.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(issue_rejected.clone()),
            Box::new(ownership_checks.clone()),
            Box::new(verifications.clone()),
            Box::new(nonces_swept.clone()),
        ] {
            if let Err(e) = registry.register(collector) {
                log::warn!("metric registration failed: {}", e);
            }
        }

        Self {
            registry,
            proofs_issued,
            issue_rejected,
            ownership_checks,
            verifications,
            nonces_swept,
        }
    }

    pub fn record_issued(&self, path: &str, chain_checked: bool) {
        self.proofs_issued
            .with_label_values(&[path, if chain_checked { "true" } else { "false" }])
            .inc();
    }

    pub fn record_issue_rejected(&self, err: &ProofError) {
        self.issue_rejected.with_label_values(&[err.code()]).inc();
    }

    pub fn record_ownership_check(&self, chain: ChainId, result: &ProofResult<()>) {
        let outcome = match result {
            Ok(()) => "owned",
            Err(e) => e.code(),
        };
        self.ownership_checks
            .with_label_values(&[&chain.to_string(), outcome])
            .inc();
    }

    pub fn record_verification<T>(&self, result: &ProofResult<T>) {
        let outcome = match result {
            Ok(_) => "accepted",
            Err(e) => e.code(),
        };
        self.verifications.with_label_values(&[outcome]).inc();
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            log::error!("metrics encoding failed: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_outcomes() {
        METRICS.record_verification::<()>(&Err(ProofError::AlreadyUsed));
        METRICS.record_issued("refresh", false);
        let text = METRICS.render();
        assert!(text.contains("ticket_proof_verifications_total"));
        assert!(text.contains("already_used"));
        assert!(text.contains("ticket_proof_proofs_issued_total"));
    }
}
