// src/error.rs
// Protocol error taxonomy shared by issuance and verification

use crate::types::ChainId;
use serde::Serialize;
use thiserror::Error;

pub type ProofResult<T> = std::result::Result<T, ProofError>;

/// Every way an issuance or verification can be refused.
///
/// These are returned as values across the protocol boundary so callers
/// (scanner UI, holder app) can branch on them. Only the `*Unavailable`
/// kinds are transient; everything else is terminal for that proof.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// Signature malformed, or it recovers to someone other than the signer.
    #[error("bad signature")]
    InvalidSignature,

    #[error("not yet valid")]
    NotYetValid,

    #[error("expired")]
    Expired,

    /// The nonce was already claimed in the ledger (replay).
    #[error("already used")]
    AlreadyUsed,

    #[error("unsupported chain")]
    UnsupportedChain(ChainId),

    #[error("ownership mismatch")]
    OwnershipMismatch,

    /// Chain RPC failed, timed out or returned garbage. Fail-closed.
    #[error("ownership check failed")]
    RpcUnavailable(String),

    /// Nonce ledger unreachable or too slow. Fail-closed.
    #[error("nonce ledger unavailable")]
    LedgerUnavailable(String),

    /// The signing backend refused or failed.
    #[error("signer unavailable")]
    SignerUnavailable(String),
}

impl ProofError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ProofError::InvalidSignature => "invalid_signature",
            ProofError::NotYetValid => "not_yet_valid",
            ProofError::Expired => "expired",
            ProofError::AlreadyUsed => "already_used",
            ProofError::UnsupportedChain(_) => "unsupported_chain",
            ProofError::OwnershipMismatch => "ownership_mismatch",
            ProofError::RpcUnavailable(_) => "rpc_unavailable",
            ProofError::LedgerUnavailable(_) => "ledger_unavailable",
            ProofError::SignerUnavailable(_) => "signer_unavailable",
        }
    }

    /// Short reason string, identical to the `Display` output.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProofError::RpcUnavailable(_)
                | ProofError::LedgerUnavailable(_)
                | ProofError::SignerUnavailable(_)
        )
    }

    /// What the scanner operator or holder should do next.
    pub fn hint(&self) -> &'static str {
        match self {
            ProofError::InvalidSignature => "not a genuine ticket code",
            ProofError::NotYetValid => "device clock ahead of venue, ask holder to refresh",
            ProofError::Expired => "expired, ask holder to refresh",
            ProofError::AlreadyUsed => "already scanned",
            ProofError::UnsupportedChain(_) => "ticket chain not accepted here",
            ProofError::OwnershipMismatch => "wallet does not hold this ticket",
            ProofError::RpcUnavailable(_) => "chain unreachable, retry shortly",
            ProofError::LedgerUnavailable(_) => {
                "scanner backend unreachable, ask holder to refresh and rescan"
            }
            ProofError::SignerUnavailable(_) => "issuer temporarily unavailable, retry shortly",
        }
    }

    /// Serializable view used by the HTTP layer and the verification result.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            reason: self.reason(),
            hint: self.hint(),
            retryable: self.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: &'static str,
    pub reason: String,
    pub hint: &'static str,
    pub retryable: bool,
}
