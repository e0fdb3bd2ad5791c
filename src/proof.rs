// src/proof.rs
// Signed ownership proof payload and its canonical byte encoding

use crate::crypto::RecoverableSignature;
use crate::types::{Address, ChainId, TokenId};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Nonce entropy in bytes (128 bits).
pub const NONCE_BYTES: usize = 16;

/// The signed content of a rotating ticket code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofPayload {
    pub token_id: TokenId,
    pub owner: Address,
    pub chain_id: ChainId,
    pub issued_at: i64,
    pub nonce: String,
}

impl ProofPayload {
    /// Deterministic encoding covered by the signature.
    ///
    /// Compact JSON with the fixed key order tokenId, owner, chainId,
    /// issuedAt, nonce. Any service that issues or verifies proofs must use
    /// exactly these bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        format!(
            "{{\"tokenId\":\"{}\",\"owner\":\"{}\",\"chainId\":{},\"issuedAt\":{},\"nonce\":{}}}",
            self.token_id,
            self.owner,
            self.chain_id,
            self.issued_at,
            serde_json::Value::String(self.nonce.clone()),
        )
        .into_bytes()
    }
}

/// Payload plus the issuer's signature over [`ProofPayload::canonical_bytes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProof {
    pub data: ProofPayload,
    pub signature: RecoverableSignature,
}

/// Fresh single-use nonce from the OS CSPRNG, as 32 lowercase hex chars.
pub fn generate_nonce() -> String {
    let mut buf = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
