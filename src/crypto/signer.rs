// src/crypto/signer.rs
// Process-wide proof signing identity

use super::{address_of, personal_message_hash, RecoverableSignature};
use crate::types::Address;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("invalid secret key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// The narrow seam between protocol logic and key custody.
///
/// Only `address()` is ever compared against; the secret stays behind this
/// trait so a hardware-backed implementation can replace [`LocalSigner`].
pub trait Signer: Send + Sync {
    /// Sign `message` as an EIP-191 personal message.
    fn sign(&self, message: &[u8]) -> Result<RecoverableSignature, SignerError>;

    fn address(&self) -> Address;
}

/// In-process secp256k1 key.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        if secret.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                secret.len()
            )));
        }
        let key = SigningKey::from_slice(secret)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::from_key(key))
    }

    /// Parse a hex secret, with or without `0x`.
    pub fn from_hex(secret_hex: &str) -> Result<Self, SignerError> {
        let digits = secret_hex.trim().strip_prefix("0x").unwrap_or(secret_hex.trim());
        let bytes = hex::decode(digits).map_err(|_| SignerError::InvalidKey("not valid hex".into()))?;
        Self::from_bytes(&bytes)
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    /// Hex of the raw secret, for key files only.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }
}

impl Signer for LocalSigner {
    fn sign(&self, message: &[u8]) -> Result<RecoverableSignature, SignerError> {
        let digest = personal_message_hash(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
        Ok(RecoverableSignature::from_parts(&signature, recovery_id))
    }

    fn address(&self) -> Address {
        self.address
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_recovers_to_address() {
        let signer = LocalSigner::random();
        let msg = b"{\"tokenId\":\"1\"}";
        let sig = signer.sign(msg).unwrap();
        assert_eq!(sig.recover(msg), Some(signer.address()));
    }

    #[test]
    fn test_other_message_recovers_elsewhere() {
        let signer = LocalSigner::random();
        let sig = signer.sign(b"chain 137").unwrap();
        assert_ne!(sig.recover(b"chain 1"), Some(signer.address()));
    }

    #[test]
    fn test_from_hex_accepts_prefix() {
        let signer = LocalSigner::random();
        let hex_secret = signer.secret_hex();
        let a = LocalSigner::from_hex(&hex_secret).unwrap();
        let b = LocalSigner::from_hex(&format!("0x{}", hex_secret)).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_rejects_invalid_secrets() {
        assert!(LocalSigner::from_bytes(&[0u8; 32]).is_err());
        assert!(LocalSigner::from_bytes(&[1u8; 31]).is_err());
        assert!(LocalSigner::from_hex("nothex").is_err());
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let signer = LocalSigner::random();
        let rendered = format!("{:?}", signer);
        assert!(!rendered.contains(&signer.secret_hex()));
        assert!(rendered.contains(&signer.address().to_string()));
    }
}
