pub mod signer;

pub use signer::{LocalSigner, Signer, SignerError};

use crate::types::Address;
use anyhow::{Context, Result};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use tiny_keccak::{Hasher, Keccak};

/// Length of an `r || s || v` recoverable secp256k1 signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// Keccak-256 (the Ethereum variant, not SHA3-256).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// EIP-191 personal message digest:
/// keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Derive the EVM address of a secp256k1 public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.as_affine().to_encoded_point(false);
    // Skip the 0x04 SEC1 tag, hash X || Y, keep the low 20 bytes.
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address::from_bytes(out)
}

/// 65-byte recoverable signature in Ethereum layout (`v` is 27 or 28).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; SIGNATURE_LENGTH]);

impl RecoverableSignature {
    pub fn from_parts(signature: &Signature, recovery_id: RecoveryId) -> Self {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        RecoverableSignature(out)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; SIGNATURE_LENGTH] = bytes.try_into().ok()?;
        Some(RecoverableSignature(arr))
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).ok()?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Recover the address that produced this signature over `message`
    /// (hashed as an EIP-191 personal message). `None` on any malformation.
    pub fn recover(&self, message: &[u8]) -> Option<Address> {
        let v = match self.0[64] {
            27 | 28 => self.0[64] - 27,
            0 | 1 => self.0[64],
            _ => return None,
        };
        let recovery_id = RecoveryId::from_byte(v)?;
        let signature = Signature::from_slice(&self.0[..64]).ok()?;
        let digest = personal_message_hash(message);
        let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id).ok()?;
        Some(address_of(&key))
    }
}

impl fmt::Display for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({})", self)
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RecoverableSignature::from_hex(&s)
            .ok_or_else(|| de::Error::custom("expected 65-byte hex signature"))
    }
}

/// Generate a new secp256k1 key and write its 32 raw bytes as hex to `path`.
/// On Unix the file is created 0600, and an existing file is reset to 0600
/// before the new secret is written.
pub fn generate_and_write_signing_key(path: &Path) -> Result<LocalSigner> {
    let signer = LocalSigner::random();
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut f = options
        .open(path)
        .with_context(|| format!("create key file {}", path.display()))?;
    // mode() only applies on creation.
    set_restrictive_permissions(path);
    f.write_all(signer.secret_hex().as_bytes())?;
    Ok(signer)
}

/// Set file permissions to owner-only (0600) on Unix systems.
pub fn set_restrictive_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            log::warn!("Failed to set permissions on {}: {}", path.display(), e);
        }
    }
    let _ = path;
}

/// Load a signer from a file holding the hex-encoded 32-byte secret.
pub fn load_signing_key(path: &Path) -> Result<LocalSigner> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read key file {}", path.display()))?;
    LocalSigner::from_hex(raw.trim()).map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))
}
