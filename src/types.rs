// src/types.rs
// Primitive identifiers: chain ids, EVM addresses and ERC-721 token ids

use num_bigint::BigUint;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest decimal rendering of a uint256 (2^256 - 1 has 78 digits).
const MAX_TOKEN_ID_DIGITS: usize = 78;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("invalid token id: {0}")]
    TokenId(String),
}

/// EVM chain id (1 = Ethereum mainnet, 137 = Polygon, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

/// 20-byte EVM account address. Always rendered lowercase with a `0x` prefix,
/// so two addresses compare equal regardless of checksum casing on input.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Interpret a 32-byte ABI word as an address. The high 12 bytes must be zero.
    pub fn from_abi_word(word: &[u8]) -> Option<Self> {
        if word.len() != 32 || word[..12].iter().any(|b| *b != 0) {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&word[12..]);
        Some(Address(out))
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ParseError::Address(format!("missing 0x prefix: {}", s)))?;
        if digits.len() != 40 {
            return Err(ParseError::Address(format!(
                "expected 40 hex digits, got {}",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits).map_err(|e| ParseError::Address(e.to_string()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// ERC-721 token id (uint256). Carried as a decimal string on the wire.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(BigUint);

impl TokenId {
    /// Big-endian 32-byte ABI encoding.
    pub fn to_abi_word(&self) -> [u8; 32] {
        let bytes = self.0.to_bytes_be();
        let mut word = [0u8; 32];
        // Parsing guarantees at most 32 significant bytes.
        word[32 - bytes.len()..].copy_from_slice(&bytes);
        word
    }
}

impl From<u64> for TokenId {
    fn from(id: u64) -> Self {
        TokenId(BigUint::from(id))
    }
}

impl FromStr for TokenId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_TOKEN_ID_DIGITS || !s.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseError::TokenId(format!("not a decimal uint256: {:?}", s)));
        }
        let value = BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| ParseError::TokenId(s.to_string()))?;
        if value.bits() > 256 {
            return Err(ParseError::TokenId(format!("exceeds uint256: {}", s)));
        }
        Ok(TokenId(value))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TokenIdVisitor;

        impl<'de> Visitor<'de> for TokenIdVisitor {
            type Value = TokenId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal uint256 string or a non-negative integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TokenId, E> {
                Ok(TokenId::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TokenId, E> {
                u64::try_from(v)
                    .map(TokenId::from)
                    .map_err(|_| E::custom("token id must be non-negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TokenId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TokenIdVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_normalizes_case() {
        let mixed: Address = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01".parse().unwrap();
        let lower: Address = "0xabcdef0123456789abcdef0123456789abcdef01".parse().unwrap();
        assert_eq!(mixed, lower);
        assert_eq!(mixed.to_string(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!("abcdef0123456789abcdef0123456789abcdef01".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzzcdef0123456789abcdef0123456789abcdef01".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_from_abi_word() {
        let mut word = [0u8; 32];
        word[31] = 0x42;
        let addr = Address::from_abi_word(&word).unwrap();
        assert_eq!(addr.to_string(), "0x0000000000000000000000000000000000000042");

        word[0] = 1;
        assert!(Address::from_abi_word(&word).is_none());
        assert!(Address::from_abi_word(&word[..31]).is_none());
    }

    #[test]
    fn test_token_id_accepts_string_and_number() {
        let from_str: TokenId = serde_json::from_str("\"42\"").unwrap();
        let from_num: TokenId = serde_json::from_str("42").unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(serde_json::to_string(&from_num).unwrap(), "\"42\"");
        assert!(serde_json::from_str::<TokenId>("-1").is_err());
        assert!(serde_json::from_str::<TokenId>("\"4x2\"").is_err());
    }

    #[test]
    fn test_token_id_uint256_bounds() {
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let id: TokenId = max.parse().unwrap();
        assert_eq!(id.to_abi_word(), [0xffu8; 32]);

        let overflow =
            "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(overflow.parse::<TokenId>().is_err());
    }

    #[test]
    fn test_token_id_abi_word_is_big_endian() {
        let word = TokenId::from(0x0102u64).to_abi_word();
        assert_eq!(word[30], 0x01);
        assert_eq!(word[31], 0x02);
        assert!(word[..30].iter().all(|b| *b == 0));
    }
}
