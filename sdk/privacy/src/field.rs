//! Field Encoding
//!
//! Every value that crosses the circuit boundary is a BN254 scalar field
//! element, carried as 32 little-endian bytes.
//!
//! ```text
//! canonical:      bytes < r                        (checked, never reduced)
//! hash_to_field:  sha256(parts..) with byte[31] = 0 (248 bits, always < r)
//! signed amount:  a >= 0 -> a,  a < 0 -> r - |a|
//! ```

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Byte width of an encoded field element
pub const FIELD_BYTES: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The bytes encode an integer at or above the scalar field modulus
    #[error("value 0x{0} does not fit the BN254 scalar field")]
    NonCanonical(String),

    /// A signed amount whose magnitude exceeds 64 bits
    #[error("amount {0} exceeds the 64-bit amount range")]
    AmountOutOfRange(i128),
}

/// A canonical BN254 scalar, little-endian
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldElement(pub [u8; FIELD_BYTES]);

impl FieldElement {
    pub const ZERO: Self = Self([0u8; FIELD_BYTES]);

    pub fn from_field(f: Fr) -> Self {
        let bytes = f.into_bigint().to_bytes_le();
        let mut arr = [0u8; FIELD_BYTES];
        arr[..bytes.len()].copy_from_slice(&bytes);
        Self(arr)
    }

    pub fn to_field(&self) -> Fr {
        Fr::from_le_bytes_mod_order(&self.0)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_field(Fr::from(value))
    }

    /// Accept bytes only if they already are a reduced field element.
    pub fn from_canonical_bytes(bytes: [u8; FIELD_BYTES]) -> Result<Self, FieldError> {
        let reduced = Self::from_field(Fr::from_le_bytes_mod_order(&bytes));
        if reduced.0 != bytes {
            return Err(FieldError::NonCanonical(hex::encode(bytes)));
        }
        Ok(reduced)
    }

    pub fn as_bytes(&self) -> &[u8; FIELD_BYTES] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; FIELD_BYTES] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; FIELD_BYTES]
    }
}

impl From<Fr> for FieldElement {
    fn from(f: Fr) -> Self {
        Self::from_field(f)
    }
}

impl AsRef<[u8]> for FieldElement {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Hash arbitrary byte strings into the field by truncating SHA-256 to 248 bits.
pub fn hash_to_field(parts: &[&[u8]]) -> FieldElement {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out: [u8; FIELD_BYTES] = hasher.finalize().into();
    out[FIELD_BYTES - 1] = 0;
    FieldElement(out)
}

/// Encode a signed public amount (deposit > 0, withdrawal < 0).
pub fn signed_amount_to_field(amount: i128) -> Result<FieldElement, FieldError> {
    let magnitude = amount.unsigned_abs();
    if magnitude > u64::MAX as u128 {
        return Err(FieldError::AmountOutOfRange(amount));
    }
    let abs = Fr::from(magnitude as u64);
    let value = if amount < 0 { -abs } else { abs };
    Ok(FieldElement::from_field(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_roundtrip() {
        let f = FieldElement::from_u64(123_456);
        assert_eq!(FieldElement::from_canonical_bytes(f.0).unwrap(), f);
    }

    #[test]
    fn test_rejects_modulus_overflow() {
        assert!(matches!(
            FieldElement::from_canonical_bytes([0xff; 32]),
            Err(FieldError::NonCanonical(_))
        ));
    }

    #[test]
    fn test_hash_to_field_is_canonical() {
        for i in 0u8..16 {
            let f = hash_to_field(&[b"mint", &[i]]);
            assert_eq!(f.0[31], 0);
            assert!(FieldElement::from_canonical_bytes(f.0).is_ok());
        }
    }

    #[test]
    fn test_negative_amount_cancels() {
        let deposit = signed_amount_to_field(500).unwrap().to_field();
        let withdrawal = signed_amount_to_field(-500).unwrap().to_field();
        assert_eq!(deposit + withdrawal, Fr::from(0u64));
    }

    #[test]
    fn test_amount_out_of_range() {
        let too_big = u64::MAX as i128 + 1;
        assert_eq!(
            signed_amount_to_field(too_big),
            Err(FieldError::AmountOutOfRange(too_big))
        );
        assert!(signed_amount_to_field(-(u64::MAX as i128)).is_ok());
    }
}
